// src/distiller/cluster.rs
// Greedy cosine-similarity clustering over a project's active memories
// (spec.md §4.3.2 FindSimilarClusters).

use uuid::Uuid;

use crate::memory::Memory;

#[derive(Debug, Clone)]
pub struct SimilarityCluster {
    pub members: Vec<Memory>,
    pub centroid: Vec<f32>,
    pub avg_similarity: f32,
    pub min_similarity: f32,
}

/// `dot / (‖a‖·‖b‖)`; 0 for empty, mismatched-length, or zero-magnitude
/// vectors (spec.md §4.3.2, boundary behaviours in §8).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

fn centroid(vectors: &[&Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dims = first.len();
    let mut sum = vec![0.0f32; dims];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            if i < dims {
                sum[i] += x;
            }
        }
    }
    let n = vectors.len() as f32;
    sum.iter().map(|x| x / n).collect()
}

/// Walks memories in list order. For the current memory M, any
/// not-yet-clustered memory with `sim(M, other) > threshold` joins M's
/// group. Groups of size < 2 (singletons) are discarded.
pub fn find_similar_clusters(memories: Vec<(Memory, Vec<f32>)>, threshold: f32) -> Vec<SimilarityCluster> {
    let n = memories.len();
    let mut clustered = vec![false; n];
    let mut clusters = Vec::new();

    for i in 0..n {
        if clustered[i] {
            continue;
        }
        let mut group_idx = vec![i];
        let mut similarities = Vec::new();

        for j in (i + 1)..n {
            if clustered[j] {
                continue;
            }
            let sim = cosine_similarity(&memories[i].1, &memories[j].1);
            if sim > threshold {
                group_idx.push(j);
                similarities.push(sim);
            }
        }

        if group_idx.len() < 2 {
            continue;
        }

        for &idx in &group_idx {
            clustered[idx] = true;
        }

        let members: Vec<Memory> = group_idx.iter().map(|&idx| memories[idx].0.clone()).collect();
        let vectors: Vec<&Vec<f32>> = group_idx.iter().map(|&idx| &memories[idx].1).collect();
        let avg_similarity = similarities.iter().sum::<f32>() / similarities.len() as f32;
        let min_similarity = similarities.iter().cloned().fold(f32::INFINITY, f32::min);

        clusters.push(SimilarityCluster { members, centroid: centroid(&vectors), avg_similarity, min_similarity });
    }

    clusters
}

pub fn cluster_member_ids(cluster: &SimilarityCluster) -> Vec<Uuid> {
    cluster.members.iter().map(|m| m.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Outcome;

    fn memory(title: &str) -> Memory {
        Memory::new("p1", title, "content", Outcome::Success)
    }

    #[test]
    fn cosine_similarity_boundary_behaviours() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) - (-1.0)).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn singletons_are_discarded() {
        let memories = vec![(memory("a"), vec![1.0, 0.0]), (memory("b"), vec![0.0, 1.0])];
        let clusters = find_similar_clusters(memories, 0.8);
        assert!(clusters.is_empty());
    }

    #[test]
    fn similar_memories_form_a_cluster() {
        let memories = vec![
            (memory("a"), vec![1.0, 0.0]),
            (memory("b"), vec![0.99, 0.01]),
            (memory("c"), vec![0.0, 1.0]),
        ];
        let clusters = find_similar_clusters(memories, 0.9);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }
}
