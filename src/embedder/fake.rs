// src/embedder/fake.rs
// Deterministic hashing "embedding" for tests — no network calls, but
// produces stable vectors that preserve the cosine-similarity ordering
// tests rely on (identical text -> identical vector).

use async_trait::async_trait;

use crate::embedder::Embedder;
use crate::error::Result;

pub struct FakeEmbedder {
    dimensions: usize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions;
            vector[idx] += byte as f32;
        }
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }
        vector
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_embed(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
