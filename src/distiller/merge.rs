// src/distiller/merge.rs
// LLM-driven cluster synthesis (spec.md §4.3.2 MergeCluster, §4.3.3 merged
// confidence, §6.3 canonical prompt).

use std::sync::Arc;

use tracing::warn;

use crate::distiller::cluster::SimilarityCluster;
use crate::error::{ReasoningBankError, Result};
use crate::llm::LLMClient;
use crate::memory::{Memory, MemoryKind, Outcome};

const FIELD_LABELS: [&str; 5] = ["TITLE:", "CONTENT:", "TAGS:", "OUTCOME:", "SOURCE_ATTRIBUTION:"];

/// Deterministic prompt built from the cluster's members (spec.md §6.3).
pub fn build_consolidation_prompt(cluster: &SimilarityCluster) -> String {
    let mut prompt = String::from(
        "You are a memory consolidation assistant. Several memories describe overlapping strategies from past agent sessions. Synthesize them into a single, higher-confidence memory.\n\n## Source Memories\n\n",
    );

    for (i, memory) in cluster.members.iter().enumerate() {
        prompt.push_str(&format!(
            "### Memory {}: {}\n**Description:** {}\n**Content:** {}\n**Tags:** {}\n**Outcome:** {}\n**Confidence:** {:.2}\n**Usage Count:** {}\n",
            i + 1,
            memory.title,
            memory.description,
            memory.content,
            memory.tags.join(", "),
            outcome_str(memory.outcome),
            memory.confidence,
            memory.usage_count,
        ));
        if i + 1 != cluster.members.len() {
            prompt.push_str("---\n");
        }
    }

    prompt.push_str(
        "\n## Your Task\nIdentify the shared theme across these memories, synthesize them into one coherent strategy, preserve important details from each source, and note when the synthesized strategy applies.\n\n## Output Format\nTITLE: ...\nCONTENT:\n...\nTAGS: a, b, c\nOUTCOME: success|failure\nSOURCE_ATTRIBUTION:\n...\n",
    );

    prompt
}

fn outcome_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "success",
        Outcome::Failure => "failure",
    }
}

#[derive(Debug, Default)]
struct ParsedFields {
    title: Option<String>,
    content: Option<String>,
    tags: Option<String>,
    outcome: Option<String>,
    source_attribution: Option<String>,
}

/// Locates each recognised label and takes everything up to the next
/// recognised label (in any order), stripping markdown fences and
/// whitespace (spec.md §6.3).
fn parse_consolidation_response(response: &str) -> ParsedFields {
    let mut matches: Vec<(usize, usize, &str)> = Vec::new();
    for label in FIELD_LABELS {
        let mut start = 0;
        while let Some(pos) = response[start..].find(label) {
            let abs_pos = start + pos;
            matches.push((abs_pos, abs_pos + label.len(), label));
            start = abs_pos + label.len();
        }
    }
    matches.sort_by_key(|(pos, _, _)| *pos);

    let mut fields = ParsedFields::default();
    for (i, (_, value_start, label)) in matches.iter().enumerate() {
        let value_end = matches.get(i + 1).map(|(pos, _, _)| *pos).unwrap_or(response.len());
        let raw = response[*value_start..value_end].trim();
        let cleaned = raw.trim_matches('`').trim().to_string();

        match *label {
            "TITLE:" => fields.title = Some(cleaned),
            "CONTENT:" => fields.content = Some(cleaned),
            "TAGS:" => fields.tags = Some(cleaned),
            "OUTCOME:" => fields.outcome = Some(cleaned),
            "SOURCE_ATTRIBUTION:" => fields.source_attribution = Some(cleaned),
            _ => {}
        }
    }
    fields
}

/// `Σ(c_i · (usage_i+1)) / Σ(usage_i+1)`, clamped to [0,1], plus a
/// consensus bonus when confidence variance across sources is low
/// (spec.md §4.3.3).
pub fn merged_confidence(members: &[Memory]) -> f32 {
    if members.is_empty() {
        return 0.5;
    }

    let weighted_sum: f32 = members.iter().map(|m| m.confidence * (m.usage_count as f32 + 1.0)).sum();
    let weight_total: f32 = members.iter().map(|m| m.usage_count as f32 + 1.0).sum();
    let base = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.5 };

    let mean: f32 = members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32;
    let variance: f32 = members.iter().map(|m| (m.confidence - mean).powi(2)).sum::<f32>() / members.len() as f32;
    let std = variance.sqrt();

    let bonus = if members.len() >= 2 {
        (1.0 - std / 0.5).max(0.0) * (members.len() as f32 / 10.0).min(1.0) * 0.1
    } else {
        0.0
    };

    (base + bonus).clamp(0.0, 1.0)
}

/// Synthesizes a cluster into a new consolidated `Memory` via the LLM. Does
/// not persist the result or archive the sources — the caller
/// (`consolidate::consolidate`) owns that orchestration.
pub async fn merge_cluster(cluster: &SimilarityCluster, llm: &Arc<dyn LLMClient>) -> Result<Memory> {
    if cluster.members.len() < 2 {
        return Err(ReasoningBankError::ClusterTooSmall);
    }
    let project_id = &cluster.members[0].project_id;
    if cluster.members.iter().any(|m| &m.project_id != project_id) {
        return Err(ReasoningBankError::ClusterProjectMismatch);
    }

    let prompt = build_consolidation_prompt(cluster);
    let response = llm.complete(&prompt).await?;
    let fields = parse_consolidation_response(&response);

    let title = fields.title.filter(|s| !s.is_empty()).ok_or_else(|| {
        ReasoningBankError::ConsolidationParse("missing required TITLE field".to_string())
    })?;
    let content = fields.content.filter(|s| !s.is_empty()).ok_or_else(|| {
        ReasoningBankError::ConsolidationParse("missing required CONTENT field".to_string())
    })?;
    let outcome_raw = fields.outcome.ok_or_else(|| {
        ReasoningBankError::ConsolidationParse("missing required OUTCOME field".to_string())
    })?;
    let outcome = match outcome_raw.trim().to_lowercase().as_str() {
        "success" => Outcome::Success,
        "failure" => Outcome::Failure,
        other => {
            return Err(ReasoningBankError::ConsolidationParse(format!("invalid OUTCOME value: {other}")));
        }
    };

    let attribution = fields.source_attribution.unwrap_or_default();
    if attribution.is_empty() {
        warn!(project_id = %project_id, "consolidation response had no SOURCE_ATTRIBUTION field");
    }

    let mut memory = Memory::new(project_id.clone(), title, content, outcome);
    // (I2): a consolidated memory's description MUST carry a synthesis marker
    // so `Memory::is_consolidated` (and the search boost keyed off it) fires.
    // The LLM is never asked to emit the marker itself (spec.md §6.3 leaves
    // SOURCE_ATTRIBUTION free-form), so it's prepended here.
    memory.description = if attribution.is_empty() {
        format!("Synthesized from {} memories.", cluster.members.len())
    } else {
        format!("Synthesized from {} memories. {}", cluster.members.len(), attribution)
    };
    memory.tags = fields
        .tags
        .map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    memory.confidence = merged_confidence(&cluster.members);
    memory.kind = MemoryKind::Consolidated;
    memory.clamp_confidence();

    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cluster(confidences: &[(f32, u64)]) -> SimilarityCluster {
        let members = confidences
            .iter()
            .map(|(c, usage)| {
                let mut m = Memory::new("p1", "t", "c", Outcome::Success);
                m.confidence = *c;
                m.usage_count = *usage;
                m
            })
            .collect();
        SimilarityCluster { members, centroid: vec![], avg_similarity: 0.9, min_similarity: 0.85 }
    }

    #[test]
    fn parses_all_five_fields_in_any_order() {
        let response = "OUTCOME: success\nTITLE: Use retries for flaky network calls\nSOURCE_ATTRIBUTION:\nMemories 1 and 2\nCONTENT:\nRetry with backoff.\nTAGS: network, retries";
        let fields = parse_consolidation_response(response);
        assert_eq!(fields.title.as_deref(), Some("Use retries for flaky network calls"));
        assert_eq!(fields.content.as_deref(), Some("Retry with backoff."));
        assert_eq!(fields.outcome.as_deref(), Some("success"));
        assert_eq!(fields.tags.as_deref(), Some("network, retries"));
        assert_eq!(fields.source_attribution.as_deref(), Some("Memories 1 and 2"));
    }

    #[test]
    fn missing_content_field_fails_parse() {
        let cluster = make_cluster(&[(0.6, 1), (0.7, 2)]);
        let response = "TITLE: t\nOUTCOME: success".to_string();
        let fields = parse_consolidation_response(&response);
        assert!(fields.content.is_none());
        let _ = cluster;
    }

    #[test]
    fn merged_confidence_weighs_by_usage_and_stays_in_bounds() {
        let cluster = make_cluster(&[(0.9, 10), (0.9, 10), (0.9, 10)]);
        let confidence = merged_confidence(&cluster.members);
        assert!(confidence >= 0.0 && confidence <= 1.0);
        assert!(confidence > 0.85);
    }

    #[test]
    fn merged_confidence_handles_empty_slice() {
        assert_eq!(merged_confidence(&[]), 0.5);
    }
}
