// src/service/refinements.rs
// SearchWithMetadata's extra fields: query_coverage, entity_matches,
// suggested_refinements (spec.md §4.1 SearchWithMetadata).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::service::RankedMemory;

#[derive(Debug, Clone, Default)]
pub struct SearchMetadata {
    pub query_coverage: f32,
    pub entity_matches: Vec<String>,
    pub suggested_refinements: Vec<String>,
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9_-]*").unwrap());

pub fn build_search_metadata(ranked: &[RankedMemory]) -> SearchMetadata {
    if ranked.is_empty() {
        return SearchMetadata::default();
    }

    let query_coverage = ranked.iter().map(|r| r.relevance).sum::<f32>() / ranked.len() as f32;

    let mut entities = Vec::new();
    let mut seen_entities = HashSet::new();
    for r in ranked {
        for tag in &r.memory.tags {
            if seen_entities.insert(tag.clone()) {
                entities.push(tag.clone());
            }
        }
    }

    let content: Vec<&str> = ranked.iter().map(|r| r.memory.content.as_str()).collect();
    let suggested_refinements = extract_suggested_refinements(&content.join(" "));

    SearchMetadata { query_coverage, entity_matches: entities, suggested_refinements }
}

/// Tokens from result content, sanitized: reject UUID-shaped, e-mail-shaped,
/// and sub-3-char tokens; cap at 5, dedup preserving order (spec.md §4.1).
pub fn extract_suggested_refinements(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut refinements = Vec::new();

    for m in WORD_RE.find_iter(text) {
        let token = m.as_str();
        if token.len() < 3 {
            continue;
        }
        if UUID_RE.is_match(token) || EMAIL_RE.is_match(token) {
            continue;
        }
        let normalized = token.to_lowercase();
        if seen.insert(normalized.clone()) {
            refinements.push(normalized);
        }
        if refinements.len() >= 5 {
            break;
        }
    }
    refinements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_uuids_emails_and_short_tokens() {
        let text = "see 123e4567-e89b-12d3-a456-426614174000 or alice@example.com and go to ab now";
        let refinements = extract_suggested_refinements(text);
        assert!(!refinements.iter().any(|r| r.contains("123e4567")));
        assert!(!refinements.iter().any(|r| r.contains("example")));
        assert!(!refinements.contains(&"ab".to_string()));
        assert!(refinements.contains(&"see".to_string()));
    }

    #[test]
    fn caps_at_five() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let refinements = extract_suggested_refinements(text);
        assert_eq!(refinements.len(), 5);
    }
}
