// src/config.rs
// Environment-driven configuration — single source of truth for all tunables.

#[derive(Clone, Debug)]
pub struct ReasoningBankConfig {
    /// Minimum confidence a memory must have to surface in search (spec.md §4.1).
    pub min_confidence: f32,
    /// Multiplier applied to a consolidated memory's relevance at search time.
    pub consolidation_boost_factor: f32,
    /// Default number of results returned by `Search` when no limit is given.
    pub default_search_limit: usize,
    /// Vector dimension used when a collection must be created.
    pub embedding_dimension: u64,
    /// Signals younger than this are kept individually; older ones roll up.
    pub signal_rollup_cutoff_days: i64,
    /// Minimum interval between successive consolidations of the same project.
    pub consolidation_window_hours: i64,
    /// Default cosine-similarity threshold for clustering.
    pub default_similarity_threshold: f32,
    /// Window used by weight learning to gather "recent" signals after explicit feedback.
    pub weight_learning_window_hours: i64,
}

impl Default for ReasoningBankConfig {
    fn default() -> Self {
        Self {
            min_confidence: env_f32("RBANK_MIN_CONFIDENCE", 0.7),
            consolidation_boost_factor: env_f32("RBANK_CONSOLIDATION_BOOST", 1.2),
            default_search_limit: env_usize("RBANK_DEFAULT_SEARCH_LIMIT", 10),
            embedding_dimension: env_u64("RBANK_EMBEDDING_DIMENSION", 384),
            signal_rollup_cutoff_days: env_i64("RBANK_SIGNAL_ROLLUP_CUTOFF_DAYS", 30),
            consolidation_window_hours: env_i64("RBANK_CONSOLIDATION_WINDOW_HOURS", 24),
            default_similarity_threshold: env_f32("RBANK_DEFAULT_SIMILARITY_THRESHOLD", 0.8),
            weight_learning_window_hours: env_i64("RBANK_WEIGHT_LEARNING_WINDOW_HOURS", 24),
        }
    }
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
