// src/error.rs
// Standardized error taxonomy for the ReasoningBank core (see spec.md §7).

use thiserror::Error;

/// Main error type for the ReasoningBank library.
#[derive(Error, Debug)]
pub enum ReasoningBankError {
    #[error("invalid memory: {0}")]
    InvalidMemory(String),

    #[error("project_id must not be empty")]
    EmptyProjectId,

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("content must not be empty")]
    EmptyContent,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("memory not found: {0}")]
    MemoryNotFound(String),

    #[error("missing tenant identity")]
    MissingTenant,

    #[error("filter uses a reserved key: {0}")]
    ReservedFilterKey(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("embedder not configured")]
    EmbedderNotConfigured,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("LLM client not configured")]
    LlmNotConfigured,

    #[error("LLM completion failed: {0}")]
    Llm(String),

    #[error("failed to parse consolidation response: {0}")]
    ConsolidationParse(String),

    #[error("cluster must have at least 2 members")]
    ClusterTooSmall,

    #[error("cluster members must share a project_id")]
    ClusterProjectMismatch,

    #[error("invalid limit or offset: {0}")]
    InvalidPagination(String),

    #[error("scheduler is already running")]
    SchedulerAlreadyRunning,

    #[error("scheduler was stopped and cannot be restarted")]
    SchedulerStopped,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, ReasoningBankError>;
