// src/llm/mod.rs
// prompt -> completion (spec.md §6.1). Used only by Distiller::merge_cluster.

pub mod fake;
pub mod http;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
