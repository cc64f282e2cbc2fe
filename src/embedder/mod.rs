// src/embedder/mod.rs
// text -> fixed-dimension vector (spec.md §6.1).

pub mod fake;
pub mod http;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}
