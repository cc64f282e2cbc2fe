// src/store/mod.rs
// The injected vector-index abstraction (spec.md §6.1). The underlying vector
// index is an external collaborator — only the trait surface is specified
// here; `qdrant` and `memory` below are two concrete implementations (a real
// backend and an in-memory test double), matching the "in-memory
// implementation is provided for tests" design note in spec.md §9.

pub mod memory;
pub mod qdrant;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A single point stored in a collection: opaque id, embedded text, and a
/// flat metadata payload. Statically-typed callers (the `Service`) serialize
/// their domain struct into this map rather than passing an opaque map
/// through the whole stack (spec.md §9 design note on "dynamic map of
/// metadata").
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, Value>,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: u64,
    pub points_count: u64,
}

/// A metadata filter value. The spec fixes retrieval to "semantic similarity
/// with metadata filters" (Non-goals: no general query language), so this
/// stays a closed, small vocabulary rather than a generic expression tree.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Eq(Value),
    Gte(f64),
}

pub type Filters = HashMap<String, FilterValue>;

pub fn filter_eq(field: &str, value: impl Into<Value>) -> (String, FilterValue) {
    (field.to_string(), FilterValue::Eq(value.into()))
}

pub fn filter_gte(field: &str, value: f64) -> (String, FilterValue) {
    (field.to_string(), FilterValue::Gte(value))
}

/// Reserved metadata keys a caller-supplied filter must never set directly —
/// they are injected by the `Service` to enforce tenant isolation
/// (spec.md §4.1 "filter-injection").
pub const RESERVED_FILTER_KEYS: [&str; 2] = ["tenant_id", "project_id"];

/// Per-project (or per-tenant/team) physical document store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_collection(&self, name: &str, vector_size: u64) -> Result<()>;
    async fn delete_collection(&self, name: &str) -> Result<()>;
    async fn collection_exists(&self, name: &str) -> Result<bool>;
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn get_collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn add_documents(&self, docs: Vec<DocumentInput>) -> Result<Vec<String>>;

    async fn search_in_collection(
        &self,
        collection: &str,
        query_embedding: &[f32],
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<SearchHit>>;

    async fn delete_documents_from_collection(&self, collection: &str, ids: &[String]) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Factory for per-(tenant, team?, project) physical stores — enforces
/// multi-tenant isolation by construction (spec.md §6.1).
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn get_project_store(
        &self,
        tenant: &str,
        team: Option<&str>,
        project: &str,
    ) -> Result<std::sync::Arc<dyn Store>>;

    async fn get_team_store(&self, tenant: &str, team: &str) -> Result<std::sync::Arc<dyn Store>>;

    async fn get_org_store(&self, tenant: &str) -> Result<std::sync::Arc<dyn Store>>;

    async fn close(&self) -> Result<()>;
}

/// Deterministic, reproducible-across-processes collection name for a
/// project's memories (spec.md §4.1 "Collection naming").
pub fn memories_collection_name(project_id: &str) -> String {
    format!("{}_memories", project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_is_deterministic() {
        assert_eq!(memories_collection_name("acme"), "acme_memories");
        assert_eq!(memories_collection_name("acme"), memories_collection_name("acme"));
    }
}
