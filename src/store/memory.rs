// src/store/memory.rs
// In-memory Store/StoreProvider — used by tests and as a reference
// implementation of the Store contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{CollectionInfo, DocumentInput, FilterValue, Filters, SearchHit, Store, StoreProvider};

#[derive(Clone)]
struct Point {
    id: String,
    content: String,
    embedding: Vec<f32>,
    metadata: HashMap<String, Value>,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, (u64, Vec<Point>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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

fn matches_filters(metadata: &HashMap<String, Value>, filters: &Filters) -> bool {
    for (key, filter) in filters {
        let Some(value) = metadata.get(key) else {
            return false;
        };
        match filter {
            FilterValue::Eq(expected) => {
                if value != expected {
                    return false;
                }
            }
            FilterValue::Gte(min) => {
                let Some(actual) = value.as_f64() else {
                    return false;
                };
                if actual < *min {
                    return false;
                }
            }
        }
    }
    true
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_collection(&self, name: &str, vector_size: u64) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert((vector_size, Vec::new()));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn get_collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|(size, points)| CollectionInfo {
            name: name.to_string(),
            vector_size: *size,
            points_count: points.len() as u64,
        }))
    }

    async fn add_documents(&self, docs: Vec<DocumentInput>) -> Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let entry = collections
                .entry(doc.collection.clone())
                .or_insert((doc.embedding.len() as u64, Vec::new()));
            entry.1.retain(|p| p.id != doc.id);
            entry.1.push(Point {
                id: doc.id.clone(),
                content: doc.content,
                embedding: doc.embedding,
                metadata: doc.metadata,
            });
            ids.push(doc.id);
        }
        Ok(ids)
    }

    async fn search_in_collection(
        &self,
        collection: &str,
        query_embedding: &[f32],
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let Some((_, points)) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|p| matches_filters(&p.metadata, filters))
            .map(|p| SearchHit {
                id: p.id.clone(),
                content: p.content.clone(),
                score: cosine_similarity(query_embedding, &p.embedding),
                metadata: p.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_documents_from_collection(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some((_, points)) = collections.get_mut(collection) {
            points.retain(|p| !ids.contains(&p.id));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Single-tenant-process provider: every (tenant, team, project) triple maps
/// to one shared in-memory store, scoped by collection name alone. Good
/// enough for tests; a real multi-tenant deployment uses `qdrant::QdrantStoreProvider`.
pub struct InMemoryStoreProvider {
    store: Arc<InMemoryStore>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self { store: Arc::new(InMemoryStore::new()) }
    }
}

impl Default for InMemoryStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn get_project_store(&self, _tenant: &str, _team: Option<&str>, _project: &str) -> Result<Arc<dyn Store>> {
        Ok(self.store.clone())
    }

    async fn get_team_store(&self, _tenant: &str, _team: &str) -> Result<Arc<dyn Store>> {
        Ok(self.store.clone())
    }

    async fn get_org_store(&self, _tenant: &str) -> Result<Arc<dyn Store>> {
        Ok(self.store.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
