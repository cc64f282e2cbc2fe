// src/service/mod.rs
// Single entry point for memory CRUD, semantic search, and feedback routing
// (spec.md §4.1). Owns the injected Store/StoreProvider, Embedder, and the
// optional Bayesian ConfidenceEngine.

mod refinements;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ReasoningBankConfig;
use crate::confidence::{ConfidenceEngine, Signal, SignalType};
use crate::embedder::Embedder;
use crate::error::{ReasoningBankError, Result};
use crate::memory::{Memory, MemoryState, Outcome};
use crate::store::{
    filter_gte, memories_collection_name, DocumentInput, Filters, Store, StoreProvider,
    RESERVED_FILTER_KEYS,
};

pub use refinements::{extract_suggested_refinements, SearchMetadata};

/// `Service::Search` / `Service::SearchWithMetadata` results: a memory plus
/// the relevance it was ranked by (after the consolidation boost, §4.1.1).
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    pub relevance: f32,
}

pub struct Service {
    tenant: String,
    store_provider: Arc<dyn StoreProvider>,
    embedder: Option<Arc<dyn Embedder>>,
    confidence_engine: Option<Arc<ConfidenceEngine>>,
    config: ReasoningBankConfig,
}

impl Service {
    pub fn new(
        tenant: impl Into<String>,
        store_provider: Arc<dyn StoreProvider>,
        embedder: Option<Arc<dyn Embedder>>,
        confidence_engine: Option<Arc<ConfidenceEngine>>,
        config: ReasoningBankConfig,
    ) -> Result<Self> {
        let tenant = tenant.into();
        if tenant.trim().is_empty() {
            return Err(ReasoningBankError::MissingTenant);
        }
        Ok(Self { tenant, store_provider, embedder, confidence_engine, config })
    }

    pub fn config(&self) -> &ReasoningBankConfig {
        &self.config
    }

    fn embedder(&self) -> Result<&Arc<dyn Embedder>> {
        self.embedder.as_ref().ok_or(ReasoningBankError::EmbedderNotConfigured)
    }

    async fn project_store(&self, project_id: &str) -> Result<Arc<dyn Store>> {
        self.store_provider.get_project_store(&self.tenant, None, project_id).await
    }

    /// Every project's memories collection also lives behind the org store,
    /// so operations that need to locate a memory without a known project
    /// (`Get`, `Delete`) can enumerate collections there (spec.md §4.1).
    async fn org_store(&self) -> Result<Arc<dyn Store>> {
        self.store_provider.get_org_store(&self.tenant).await
    }

    async fn ensure_collection(&self, store: &Arc<dyn Store>, collection: &str) -> Result<()> {
        if !store.collection_exists(collection).await? {
            store.create_collection(collection, self.config.embedding_dimension).await?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------- Record

    /// Validates, assigns the initial confidence unless the caller already
    /// overrode the neutral prior, embeds, and persists (spec.md §4.1 Record).
    pub async fn record(&self, mut memory: Memory) -> Result<Memory> {
        memory.validate()?;

        if memory.kind == crate::memory::MemoryKind::Explicit && (memory.confidence == 0.5 || memory.confidence == 0.0) {
            memory.confidence = 0.8;
        }
        memory.clamp_confidence();
        memory.state = MemoryState::Active;
        memory.touch();

        let store = self.project_store(&memory.project_id).await?;
        let collection = memories_collection_name(&memory.project_id);
        self.ensure_collection(&store, &collection).await?;

        let embedding = self.embedder()?.embed_query(&memory.embedding_text()).await?;
        let doc = DocumentInput {
            id: memory.id.to_string(),
            content: memory.embedding_text(),
            embedding,
            metadata: memory.to_metadata(),
            collection,
        };
        store.add_documents(vec![doc]).await?;

        info!(memory_id = %memory.id, project_id = %memory.project_id, "recorded memory");
        Ok(memory)
    }

    // ---------------------------------------------------------------- Search

    pub async fn search(&self, project_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let ranked = self.search_ranked(project_id, query, limit).await?;
        Ok(ranked.into_iter().map(|r| r.memory).collect())
    }

    pub async fn search_with_metadata(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<(Vec<Memory>, SearchMetadata)> {
        let ranked = self.search_ranked(project_id, query, limit).await?;
        let metadata = refinements::build_search_metadata(&ranked);
        Ok((ranked.into_iter().map(|r| r.memory).collect(), metadata))
    }

    async fn search_ranked(&self, project_id: &str, query: &str, limit: usize) -> Result<Vec<RankedMemory>> {
        if query.trim().is_empty() {
            return Err(ReasoningBankError::EmptyQuery);
        }
        let limit = if limit == 0 { self.config.default_search_limit } else { limit };

        let collection = memories_collection_name(project_id);
        let store = self.project_store(project_id).await?;
        if !store.collection_exists(&collection).await? {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder()?.embed_query(query).await?;
        let filters = Filters::from([filter_gte("confidence", self.config.min_confidence as f64)]);
        // Overfetch: archived-state filtering and the consolidation boost both
        // happen after the Store round-trip (spec.md §4.1.1).
        let hits = store.search_in_collection(&collection, &query_embedding, limit * 3 + 10, &filters).await?;

        let mut ranked = Vec::with_capacity(hits.len());
        for hit in hits {
            let memory = match Memory::from_metadata(&hit.metadata) {
                Ok(m) => m,
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "skipping unparseable search hit");
                    continue;
                }
            };
            if memory.state != MemoryState::Active {
                continue;
            }
            let relevance = if memory.is_consolidated() {
                hit.score * self.config.consolidation_boost_factor
            } else {
                hit.score
            };
            ranked.push(RankedMemory { memory, relevance });
        }

        ranked.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }

    // ------------------------------------------------------------------ Get

    pub async fn get_by_project_id(&self, project_id: &str, id: Uuid) -> Result<Memory> {
        let collection = memories_collection_name(project_id);
        let store = self.project_store(project_id).await?;
        self.find_in_collection(&store, &collection, id).await?.ok_or_else(|| ReasoningBankError::MemoryNotFound(id.to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Memory> {
        let store = self.org_store().await?;
        for collection in store.list_collections().await? {
            if let Some(memory) = self.find_in_collection(&store, &collection, id).await? {
                return Ok(memory);
            }
        }
        Err(ReasoningBankError::MemoryNotFound(id.to_string()))
    }

    async fn find_in_collection(&self, store: &Arc<dyn Store>, collection: &str, id: Uuid) -> Result<Option<Memory>> {
        if !store.collection_exists(collection).await? {
            return Ok(None);
        }
        let dims = self.embedder.as_ref().map(|e| e.dimensions()).unwrap_or(1);
        let zero_vector = vec![0.0f32; dims];
        let filters = Filters::from([(String::from("id"), crate::store::FilterValue::Eq(Value::from(id.to_string())))]);
        let hits = store.search_in_collection(collection, &zero_vector, 1, &filters).await?;
        match hits.into_iter().next() {
            Some(hit) => Ok(Some(Memory::from_metadata(&hit.metadata)?)),
            None => Ok(None),
        }
    }

    // --------------------------------------------------------------- Delete

    pub async fn delete_by_project_id(&self, project_id: &str, id: Uuid) -> Result<()> {
        let collection = memories_collection_name(project_id);
        let store = self.project_store(project_id).await?;
        self.delete_in_collection(&store, &collection, id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let store = self.org_store().await?;
        for collection in store.list_collections().await? {
            if self.find_in_collection(&store, &collection, id).await?.is_some() {
                return self.delete_in_collection(&store, &collection, id).await;
            }
        }
        Err(ReasoningBankError::MemoryNotFound(id.to_string()))
    }

    async fn delete_in_collection(&self, store: &Arc<dyn Store>, collection: &str, id: Uuid) -> Result<()> {
        store.delete_documents_from_collection(collection, &[id.to_string()]).await?;
        Ok(())
    }

    // ---------------------------------------------------------- Feedback

    pub async fn feedback(&self, id: Uuid, helpful: bool) -> Result<f32> {
        self.apply_signal(id, SignalType::Explicit, helpful, None).await
    }

    pub async fn record_outcome(&self, id: Uuid, success: bool, session_id: Option<String>) -> Result<f32> {
        self.apply_signal(id, SignalType::Outcome, success, session_id).await
    }

    async fn apply_signal(&self, id: Uuid, signal_type: SignalType, positive: bool, session_id: Option<String>) -> Result<f32> {
        let mut memory = self.get(id).await?;

        let new_confidence = if let Some(engine) = &self.confidence_engine {
            let mut signal = Signal::new(memory.id, &memory.project_id, signal_type, positive);
            if let Some(session_id) = session_id {
                signal = signal.with_session(session_id);
            }
            engine.record_signal(signal).await? as f32
        } else {
            // Non-Bayesian fallback (spec.md §4.1.2).
            let delta = if positive { 0.1 } else { -0.15 };
            memory.confidence + delta
        };

        memory.confidence = new_confidence;
        memory.clamp_confidence();
        memory.touch();
        self.rewrite(&memory).await?;
        debug!(memory_id = %memory.id, confidence = memory.confidence, "applied feedback signal");
        Ok(memory.confidence)
    }

    /// Delete-then-add so the document's embedding metadata (confidence,
    /// updated_at, usage_count) is fully refreshed (spec.md §4.1 Feedback).
    async fn rewrite(&self, memory: &Memory) -> Result<()> {
        let store = self.project_store(&memory.project_id).await?;
        let collection = memories_collection_name(&memory.project_id);
        store.delete_documents_from_collection(&collection, &[memory.id.to_string()]).await?;

        let embedding = self.embedder()?.embed_query(&memory.embedding_text()).await?;
        let doc = DocumentInput {
            id: memory.id.to_string(),
            content: memory.embedding_text(),
            embedding,
            metadata: memory.to_metadata(),
            collection,
        };
        store.add_documents(vec![doc]).await?;
        Ok(())
    }

    /// Used by the Distiller to archive source memories after a consolidation
    /// merge (spec.md §4.3.2 step 6).
    pub async fn archive_into(&self, memory: &mut Memory, consolidated_id: Uuid) -> Result<()> {
        memory.consolidation_id = Some(consolidated_id);
        memory.state = MemoryState::Archived;
        memory.touch();
        self.rewrite(memory).await
    }

    // ----------------------------------------------------------- Listing

    pub async fn list_memories(&self, project_id: &str, limit: i64, offset: i64) -> Result<Vec<Memory>> {
        if limit < 0 || offset < 0 {
            return Err(ReasoningBankError::InvalidPagination(format!("limit={limit}, offset={offset}")));
        }
        let collection = memories_collection_name(project_id);
        let store = self.project_store(project_id).await?;
        if !store.collection_exists(&collection).await? {
            return Ok(Vec::new());
        }

        let dims = self.embedder.as_ref().map(|e| e.dimensions()).unwrap_or(1);
        let zero_vector = vec![0.0f32; dims];
        let fetch = if limit == 0 { usize::MAX } else { (limit as usize).saturating_add(offset as usize) };
        let hits = store.search_in_collection(&collection, &zero_vector, fetch, &Filters::new()).await?;

        let memories: Vec<Memory> = hits
            .into_iter()
            .filter_map(|hit| Memory::from_metadata(&hit.metadata).ok())
            .skip(offset as usize)
            .collect();

        if limit == 0 {
            Ok(memories)
        } else {
            Ok(memories.into_iter().take(limit as usize).collect())
        }
    }

    pub async fn count(&self, project_id: &str) -> Result<u64> {
        let collection = memories_collection_name(project_id);
        let store = self.project_store(project_id).await?;
        Ok(store.get_collection_info(&collection).await?.map(|i| i.points_count).unwrap_or(0))
    }

    // -------------------------------------------------------------- Vectors

    pub async fn get_memory_vector(&self, id: Uuid) -> Result<Vec<f32>> {
        let memory = self.get(id).await?;
        self.embedder()?.embed_query(&memory.embedding_text()).await
    }

    pub async fn get_memory_vector_by_project_id(&self, project_id: &str, id: Uuid) -> Result<Vec<f32>> {
        let memory = self.get_by_project_id(project_id, id).await?;
        self.embedder()?.embed_query(&memory.embedding_text()).await
    }

    /// Read-only introspection of a project's currently learned signal-type
    /// weights — useful for operators investigating why a project's
    /// confidence scores trend a particular way. Returns priors if the
    /// project has no `ConfidenceEngine` signal history, or if no
    /// `ConfidenceEngine` is configured at all.
    pub async fn debug_weights(&self, project_id: &str) -> Result<crate::confidence::BetaMeans> {
        match &self.confidence_engine {
            Some(engine) => Ok(engine.project_weights(project_id).await?.as_beta_means()),
            None => Ok(crate::confidence::ProjectWeights::priors(project_id).as_beta_means()),
        }
    }

    /// Rejects caller-supplied filters that would cross tenant/project
    /// isolation (spec.md §4.1 "filter-injection").
    pub fn reject_reserved_filters(filters: &Filters) -> Result<()> {
        for key in filters.keys() {
            if RESERVED_FILTER_KEYS.contains(&key.as_str()) {
                return Err(ReasoningBankError::ReservedFilterKey(key.clone()));
            }
        }
        Ok(())
    }
}
