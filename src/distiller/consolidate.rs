// src/distiller/consolidate.rs
// Consolidate(project, opts) orchestration (spec.md §4.3.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ReasoningBankConfig;
use crate::distiller::cluster::{cluster_member_ids, find_similar_clusters};
use crate::distiller::merge::merge_cluster;
use crate::distiller::session::{distill_session, SessionSummary};
use crate::error::Result;
use crate::llm::LLMClient;
use crate::memory::{Memory, MemoryState};
use crate::service::Service;

#[derive(Debug, Clone)]
pub struct ConsolidationOptions {
    pub similarity_threshold: f32,
    /// 0 = unbounded.
    pub max_clusters_per_run: usize,
    pub dry_run: bool,
    pub force_all: bool,
}

impl ConsolidationOptions {
    pub fn defaults(config: &ReasoningBankConfig) -> Self {
        Self {
            similarity_threshold: config.default_similarity_threshold,
            max_clusters_per_run: 0,
            dry_run: false,
            force_all: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationResult {
    pub created_memory_ids: Vec<Uuid>,
    /// Dry-run results use synthetic ids prefixed `"dry-run-cluster-"`
    /// instead of real `Uuid`s (spec.md §4.3.4 step 3), so this carries the
    /// string form rather than `Uuid` for that case.
    pub created_memory_labels: Vec<String>,
    pub archived_memory_ids: Vec<Uuid>,
    pub skipped_count: usize,
    pub total_processed: usize,
    pub duration: StdDuration,
}

pub struct Distiller {
    service: Arc<Service>,
    llm: Option<Arc<dyn LLMClient>>,
    config: ReasoningBankConfig,
    last_consolidation: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl Distiller {
    pub fn new(service: Arc<Service>, llm: Option<Arc<dyn LLMClient>>, config: ReasoningBankConfig) -> Self {
        Self { service, llm, config, last_consolidation: RwLock::new(HashMap::new()) }
    }

    /// Turns a finished session into memory/memories and records each one
    /// (spec.md §4.3.1 step 4). Individual record failures are logged and
    /// skipped rather than aborting the batch — the same "logged per-item,
    /// processing continues" policy §7 applies to consolidation.
    pub async fn distill(&self, summary: &SessionSummary) -> Result<Vec<Memory>> {
        let memories = distill_session(summary)?;
        let mut recorded = Vec::with_capacity(memories.len());
        for memory in memories {
            match self.service.record(memory).await {
                Ok(saved) => recorded.push(saved),
                Err(e) => warn!(session_id = %summary.session_id, error = %e, "failed to record distilled memory, continuing"),
            }
        }
        Ok(recorded)
    }

    async fn debounced(&self, project_id: &str) -> bool {
        let window = Duration::hours(self.config.consolidation_window_hours);
        let last = self.last_consolidation.read().await;
        match last.get(project_id) {
            Some(ts) => Utc::now() - *ts < window,
            None => false,
        }
    }

    pub async fn consolidate(&self, project_id: &str, opts: ConsolidationOptions) -> Result<ConsolidationResult> {
        let start = Instant::now();

        if !opts.force_all && self.debounced(project_id).await {
            info!(project_id, "consolidation skipped: within debounce window");
            return Ok(ConsolidationResult { skipped_count: 1, duration: start.elapsed(), ..Default::default() });
        }

        let all_memories = self.service.list_memories(project_id, 0, 0).await?;
        let active: Vec<_> = all_memories.into_iter().filter(|m| m.state == MemoryState::Active).collect();

        let mut with_vectors = Vec::with_capacity(active.len());
        for memory in active {
            match self.service.get_memory_vector_by_project_id(project_id, memory.id).await {
                Ok(vector) => with_vectors.push((memory, vector)),
                Err(e) => warn!(memory_id = %memory.id, error = %e, "skipping memory: vector retrieval failed"),
            }
        }

        let mut clusters = find_similar_clusters(with_vectors, opts.similarity_threshold);

        if opts.dry_run {
            let labels: Vec<String> =
                (0..clusters.len()).map(|i| format!("dry-run-cluster-{i}")).collect();
            let archived: Vec<Uuid> = clusters.iter().flat_map(cluster_member_ids).collect();
            info!(project_id, clusters = clusters.len(), "dry-run consolidation: no mutations, no LLM calls");
            return Ok(ConsolidationResult {
                created_memory_ids: Vec::new(),
                created_memory_labels: labels,
                archived_memory_ids: archived,
                skipped_count: 0,
                total_processed: clusters.len(),
                duration: start.elapsed(),
            });
        }

        if opts.max_clusters_per_run > 0 && clusters.len() > opts.max_clusters_per_run {
            clusters.truncate(opts.max_clusters_per_run);
        }

        let mut result = ConsolidationResult { total_processed: clusters.len(), ..Default::default() };

        for cluster in &clusters {
            match self.merge_and_archive(cluster).await {
                Ok((created_id, archived_ids)) => {
                    result.created_memory_ids.push(created_id);
                    result.archived_memory_ids.extend(archived_ids);
                }
                Err(e) => {
                    warn!(project_id, error = %e, "skipping cluster: merge failed");
                    result.skipped_count += 1;
                }
            }
        }

        self.last_consolidation.write().await.insert(project_id.to_string(), Utc::now());
        result.duration = start.elapsed();
        info!(
            project_id,
            created = result.created_memory_ids.len(),
            archived = result.archived_memory_ids.len(),
            skipped = result.skipped_count,
            "consolidation run complete"
        );
        Ok(result)
    }

    async fn merge_and_archive(&self, cluster: &crate::distiller::cluster::SimilarityCluster) -> Result<(Uuid, Vec<Uuid>)> {
        let llm = self.llm.as_ref().ok_or(crate::error::ReasoningBankError::LlmNotConfigured)?;
        let merged = merge_cluster(cluster, llm).await?;
        let saved = self.service.record(merged).await?;

        let mut archived_ids = Vec::with_capacity(cluster.members.len());
        for source in &cluster.members {
            let mut source = source.clone();
            if let Err(e) = self.service.archive_into(&mut source, saved.id).await {
                warn!(memory_id = %source.id, error = %e, "failed to archive source memory, continuing");
                continue;
            }
            archived_ids.push(source.id);
        }
        Ok((saved.id, archived_ids))
    }

    /// Iterates projects and aggregates results; per-project errors are
    /// logged and do not abort the loop (spec.md §4.3.4 ConsolidateAll).
    pub async fn consolidate_all(&self, project_ids: &[String], opts: ConsolidationOptions) -> Vec<(String, Result<ConsolidationResult>)> {
        let mut results = Vec::with_capacity(project_ids.len());
        for project_id in project_ids {
            let result = self.consolidate(project_id, opts.clone()).await;
            if let Err(e) = &result {
                warn!(project_id, error = %e, "consolidation failed for project, continuing");
            }
            results.push((project_id.clone(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceEngine;
    use crate::confidence::InMemorySignalStore;
    use crate::embedder::fake::FakeEmbedder;
    use crate::llm::fake::FakeLLMClient;
    use crate::memory::{Memory, Outcome};
    use crate::store::memory::InMemoryStoreProvider;

    fn distiller_with_llm(llm: Option<Arc<dyn LLMClient>>) -> (Arc<Service>, Distiller) {
        let config = ReasoningBankConfig::default();
        let engine = Arc::new(ConfidenceEngine::new(Arc::new(InMemorySignalStore::new()), config.signal_rollup_cutoff_days, config.weight_learning_window_hours));
        let service = Arc::new(
            Service::new(
                "tenant-1",
                Arc::new(InMemoryStoreProvider::new()),
                Some(Arc::new(FakeEmbedder::new(16))),
                Some(engine),
                config.clone(),
            )
            .unwrap(),
        );
        let distiller = Distiller::new(service.clone(), llm, config);
        (service, distiller)
    }

    async fn seed_similar_memories(service: &Service, n: usize) {
        for i in 0..n {
            let memory = Memory::new("p1", format!("Flaky retry pattern {i}"), "Retry network calls with exponential backoff", Outcome::Success);
            service.record(memory).await.unwrap();
        }
    }

    #[tokio::test]
    async fn distill_records_success_memory_from_session() {
        let (service, distiller) = distiller_with_llm(None);
        let summary = SessionSummary {
            session_id: "s1".into(),
            project_id: "p1".into(),
            outcome: crate::distiller::session::SessionOutcome::Success,
            task: "Fix the flaky retry test".into(),
            approach: "Added jittered backoff".into(),
            result: "Test passes consistently".into(),
            tags: vec!["testing".into()],
            duration_secs: 12,
            completed_at: Utc::now(),
        };

        let recorded = distiller.distill(&summary).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert!((recorded[0].confidence - 0.6).abs() < 1e-6);

        let stored = service.list_memories("p1", 0, 0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, recorded[0].id);
    }

    #[tokio::test]
    async fn distill_partial_outcome_records_both_memories() {
        let (service, distiller) = distiller_with_llm(None);
        let summary = SessionSummary {
            session_id: "s2".into(),
            project_id: "p1".into(),
            outcome: crate::distiller::session::SessionOutcome::Partial,
            task: "Migrate the auth middleware".into(),
            approach: "Swapped the session map for a token store".into(),
            result: "Half the endpoints still use the old path".into(),
            tags: vec![],
            duration_secs: 30,
            completed_at: Utc::now(),
        };

        let recorded = distiller.distill(&summary).await.unwrap();
        assert_eq!(recorded.len(), 2);
        let stored = service.list_memories("p1", 0, 0).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn debounced_second_run_makes_no_llm_calls() {
        let fake_llm = Arc::new(FakeLLMClient::always_succeeding(
            "TITLE: Retry flaky calls\nCONTENT:\nUse exponential backoff.\nOUTCOME: success\nSOURCE_ATTRIBUTION:\nmerged",
        ));
        let (service, distiller) = distiller_with_llm(Some(fake_llm.clone()));
        seed_similar_memories(&service, 3).await;

        let opts = ConsolidationOptions { similarity_threshold: 0.5, ..ConsolidationOptions::defaults(&ReasoningBankConfig::default()) };
        let first = distiller.consolidate("p1", opts.clone()).await.unwrap();
        let calls_after_first = fake_llm.call_count();
        assert_eq!(first.skipped_count, 0);

        let second = distiller.consolidate("p1", opts).await.unwrap();
        assert_eq!(fake_llm.call_count(), calls_after_first);
        assert!(second.created_memory_ids.is_empty());
        assert!(second.archived_memory_ids.is_empty());
        assert_eq!(second.skipped_count, 1);
    }

    #[tokio::test]
    async fn dry_run_makes_no_mutations_and_no_llm_calls() {
        let fake_llm = Arc::new(FakeLLMClient::always_succeeding("unused"));
        let (service, distiller) = distiller_with_llm(Some(fake_llm.clone()));
        seed_similar_memories(&service, 3).await;

        let before = service.list_memories("p1", 0, 0).await.unwrap();

        let opts = ConsolidationOptions {
            similarity_threshold: 0.5,
            dry_run: true,
            ..ConsolidationOptions::defaults(&ReasoningBankConfig::default())
        };
        let result = distiller.consolidate("p1", opts).await.unwrap();

        assert_eq!(fake_llm.call_count(), 0);
        assert!(!result.created_memory_labels.is_empty());
        assert!(result.created_memory_labels.iter().all(|l| l.starts_with("dry-run-cluster-")));

        let after = service.list_memories("p1", 0, 0).await.unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn missing_llm_client_skips_every_cluster() {
        let (service, distiller) = distiller_with_llm(None);
        seed_similar_memories(&service, 3).await;

        let opts = ConsolidationOptions { similarity_threshold: 0.5, ..ConsolidationOptions::defaults(&ReasoningBankConfig::default()) };
        let result = distiller.consolidate("p1", opts).await.unwrap();
        assert!(result.created_memory_ids.is_empty());
        assert_eq!(result.skipped_count, result.total_processed);
    }
}
