// tests/scenarios.rs
// End-to-end scenarios against the in-memory doubles: record/search/feedback/
// consolidation behavior exercised through the public `Service`/`Distiller`
// surface rather than individual unit functions.

use std::sync::Arc;

use reasoningbank::confidence::{ConfidenceEngine, InMemorySignalStore};
use reasoningbank::distiller::{ConsolidationOptions, Distiller};
use reasoningbank::embedder::fake::FakeEmbedder;
use reasoningbank::llm::fake::FakeLLMClient;
use reasoningbank::memory::{Memory, MemoryState, Outcome};
use reasoningbank::service::Service;
use reasoningbank::store::memory::InMemoryStoreProvider;
use reasoningbank::ReasoningBankConfig;

fn make_service() -> Arc<Service> {
    let config = ReasoningBankConfig::default();
    let engine = Arc::new(ConfidenceEngine::new(
        Arc::new(InMemorySignalStore::new()),
        config.signal_rollup_cutoff_days,
        config.weight_learning_window_hours,
    ));
    Arc::new(
        Service::new(
            "tenant-1",
            Arc::new(InMemoryStoreProvider::new()),
            Some(Arc::new(FakeEmbedder::new(16))),
            Some(engine),
            config,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn s1_explicit_record_sets_point_eight_confidence() {
    let service = make_service();
    let mut memory = Memory::new("p1", "T", "C", Outcome::Success);
    memory.confidence = 0.5;

    let saved = service.record(memory).await.unwrap();
    assert!((saved.confidence - 0.8).abs() < f32::EPSILON);
}

#[tokio::test]
async fn s2_archived_memories_filtered_from_search() {
    let service = make_service();

    let mut a = Memory::new("p1", "Active memory", "matching content", Outcome::Success);
    a.confidence = 0.9;
    let a = service.record(a).await.unwrap();

    let mut b = Memory::new("p1", "Archived memory", "matching content", Outcome::Success);
    b.confidence = 0.95;
    let mut b = service.record(b).await.unwrap();
    service.archive_into(&mut b, a.id).await.unwrap();

    let results = service.search("p1", "matching content", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, a.id);
    assert!(results.iter().all(|m| m.state == MemoryState::Active));
}

#[tokio::test]
async fn s3_consolidation_boost_reorders_results() {
    let service = make_service();

    let mut x = Memory::new("p1", "Regular memory", "shared relevance text", Outcome::Success);
    x.confidence = 0.85;
    service.record(x).await.unwrap();

    let mut y = Memory::new("p1", "Synthesized memory", "shared relevance text", Outcome::Success);
    y.confidence = 0.85;
    y.description = "Synthesized from 3 memories".to_string();
    service.record(y).await.unwrap();

    let results = service.search("p1", "shared relevance text", 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].description.contains("Synthesized from"));
}

fn distiller_with_llm(llm: Option<Arc<FakeLLMClient>>) -> (Arc<Service>, Distiller) {
    let service = make_service();
    let config = service.config().clone();
    let llm: Option<Arc<dyn reasoningbank::llm::LLMClient>> =
        llm.map(|l| l as Arc<dyn reasoningbank::llm::LLMClient>);
    let distiller = Distiller::new(service.clone(), llm, config);
    (service, distiller)
}

async fn seed_similar_memories(service: &Service, project_id: &str, label: &str, n: usize) {
    for i in 0..n {
        let memory = Memory::new(project_id, format!("{label} {i}"), "Retry network calls with exponential backoff", Outcome::Success);
        service.record(memory).await.unwrap();
    }
}

#[tokio::test]
async fn s4_debounced_second_consolidation_is_a_noop() {
    let fake_llm = Arc::new(FakeLLMClient::always_succeeding(
        "TITLE: Retry flaky calls\nCONTENT:\nUse exponential backoff.\nOUTCOME: success\nSOURCE_ATTRIBUTION:\nmerged",
    ));
    let (service, distiller) = distiller_with_llm(Some(fake_llm.clone()));
    seed_similar_memories(&service, "p1", "Flaky retry pattern", 3).await;

    let opts = ConsolidationOptions { similarity_threshold: 0.5, ..ConsolidationOptions::defaults(service.config()) };
    let first = distiller.consolidate("p1", opts.clone()).await.unwrap();
    let calls_after_first = fake_llm.call_count();
    assert!(!first.created_memory_ids.is_empty());

    let second = distiller.consolidate("p1", opts).await.unwrap();
    assert_eq!(fake_llm.call_count(), calls_after_first, "no additional LLM calls on debounced run");
    assert!(second.created_memory_ids.is_empty());
    assert!(second.archived_memory_ids.is_empty());
    assert!(second.skipped_count > 0);
}

#[tokio::test]
async fn s5_llm_parse_error_skips_one_cluster_others_succeed() {
    let good = "TITLE: Retry flaky calls\nCONTENT:\nUse exponential backoff.\nOUTCOME: success\nSOURCE_ATTRIBUTION:\nmerged";
    let malformed = "TITLE: Broken\nOUTCOME: success\nSOURCE_ATTRIBUTION:\nmerged"; // missing CONTENT:
    let fake_llm = Arc::new(FakeLLMClient::new(vec![good.to_string(), good.to_string(), malformed.to_string()]));
    let (service, distiller) = distiller_with_llm(Some(fake_llm.clone()));

    seed_similar_memories(&service, "p1", "Retry backoff cluster A", 2).await;
    seed_similar_memories(&service, "p1", "Timeout handling cluster B", 2).await;
    seed_similar_memories(&service, "p1", "Cache invalidation cluster C", 2).await;

    let opts = ConsolidationOptions { similarity_threshold: 0.99, ..ConsolidationOptions::defaults(service.config()) };
    let result = distiller.consolidate("p1", opts).await.unwrap();

    assert_eq!(result.created_memory_ids.len() + result.skipped_count, result.total_processed);
    assert!(result.skipped_count >= 1);
}

#[tokio::test]
async fn s6_dry_run_produces_no_mutations_and_no_llm_calls() {
    let fake_llm = Arc::new(FakeLLMClient::always_succeeding("unused"));
    let (service, distiller) = distiller_with_llm(Some(fake_llm.clone()));
    seed_similar_memories(&service, "p1", "Flaky retry pattern", 3).await;

    let before = service.list_memories("p1", 0, 0).await.unwrap();

    let opts = ConsolidationOptions { similarity_threshold: 0.5, dry_run: true, ..ConsolidationOptions::defaults(service.config()) };
    let result = distiller.consolidate("p1", opts).await.unwrap();

    assert_eq!(fake_llm.call_count(), 0);
    assert!(!result.created_memory_labels.is_empty());
    assert!(result.created_memory_labels.iter().all(|l| l.starts_with("dry-run-cluster-")));

    let after = service.list_memories("p1", 0, 0).await.unwrap();
    assert_eq!(before.len(), after.len());
}

#[tokio::test]
async fn s7_weight_learning_shifts_usage_weight_upward() {
    use reasoningbank::confidence::{Signal, SignalStore, SignalType};

    let store = Arc::new(InMemorySignalStore::new());
    let engine = ConfidenceEngine::new(store.clone(), 30, 24);
    let memory_id = uuid::Uuid::new_v4();

    let initial = store.get_project_weights("p1").await.unwrap().weight_for(SignalType::Usage);

    for _ in 0..5 {
        let usage = Signal::new(memory_id, "p1", SignalType::Usage, true);
        engine.record_signal(usage).await.unwrap();
        let explicit = Signal::new(memory_id, "p1", SignalType::Explicit, true);
        engine.record_signal(explicit).await.unwrap();
    }

    let after = store.get_project_weights("p1").await.unwrap().weight_for(SignalType::Usage);
    assert!(after > initial, "usage weight should strictly increase after repeated agreeing feedback");
}
