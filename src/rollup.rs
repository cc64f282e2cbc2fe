// src/rollup.rs
// Periodic signal rollup worker: moves signals older than the rollup
// cutoff into each memory's aggregate, outside the request/response path.
// Same watch-channel shutdown shape as `ConsolidationScheduler`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::confidence::ConfidenceEngine;
use crate::memory::MemoryState;
use crate::service::Service;

pub struct RollupWorker {
    service: Arc<Service>,
    engine: Arc<ConfidenceEngine>,
    project_ids: Vec<String>,
    interval: StdDuration,
    shutdown_tx: watch::Sender<bool>,
}

impl RollupWorker {
    pub fn new(service: Arc<Service>, engine: Arc<ConfidenceEngine>, project_ids: Vec<String>, interval: StdDuration) -> Arc<Self> {
        let (shutdown_tx, _rx) = watch::channel(false);
        Arc::new(Self { service, engine, project_ids, interval, shutdown_tx })
    }

    /// Rolls up every active memory's signal history for one project.
    /// Per-memory rollup failures are logged and do not abort the sweep
    /// (spec.md §7 batch-operation error policy).
    async fn sweep_project(&self, project_id: &str) {
        let memories = match self.service.list_memories(project_id, 0, 0).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(project_id, error = %e, "rollup sweep: failed to list memories");
                return;
            }
        };
        for memory in memories.into_iter().filter(|m| m.state == MemoryState::Active) {
            if let Err(e) = self.engine.rollup(memory.id).await {
                warn!(memory_id = %memory.id, project_id, error = %e, "rollup failed for memory, continuing");
            }
        }
    }

    pub fn spawn(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        let mut rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            info!("signal rollup worker started");
            let mut ticker = tokio::time::interval(worker.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *rx.borrow() {
                            break;
                        }
                        for project_id in &worker.project_ids {
                            worker.sweep_project(project_id).await;
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("signal rollup worker stopped");
        });
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{InMemorySignalStore, Signal, SignalStore, SignalType};
    use crate::embedder::fake::FakeEmbedder;
    use crate::memory::{Memory, Outcome};
    use crate::store::memory::InMemoryStoreProvider;
    use crate::ReasoningBankConfig;

    #[tokio::test]
    async fn sweep_rolls_up_old_signals_for_every_active_memory() {
        let config = ReasoningBankConfig::default();
        let signal_store = Arc::new(InMemorySignalStore::new());
        let engine = Arc::new(ConfidenceEngine::new(signal_store.clone(), config.signal_rollup_cutoff_days, config.weight_learning_window_hours));
        let service = Arc::new(
            Service::new(
                "tenant-1",
                Arc::new(InMemoryStoreProvider::new()),
                Some(Arc::new(FakeEmbedder::new(16))),
                Some(engine.clone()),
                config,
            )
            .unwrap(),
        );

        let memory = service.record(Memory::new("p1", "T", "C", Outcome::Success)).await.unwrap();
        let mut old_signal = Signal::new(memory.id, "p1", SignalType::Usage, true);
        old_signal.timestamp = chrono::Utc::now() - chrono::Duration::days(40);
        signal_store.store_signal(old_signal).await.unwrap();

        let worker = RollupWorker::new(service, engine, vec!["p1".to_string()], StdDuration::from_secs(3600));
        worker.sweep_project("p1").await;

        let aggregate = signal_store.get_aggregate(memory.id).await.unwrap();
        assert_eq!(aggregate.usage.pos, 1);
    }
}
