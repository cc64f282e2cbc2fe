// src/confidence/store.rs
// SignalStore: recent signals + rolled-up aggregates + per-project weights
// (spec.md §4.2). An in-memory implementation is provided for tests; a
// production SignalStore would be backed by the same vector index as
// memories or by a SQL store (spec.md §9 design note).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::confidence::aggregate::SignalAggregate;
use crate::confidence::signal::Signal;
use crate::confidence::weights::ProjectWeights;
use crate::error::Result;

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn store_signal(&self, signal: Signal) -> Result<()>;
    async fn get_recent_signals(&self, memory_id: Uuid, window: Duration) -> Result<Vec<Signal>>;
    async fn store_aggregate(&self, memory_id: Uuid, aggregate: SignalAggregate) -> Result<()>;
    async fn get_aggregate(&self, memory_id: Uuid) -> Result<SignalAggregate>;
    async fn store_project_weights(&self, weights: ProjectWeights) -> Result<()>;
    /// Returns priors if the project has never been seen (spec.md §4.2).
    async fn get_project_weights(&self, project_id: &str) -> Result<ProjectWeights>;
    async fn rollup_old_signals(&self, memory_id: Uuid, cutoff: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
pub struct InMemorySignalStore {
    signals: RwLock<HashMap<Uuid, Vec<Signal>>>,
    aggregates: RwLock<HashMap<Uuid, SignalAggregate>>,
    weights: RwLock<HashMap<String, ProjectWeights>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn store_signal(&self, signal: Signal) -> Result<()> {
        self.signals.write().await.entry(signal.memory_id).or_default().push(signal);
        Ok(())
    }

    async fn get_recent_signals(&self, memory_id: Uuid, window: Duration) -> Result<Vec<Signal>> {
        let cutoff = Utc::now() - window;
        let signals = self.signals.read().await;
        Ok(signals
            .get(&memory_id)
            .map(|sigs| sigs.iter().filter(|s| s.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default())
    }

    async fn store_aggregate(&self, memory_id: Uuid, aggregate: SignalAggregate) -> Result<()> {
        self.aggregates.write().await.insert(memory_id, aggregate);
        Ok(())
    }

    async fn get_aggregate(&self, memory_id: Uuid) -> Result<SignalAggregate> {
        Ok(self.aggregates.read().await.get(&memory_id).cloned_or_default())
    }

    async fn store_project_weights(&self, weights: ProjectWeights) -> Result<()> {
        self.weights.write().await.insert(weights.project_id.clone(), weights);
        Ok(())
    }

    async fn get_project_weights(&self, project_id: &str) -> Result<ProjectWeights> {
        let weights = self.weights.read().await;
        Ok(weights.get(project_id).cloned().unwrap_or_else(|| ProjectWeights::priors(project_id)))
    }

    async fn rollup_old_signals(&self, memory_id: Uuid, cutoff: DateTime<Utc>) -> Result<()> {
        let mut signals = self.signals.write().await;
        let Some(sigs) = signals.get_mut(&memory_id) else {
            return Ok(());
        };

        let (old, recent): (Vec<Signal>, Vec<Signal>) = sigs.drain(..).partition(|s| s.timestamp < cutoff);
        *sigs = recent;
        drop(signals);

        if old.is_empty() {
            return Ok(());
        }

        let mut aggregates = self.aggregates.write().await;
        let aggregate = aggregates.entry(memory_id).or_default();
        for signal in old {
            aggregate.record(signal.signal_type, signal.positive);
        }
        aggregate.last_rollup = Some(Utc::now());
        Ok(())
    }
}

trait OptionExt {
    fn cloned_or_default(self) -> SignalAggregate;
}

impl OptionExt for Option<&SignalAggregate> {
    fn cloned_or_default(self) -> SignalAggregate {
        self.cloned().unwrap_or_default()
    }
}

pub fn default_signal_store() -> Arc<dyn SignalStore> {
    Arc::new(InMemorySignalStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::signal::SignalType;

    #[tokio::test]
    async fn rollup_moves_old_signals_into_aggregate() {
        let store = InMemorySignalStore::new();
        let memory_id = Uuid::new_v4();

        let mut old_signal = Signal::new(memory_id, "p1", SignalType::Usage, true);
        old_signal.timestamp = Utc::now() - Duration::days(40);
        store.store_signal(old_signal).await.unwrap();

        let recent_signal = Signal::new(memory_id, "p1", SignalType::Usage, true);
        store.store_signal(recent_signal).await.unwrap();

        store.rollup_old_signals(memory_id, Utc::now() - Duration::days(30)).await.unwrap();

        let aggregate = store.get_aggregate(memory_id).await.unwrap();
        assert_eq!(aggregate.usage.pos, 1);

        let remaining = store.get_recent_signals(memory_id, Duration::days(60)).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn unseen_project_returns_priors() {
        let store = InMemorySignalStore::new();
        let weights = store.get_project_weights("never-seen").await.unwrap();
        assert_eq!(weights.explicit.alpha, 7.0);
        assert_eq!(weights.explicit.beta, 3.0);
    }
}
