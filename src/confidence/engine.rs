// src/confidence/engine.rs
// Hybrid Bayesian confidence score (spec.md §4.2): combines the rolled-up
// aggregate counts with recent (unrolled) signals, weighted per project.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::confidence::signal::{Signal, SignalType};
use crate::confidence::store::SignalStore;
use crate::error::Result;

pub struct ConfidenceEngine {
    store: Arc<dyn SignalStore>,
    rollup_cutoff_days: i64,
    weight_learning_window_hours: i64,
}

impl ConfidenceEngine {
    pub fn new(store: Arc<dyn SignalStore>, rollup_cutoff_days: i64, weight_learning_window_hours: i64) -> Self {
        Self { store, rollup_cutoff_days, weight_learning_window_hours }
    }

    /// `alpha = 1 + Σ_T w_T·A.pos_T + Σ_{s∈recent, positive} w_{s.type}`
    /// `beta` analogously over negative counts/signals.
    /// `confidence = alpha / (alpha + beta)` (spec.md §4.2).
    pub async fn score(&self, memory_id: Uuid, project_id: &str) -> Result<f64> {
        let weights = self.store.get_project_weights(project_id).await?;
        let aggregate = self.store.get_aggregate(memory_id).await?;
        let recent = self.store.get_recent_signals(memory_id, self.recent_window()).await?;

        let mut alpha = 1.0;
        let mut beta = 1.0;

        for signal_type in SignalType::ALL {
            let w = weights.weight_for(signal_type);
            let counts = aggregate.counts_for(signal_type);
            alpha += w * counts.pos as f64;
            beta += w * counts.neg as f64;
        }

        for signal in &recent {
            let w = weights.weight_for(signal.signal_type);
            if signal.positive {
                alpha += w;
            } else {
                beta += w;
            }
        }

        let confidence = alpha / (alpha + beta);
        debug!(%memory_id, project_id, alpha, beta, confidence, "computed hybrid confidence");
        Ok(confidence)
    }

    /// Records a new signal, then re-scores the memory's confidence.
    pub async fn record_signal(&self, signal: Signal) -> Result<f64> {
        let memory_id = signal.memory_id;
        let project_id = signal.project_id.clone();
        if signal.signal_type == SignalType::Explicit {
            self.learn_from_feedback(&signal).await?;
        }
        self.store.store_signal(signal).await?;
        self.score(memory_id, &project_id).await
    }

    /// Weight learning (spec.md §4.2): when explicit feedback arrives, any
    /// usage/outcome signal for the same memory within the preceding
    /// learning window that agreed with the explicit direction reinforces
    /// that signal type's weight upward; disagreement reinforces it down.
    async fn learn_from_feedback(&self, explicit: &Signal) -> Result<()> {
        let window = Duration::hours(self.weight_learning_window_hours);
        let recent = self.store.get_recent_signals(explicit.memory_id, window).await?;
        let mut weights = self.store.get_project_weights(&explicit.project_id).await?;

        let mut changed = false;
        for signal in recent.iter().filter(|s| s.signal_type != SignalType::Explicit) {
            let agreed = signal.positive == explicit.positive;
            weights.reinforce(signal.signal_type, agreed);
            changed = true;
        }

        if changed {
            self.store.store_project_weights(weights).await?;
        }
        Ok(())
    }

    pub async fn rollup(&self, memory_id: Uuid) -> Result<()> {
        let cutoff = chrono::Utc::now() - Duration::days(self.rollup_cutoff_days);
        self.store.rollup_old_signals(memory_id, cutoff).await
    }

    /// Exposes a project's current learned weights for introspection
    /// (`Service::debug_weights`); priors if the project has never been seen.
    pub async fn project_weights(&self, project_id: &str) -> Result<crate::confidence::weights::ProjectWeights> {
        self.store.get_project_weights(project_id).await
    }

    fn recent_window(&self) -> Duration {
        Duration::days(self.rollup_cutoff_days)
    }
}
