// src/scheduler.rs
// ConsolidationScheduler: fires Distiller::consolidate_all on a fixed
// interval. State machine: idle -> running -> stopped (terminal), using
// a watch-channel shutdown signal.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ReasoningBankConfig;
use crate::distiller::{ConsolidationOptions, Distiller};
use crate::error::{ReasoningBankError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

pub struct ConsolidationScheduler {
    distiller: Arc<Distiller>,
    interval: StdDuration,
    project_ids: Vec<String>,
    opts: ConsolidationOptions,
    state: Mutex<SchedulerState>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ConsolidationScheduler {
    pub fn new(distiller: Arc<Distiller>, config: &ReasoningBankConfig) -> Self {
        Self {
            distiller,
            interval: StdDuration::from_secs(24 * 3600),
            project_ids: Vec::new(),
            opts: ConsolidationOptions::defaults(config),
            state: Mutex::new(SchedulerState::Idle),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: StdDuration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_project_ids(mut self, project_ids: Vec<String>) -> Self {
        self.project_ids = project_ids;
        self
    }

    pub fn with_consolidation_options(mut self, opts: ConsolidationOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Not idempotent: errors if already running or previously stopped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                SchedulerState::Running => return Err(ReasoningBankError::SchedulerAlreadyRunning),
                SchedulerState::Stopped => return Err(ReasoningBankError::SchedulerStopped),
                SchedulerState::Idle => *state = SchedulerState::Running,
            }
        }

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown_tx.lock().unwrap() = Some(tx);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            info!("consolidation scheduler started");
            let mut ticker = tokio::time::interval(scheduler.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *rx.borrow() {
                            break;
                        }
                        if scheduler.project_ids.is_empty() {
                            continue;
                        }
                        let results = scheduler
                            .distiller
                            .consolidate_all(&scheduler.project_ids, scheduler.opts.clone())
                            .await;
                        for (project_id, result) in results {
                            if let Err(e) = result {
                                warn!(project_id, error = %e, "scheduled consolidation failed");
                            }
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("consolidation scheduler stopped");
        });

        Ok(())
    }

    /// Idempotent: a no-op when not currently running. Terminal — a stopped
    /// scheduler cannot be restarted; construct a new one instead.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != SchedulerState::Running {
            return;
        }
        *state = SchedulerState::Stopped;
        drop(state);

        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock().unwrap() == SchedulerState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{ConfidenceEngine, InMemorySignalStore};
    use crate::embedder::fake::FakeEmbedder;
    use crate::service::Service;
    use crate::store::memory::InMemoryStoreProvider;

    fn make_scheduler() -> Arc<ConsolidationScheduler> {
        let config = ReasoningBankConfig::default();
        let engine = Arc::new(ConfidenceEngine::new(
            Arc::new(InMemorySignalStore::new()),
            config.signal_rollup_cutoff_days,
            config.weight_learning_window_hours,
        ));
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
        let distiller = Arc::new(Distiller::new(service, None, config.clone()));
        Arc::new(ConsolidationScheduler::new(distiller, &config).with_interval(StdDuration::from_millis(10)))
    }

    #[tokio::test]
    async fn start_while_running_errors() {
        let scheduler = make_scheduler();
        scheduler.start().unwrap();
        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, ReasoningBankError::SchedulerAlreadyRunning));
        scheduler.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_terminal() {
        let scheduler = make_scheduler();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        scheduler.start().unwrap();
        scheduler.stop();
        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, ReasoningBankError::SchedulerStopped));
    }
}
