// src/confidence/aggregate.rs
// Rolled-up counters for signals older than the rollup cutoff (spec.md §3.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::signal::SignalType;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counts {
    pub pos: u64,
    pub neg: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAggregate {
    pub explicit: Counts,
    pub usage: Counts,
    pub outcome: Counts,
    pub last_rollup: Option<DateTime<Utc>>,
}

impl Default for SignalAggregate {
    fn default() -> Self {
        Self { explicit: Counts::default(), usage: Counts::default(), outcome: Counts::default(), last_rollup: None }
    }
}

impl SignalAggregate {
    pub fn counts_for(&self, signal_type: SignalType) -> Counts {
        match signal_type {
            SignalType::Explicit => self.explicit,
            SignalType::Usage => self.usage,
            SignalType::Outcome => self.outcome,
        }
    }

    pub fn record(&mut self, signal_type: SignalType, positive: bool) {
        let counts = match signal_type {
            SignalType::Explicit => &mut self.explicit,
            SignalType::Usage => &mut self.usage,
            SignalType::Outcome => &mut self.outcome,
        };
        if positive {
            counts.pos += 1;
        } else {
            counts.neg += 1;
        }
    }
}
