// src/confidence/signal.rs
// A single feedback event (spec.md §3.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Explicit,
    Usage,
    Outcome,
}

impl SignalType {
    pub const ALL: [SignalType; 3] = [SignalType::Explicit, SignalType::Usage, SignalType::Outcome];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub memory_id: Uuid,
    pub project_id: String,
    pub session_id: Option<String>,
    pub signal_type: SignalType,
    pub positive: bool,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(memory_id: Uuid, project_id: impl Into<String>, signal_type: SignalType, positive: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory_id,
            project_id: project_id.into(),
            session_id: None,
            signal_type,
            positive,
            timestamp: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
