// src/distiller/session.rs
// Session distillation: turn a finished agent session into memory/memories
// (spec.md §4.3.1).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ReasoningBankError, Result};
use crate::memory::{Memory, MemoryKind, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Failure,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub project_id: String,
    pub outcome: SessionOutcome,
    pub task: String,
    pub approach: String,
    pub result: String,
    pub tags: Vec<String>,
    pub duration_secs: i64,
    pub completed_at: DateTime<Utc>,
}

fn truncate_task(task: &str, max_chars: usize) -> String {
    task.chars().take(max_chars).collect()
}

fn success_pattern_memory(summary: &SessionSummary) -> Memory {
    let title = format!("Success: {}", truncate_task(&summary.task, 50));
    let content = format!(
        "## Task\n{}\n\n## Successful Approach\n{}\n\n## Result\n{}\n\n## Tags\n{}\n\n## When to Use\nApply this approach when facing a similar task in this project.",
        summary.task,
        summary.approach,
        summary.result,
        summary.tags.join(", "),
    );
    let mut memory = Memory::new(summary.project_id.clone(), title, content, Outcome::Success);
    memory.tags = summary.tags.clone();
    memory.confidence = 0.6;
    memory.kind = MemoryKind::Distilled;
    memory.description = format!("Learned from session {} (duration: {}s)", summary.session_id, summary.duration_secs);
    memory
}

fn anti_pattern_memory(summary: &SessionSummary) -> Memory {
    let title = format!("Anti-pattern: {}", truncate_task(&summary.task, 50));
    let content = format!(
        "## Task\n{}\n\n## Failed Approach (Avoid This)\n{}\n\n## What Went Wrong\n{}\n\n## Tags\n{}\n\n## Warning\nAvoid repeating this approach for similar tasks in this project.",
        summary.task,
        summary.approach,
        summary.result,
        summary.tags.join(", "),
    );
    let mut memory = Memory::new(summary.project_id.clone(), title, content, Outcome::Failure);
    memory.tags = summary.tags.clone();
    memory.confidence = 0.5;
    memory.kind = MemoryKind::Distilled;
    memory.description = format!("Learned from session {} (duration: {}s)", summary.session_id, summary.duration_secs);
    memory
}

/// Produces the memory/memories implied by a session's outcome. Does not
/// persist them — the caller records each via `Service::record` and is
/// expected to log (not fail) per-memory errors (spec.md §4.3.1 step 4).
pub fn distill_session(summary: &SessionSummary) -> Result<Vec<Memory>> {
    if summary.project_id.trim().is_empty() {
        return Err(ReasoningBankError::EmptyProjectId);
    }
    if summary.session_id.trim().is_empty() {
        return Err(ReasoningBankError::InvalidMemory("session_id must not be empty".to_string()));
    }

    let memories = match summary.outcome {
        SessionOutcome::Success => vec![success_pattern_memory(summary)],
        SessionOutcome::Failure => vec![anti_pattern_memory(summary)],
        SessionOutcome::Partial => vec![success_pattern_memory(summary), anti_pattern_memory(summary)],
    };

    Ok(memories)
}

/// Bounded ring buffer of recently completed sessions, kept for callers that
/// want a short rolling window of session history (e.g. batching several
/// sessions' distillation together) without re-querying storage.
pub struct SessionBuffer {
    capacity: usize,
    sessions: VecDeque<SessionSummary>,
}

impl SessionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), sessions: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, summary: SessionSummary) {
        if self.sessions.len() >= self.capacity {
            let dropped = self.sessions.pop_front();
            if let Some(dropped) = dropped {
                warn!(session_id = %dropped.session_id, "session buffer full, dropping oldest session");
            }
        }
        self.sessions.push_back(summary);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn drain(&mut self) -> Vec<SessionSummary> {
        self.sessions.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionSummary> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcome: SessionOutcome) -> SessionSummary {
        SessionSummary {
            session_id: "s1".into(),
            project_id: "p1".into(),
            outcome,
            task: "Refactor the auth middleware to use the new token store".into(),
            approach: "Swapped the old session map for the injected TokenStore trait".into(),
            result: "All auth tests pass".into(),
            tags: vec!["auth".into()],
            duration_secs: 42,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn success_outcome_yields_one_success_memory() {
        let memories = distill_session(&summary(SessionOutcome::Success)).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].outcome, Outcome::Success);
        assert!(memories[0].title.starts_with("Success:"));
        assert!((memories[0].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn failure_outcome_yields_one_anti_pattern_memory() {
        let memories = distill_session(&summary(SessionOutcome::Failure)).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].outcome, Outcome::Failure);
        assert!(memories[0].title.starts_with("Anti-pattern:"));
    }

    #[test]
    fn partial_outcome_yields_both_memories() {
        let memories = distill_session(&summary(SessionOutcome::Partial)).unwrap();
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[0].outcome, Outcome::Success);
        assert_eq!(memories[1].outcome, Outcome::Failure);
    }

    #[test]
    fn empty_project_id_is_rejected() {
        let mut s = summary(SessionOutcome::Success);
        s.project_id = "".into();
        assert!(distill_session(&s).is_err());
    }

    #[test]
    fn session_buffer_drops_oldest_when_full() {
        let mut buffer = SessionBuffer::new(2);
        buffer.push(summary(SessionOutcome::Success));
        let mut second = summary(SessionOutcome::Success);
        second.session_id = "s2".into();
        buffer.push(second);
        let mut third = summary(SessionOutcome::Success);
        third.session_id = "s3".into();
        buffer.push(third);

        assert_eq!(buffer.len(), 2);
        let ids: Vec<&str> = buffer.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }
}
