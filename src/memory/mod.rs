// src/memory/mod.rs
// Core memory data model (spec.md §3.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ReasoningBankError, Result};

/// Whether a memory records a pattern to follow or an anti-pattern to avoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Lifecycle state of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryState {
    Active,
    Archived,
}

/// How a memory came to exist. Redundant with the textual synthesis-marker
/// detection used for the consolidation boost (spec.md §9 open question #2):
/// the marker stays authoritative for boost behavior, this is for callers that
/// want a typed check instead of a substring search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Explicit,
    Distilled,
    Consolidated,
}

pub const SYNTHESIS_MARKERS: [&str; 2] = ["Synthesized from", "Consolidated from"];

/// `created_at`/`updated_at` are persisted as unix seconds, not RFC3339
/// strings (spec.md §6.4's document-metadata contract).
mod unix_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(date.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Utc.timestamp_opt(secs, 0).single().ok_or_else(|| D::Error::custom(format!("invalid unix timestamp: {secs}")))
    }
}

/// An immutable content bundle plus mutable tracking fields (spec.md §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Memory {
    pub id: Uuid,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub outcome: Outcome,
    pub confidence: f32,
    pub usage_count: u64,
    pub tags: Vec<String>,
    pub consolidation_id: Option<Uuid>,
    pub state: MemoryState,
    pub kind: MemoryKind,
    #[serde(with = "unix_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "unix_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Build a fresh, unsaved memory with the neutral confidence prior (0.5).
    /// `Service::record` fills in the outcome-specific initial confidence
    /// (0.8/0.6/0.5) unless the caller has already set a non-prior value.
    pub fn new(project_id: impl Into<String>, title: impl Into<String>, content: impl Into<String>, outcome: Outcome) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            title: title.into(),
            description: String::new(),
            content: content.into(),
            outcome,
            confidence: 0.5,
            usage_count: 0,
            tags: Vec::new(),
            consolidation_id: None,
            state: MemoryState::Active,
            kind: MemoryKind::Explicit,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the required fields (spec.md §4.1 Record contract).
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(ReasoningBankError::EmptyProjectId);
        }
        if self.title.trim().is_empty() {
            return Err(ReasoningBankError::EmptyTitle);
        }
        if self.content.trim().is_empty() {
            return Err(ReasoningBankError::EmptyContent);
        }
        Ok(())
    }

    /// Text embedded for this memory: `title + "\n\n" + content` (spec.md §4.1).
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }

    /// (I2) A consolidated memory is active, unlinked, and carries a synthesis marker.
    pub fn is_consolidated(&self) -> bool {
        self.consolidation_id.is_none()
            && self.state == MemoryState::Active
            && SYNTHESIS_MARKERS.iter().any(|m| self.description.contains(m))
    }

    /// Clamp confidence into [0, 1] (I3). Call after every mutation to confidence.
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Flattened metadata payload written to the Store (spec.md §6.4).
    pub fn to_metadata(&self) -> HashMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Reconstruct a Memory from a Store document's metadata payload.
    pub fn from_metadata(metadata: &HashMap<String, Value>) -> Result<Self> {
        let value = Value::Object(metadata.clone().into_iter().collect());
        serde_json::from_value(value).map_err(|e| ReasoningBankError::InvalidMemory(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_fields() {
        let mut m = Memory::new("", "t", "c", Outcome::Success);
        assert!(matches!(m.validate(), Err(ReasoningBankError::EmptyProjectId)));
        m.project_id = "p1".into();
        m.title = "".into();
        assert!(matches!(m.validate(), Err(ReasoningBankError::EmptyTitle)));
        m.title = "t".into();
        m.content = "  ".into();
        assert!(matches!(m.validate(), Err(ReasoningBankError::EmptyContent)));
    }

    #[test]
    fn is_consolidated_requires_marker_and_active_unlinked() {
        let mut m = Memory::new("p1", "t", "c", Outcome::Success);
        m.description = "Synthesized from 3 memories".into();
        assert!(m.is_consolidated());

        m.state = MemoryState::Archived;
        assert!(!m.is_consolidated());

        m.state = MemoryState::Active;
        m.consolidation_id = Some(Uuid::new_v4());
        assert!(!m.is_consolidated());
    }

    #[test]
    fn metadata_round_trips() {
        let m = Memory::new("p1", "t", "c", Outcome::Success);
        let metadata = m.to_metadata();
        let back = Memory::from_metadata(&metadata).unwrap();
        assert_eq!(back.id, m.id);
        assert_eq!(back.project_id, m.project_id);
        assert_eq!(back.title, m.title);
        assert_eq!(back.created_at.timestamp(), m.created_at.timestamp());
        assert_eq!(back.updated_at.timestamp(), m.updated_at.timestamp());
    }

    #[test]
    fn metadata_stores_timestamps_as_unix_seconds() {
        let m = Memory::new("p1", "t", "c", Outcome::Success);
        let metadata = m.to_metadata();
        assert_eq!(metadata.get("created_at"), Some(&Value::from(m.created_at.timestamp())));
        assert_eq!(metadata.get("updated_at"), Some(&Value::from(m.updated_at.timestamp())));
    }

    #[test]
    fn clamp_confidence_bounds() {
        let mut m = Memory::new("p1", "t", "c", Outcome::Success);
        m.confidence = 1.5;
        m.clamp_confidence();
        assert_eq!(m.confidence, 1.0);
        m.confidence = -0.2;
        m.clamp_confidence();
        assert_eq!(m.confidence, 0.0);
    }
}
