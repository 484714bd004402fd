//! Conversation entries: the immutable unit of an attributed transcript.

use crate::{AgentId, AgentIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A prompt/instruction sent to an agent.
    Request,
    /// A finished agent output.
    Response,
    /// Pipeline-internal bookkeeping, e.g. inter-agent handoffs.
    Internal,
}

/// Optional execution metadata carried by some finish events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl EntryMetadata {
    /// Returns true if no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.tools.is_empty()
            && self.tokens.is_none()
            && self.duration_ms.is_none()
    }
}

/// One attributed, de-chunked message in a job transcript.
///
/// Immutable once appended to the transcript store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Monotonic non-decreasing turn number, process-wide per job.
    pub iteration: u32,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl ConversationEntry {
    /// Creates a response entry for the given identity and turn.
    pub fn new(identity: AgentIdentity, message: impl Into<String>, iteration: u32) -> Self {
        Self {
            agent_id: identity.id,
            agent_name: identity.name,
            message: message.into(),
            timestamp: Utc::now(),
            iteration,
            kind: MessageKind::Response,
            metadata: None,
        }
    }

    /// Sets the entry kind.
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attaches execution metadata; empty metadata is dropped.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<EntryMetadata>) -> Self {
        self.metadata = metadata.filter(|m| !m.is_empty());
        self
    }

    /// Overrides the timestamp (mainly for deterministic tests).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults_to_response() {
        let entry = ConversationEntry::new(AgentIdentity::new("ceo", "CEO"), "Hello", 1);
        assert_eq!(entry.kind, MessageKind::Response);
        assert_eq!(entry.agent_id.as_str(), "ceo");
        assert_eq!(entry.iteration, 1);
        assert!(entry.metadata.is_none());
    }

    #[test]
    fn test_empty_metadata_is_dropped() {
        let entry = ConversationEntry::new(AgentIdentity::new("ceo", "CEO"), "Hello", 1)
            .with_metadata(Some(EntryMetadata::default()));
        assert!(entry.metadata.is_none());
    }

    #[test]
    fn test_metadata_serialization_skips_empty_fields() {
        let metadata = EntryMetadata {
            model: Some("gpt-x".to_string()),
            ..EntryMetadata::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"model": "gpt-x"}));
    }

    #[test]
    fn test_kind_snake_case_on_the_wire() {
        let json = serde_json::to_string(&MessageKind::Internal).unwrap();
        assert_eq!(json, "\"internal\"");
    }
}
