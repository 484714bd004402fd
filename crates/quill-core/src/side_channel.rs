//! Secondary event channel: a flat, job-agnostic broadcast point.
//!
//! Runs alongside the transcript store's own notifications as an alternate
//! ingestion path for logically equivalent entries. It keeps no history;
//! the gateway subscribes unconditionally, filters by job id, and re-shapes
//! each message into the common entry structure before forwarding.

use chrono::{DateTime, Utc};
use quill_proto::{AgentIdentity, ConversationEntry, JobId, MessageKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffer size before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// A flat log message published on the side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub job_id: JobId,
    pub agent_id: String,
    pub agent_name: String,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Turn number when the producer knows it; 0 after re-shaping otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

impl ChannelMessage {
    /// Creates a response-kind message for the given job and agent.
    pub fn new(
        job_id: impl Into<JobId>,
        agent_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let agent_id = agent_id.into();
        Self {
            job_id: job_id.into(),
            agent_name: agent_id.clone(),
            agent_id,
            text: text.into(),
            kind: MessageKind::Response,
            timestamp: Utc::now(),
            iteration: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    /// Sets the message kind.
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the turn number.
    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Re-shapes the flat message into the common entry structure.
    pub fn into_entry(self) -> ConversationEntry {
        let iteration = self.iteration.unwrap_or(0);
        ConversationEntry::new(
            AgentIdentity::new(self.agent_id, self.agent_name),
            self.text,
            iteration,
        )
        .with_kind(self.kind)
        .with_timestamp(self.timestamp)
    }
}

/// The broadcast point itself. Cheap to clone; all clones publish into the
/// same channel.
#[derive(Debug, Clone)]
pub struct SideChannel {
    tx: broadcast::Sender<ChannelMessage>,
}

impl Default for SideChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SideChannel {
    /// Creates a new channel with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes a message to all current subscribers.
    /// No receivers is fine and not an error.
    pub fn publish(&self, message: ChannelMessage) {
        let _ = self.tx.send(message);
    }

    /// Subscribes to all messages, regardless of job.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    /// Number of live subscribers. Dropping a receiver deregisters it.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let channel = SideChannel::new();
        let mut rx1 = channel.subscribe();
        let mut rx2 = channel.subscribe();
        assert_eq!(channel.receiver_count(), 2);

        channel.publish(ChannelMessage::new("job-1", "ceo", "hello"));

        assert_eq!(rx1.recv().await.unwrap().text, "hello");
        assert_eq!(rx2.recv().await.unwrap().text, "hello");

        drop(rx1);
        assert_eq!(channel.receiver_count(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let channel = SideChannel::new();
        channel.publish(ChannelMessage::new("job-1", "ceo", "hello"));
    }

    #[test]
    fn test_into_entry_reshapes_the_payload() {
        let message = ChannelMessage::new("job-1", "planner", "on it")
            .with_name("Planner")
            .with_kind(MessageKind::Internal)
            .with_iteration(3);
        let timestamp = message.timestamp;

        let entry = message.into_entry();
        assert_eq!(entry.agent_id.as_str(), "planner");
        assert_eq!(entry.agent_name, "Planner");
        assert_eq!(entry.message, "on it");
        assert_eq!(entry.kind, MessageKind::Internal);
        assert_eq!(entry.iteration, 3);
        assert_eq!(entry.timestamp, timestamp);
    }

    #[test]
    fn test_into_entry_defaults_iteration_to_zero() {
        let entry = ChannelMessage::new("job-1", "ceo", "x").into_entry();
        assert_eq!(entry.iteration, 0);
    }
}
