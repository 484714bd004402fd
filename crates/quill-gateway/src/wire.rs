//! Wire events: the named SSE messages a viewer receives.
//!
//! Each message goes out as a literal event-type line plus a JSON `data:`
//! payload; axum's SSE response handles the framing.

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use quill_proto::{ConversationEntry, JobSnapshot, JobStatus, JobSummary};
use serde::Serialize;

/// Terminal state sent to viewers that connect after the job finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalState {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A server-to-client push message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireEvent {
    /// Connection established; carries the job snapshot.
    Connected(JobSnapshot),
    /// The entire current transcript, replayed as one message.
    History(Vec<ConversationEntry>),
    /// One live transcript entry.
    LogEntry(ConversationEntry),
    /// The job completed; carries the execution summary.
    JobCompleted(JobSummary),
    /// The job failed.
    JobFailed { error: String },
    /// Periodic keep-alive.
    Heartbeat { timestamp: DateTime<Utc> },
    /// The job was already terminal when the viewer connected.
    JobAlreadyCompleted(TerminalState),
}

impl WireEvent {
    /// The SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            WireEvent::Connected(_) => "connected",
            WireEvent::History(_) => "history",
            WireEvent::LogEntry(_) => "log-entry",
            WireEvent::JobCompleted(_) => "job-completed",
            WireEvent::JobFailed { .. } => "job-failed",
            WireEvent::Heartbeat { .. } => "heartbeat",
            WireEvent::JobAlreadyCompleted(_) => "job-already-completed",
        }
    }

    /// A heartbeat stamped with the current time.
    pub fn heartbeat() -> Self {
        WireEvent::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    /// Converts to an axum SSE event with a JSON payload.
    pub fn into_sse(self) -> Event {
        let name = self.name();
        let data = serde_json::to_string(&self).unwrap_or_default();
        Event::default().event(name).data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_proto::{Job, JobId};

    #[test]
    fn test_event_names_match_the_wire_contract() {
        let snapshot = Job::new(JobId::new("j"), "t").snapshot();
        let cases = vec![
            (WireEvent::Connected(snapshot), "connected"),
            (WireEvent::History(Vec::new()), "history"),
            (
                WireEvent::JobCompleted(JobSummary::default()),
                "job-completed",
            ),
            (
                WireEvent::JobFailed {
                    error: "x".to_string(),
                },
                "job-failed",
            ),
            (WireEvent::heartbeat(), "heartbeat"),
            (
                WireEvent::JobAlreadyCompleted(TerminalState {
                    status: JobStatus::Completed,
                    summary: None,
                    error: None,
                }),
                "job-already-completed",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.name(), expected);
        }
    }

    #[test]
    fn test_payload_serializes_without_a_tag() {
        let event = WireEvent::JobFailed {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }

    #[test]
    fn test_history_payload_is_an_array() {
        let json = serde_json::to_value(WireEvent::History(Vec::new())).unwrap();
        assert_eq!(json, serde_json::json!([]));
    }

    #[test]
    fn test_terminal_state_skips_absent_fields() {
        let json = serde_json::to_value(TerminalState {
            status: JobStatus::Failed,
            summary: None,
            error: Some("boom".to_string()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "error": "boom"}));
    }
}
