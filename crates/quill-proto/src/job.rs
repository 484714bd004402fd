//! Job identity and lifecycle types.

use crate::ConversationEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
///
/// Transitions only `Running -> Completed` or `Running -> Failed`,
/// exactly once, irreversibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true for `Completed` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Execution summary attached to a completed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Total agent turns taken across the run.
    pub total_turns: u32,
    /// Ids of the agents that contributed output.
    pub agents: Vec<String>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// One run of the multi-agent execution engine, with its ordered transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task_type: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub transcript: Vec<ConversationEntry>,
}

impl Job {
    /// Creates a fresh running job with an empty transcript.
    pub fn new(id: JobId, task_type: impl Into<String>) -> Self {
        Self {
            id,
            task_type: task_type.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            summary: None,
            error: None,
            transcript: Vec::new(),
        }
    }

    /// Returns the lightweight snapshot sent on viewer connect.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            task_type: self.task_type.clone(),
            status: self.status,
            started_at: self.started_at,
        }
    }
}

/// The `connected` payload: job identity without the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub task_type: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
}
