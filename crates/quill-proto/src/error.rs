//! Common error types for the Quill pipeline.

use crate::JobId;

/// Errors surfaced by the transcript pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced job does not exist in the registry.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The job already reached a terminal status; its transcript is frozen.
    #[error("job already terminated: {0}")]
    JobTerminated(JobId),

    /// A notification channel was closed underneath us.
    #[error("transcript channel closed for job {0}")]
    ChannelClosed(JobId),
}

/// Result alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, Error>;
