//! # quill-proto
//!
//! Shared types for the Quill transcript pipeline.
//!
//! This crate provides the foundational abstractions used across all Quill
//! crates, including:
//! - Job and agent identities
//! - `ConversationEntry`, the immutable unit of an attributed transcript
//! - The raw engine event vocabulary and its boundary normalization
//! - Identity attribution against a role vocabulary
//! - Common error types

mod agent;
mod entry;
mod error;
mod event;
mod job;

pub use agent::{AgentId, AgentIdentity, Attribution, IdentityHints, RoleVocabulary};
pub use entry::{ConversationEntry, EntryMetadata, MessageKind};
pub use error::{Error, Result};
pub use event::{FlushTrigger, RawEvent, Signal};
pub use job::{Job, JobId, JobSnapshot, JobStatus, JobSummary};
