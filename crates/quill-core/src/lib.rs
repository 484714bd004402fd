//! # quill-core
//!
//! Core pipeline functionality for Quill:
//! - The per-job transcript store with publish/subscribe semantics
//! - The stream attribution engine that turns the engine's raw, redundant
//!   event feed into attributed, de-chunked conversation entries
//! - The secondary event channel, a flat job-agnostic broadcast point

mod attribution;
mod side_channel;
mod transcript_store;

pub use attribution::{AttributionEngine, run_feed};
pub use side_channel::{ChannelMessage, SideChannel};
pub use transcript_store::{JobSubscription, StoreNotification, TranscriptStore};
