//! # quill-gateway
//!
//! SSE push-streaming gateway for Quill job transcripts.
//!
//! Terminates one long-lived push connection per viewer: replays the
//! current transcript, then relays live updates from the transcript store
//! and the secondary event channel, with heartbeats and idempotent
//! teardown. Viewers connecting after a job finished still get full
//! history plus a terminal marker.

mod config;
mod routes;
mod stream;
mod wire;

use quill_core::{SideChannel, TranscriptStore};
use std::sync::Arc;

pub use config::GatewayConfig;
pub use routes::router;
pub use stream::{ConnectionPhase, StreamError, Subscription, open_stream};
pub use wire::{TerminalState, WireEvent};

/// Shared state behind every gateway connection.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TranscriptStore>,
    pub channel: SideChannel,
    pub config: GatewayConfig,
}

impl AppState {
    /// Creates gateway state with the default configuration.
    pub fn new(store: Arc<TranscriptStore>, channel: SideChannel) -> Self {
        Self {
            store,
            channel,
            config: GatewayConfig::default(),
        }
    }

    /// Overrides the gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }
}
