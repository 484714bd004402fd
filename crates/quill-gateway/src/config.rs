//! Gateway tuning knobs.

use std::time::Duration;

/// Connection-level timing and diagnostics configuration.
///
/// Every field is injectable so tests can run with millisecond delays.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interval between `heartbeat` events while a connection is live.
    /// Defeats idle-connection timeouts in proxies and load balancers.
    pub heartbeat_interval: Duration,

    /// One-shot delay before re-checking a job that was not found at
    /// connect time. Covers viewers that subscribe just before the job
    /// record exists.
    pub lookup_retry: Duration,

    /// Delay between the terminal notification and closing the
    /// connection, so the last message reaches the client.
    pub close_grace: Duration,

    /// When false, execution metadata is stripped from entries forwarded
    /// to viewers; the stored transcript keeps it either way.
    pub verbose_diagnostics: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            lookup_retry: Duration::from_millis(500),
            close_grace: Duration::from_millis(250),
            verbose_diagnostics: false,
        }
    }
}
