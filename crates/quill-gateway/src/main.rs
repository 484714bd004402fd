//! Gateway binary: binds the HTTP listener and serves the SSE routes.

use anyhow::Context;
use clap::Parser;
use quill_core::{SideChannel, TranscriptStore};
use quill_gateway::{AppState, GatewayConfig, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quill-gateway", about = "SSE streaming gateway for Quill job transcripts")]
struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "QUILL_ADDR", default_value = "127.0.0.1:8700")]
    addr: SocketAddr,

    /// Seconds between heartbeat events on live connections.
    #[arg(long, env = "QUILL_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Milliseconds to wait before re-checking a job missing at connect time.
    #[arg(long, env = "QUILL_LOOKUP_RETRY_MS", default_value_t = 500)]
    lookup_retry_ms: u64,

    /// Milliseconds between a terminal event and closing the connection.
    #[arg(long, env = "QUILL_CLOSE_GRACE_MS", default_value_t = 250)]
    close_grace_ms: u64,

    /// Forward execution metadata (model, token counts) to viewers.
    #[arg(long, env = "QUILL_VERBOSE_DIAGNOSTICS")]
    verbose_diagnostics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig {
        heartbeat_interval: Duration::from_secs(cli.heartbeat_secs),
        lookup_retry: Duration::from_millis(cli.lookup_retry_ms),
        close_grace: Duration::from_millis(cli.close_grace_ms),
        verbose_diagnostics: cli.verbose_diagnostics,
    };

    let store = Arc::new(TranscriptStore::new());
    let channel = SideChannel::new();
    let state = AppState::new(store, channel).with_config(config);

    let listener = tokio::net::TcpListener::bind(cli.addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.addr))?;
    tracing::info!(addr = %cli.addr, "gateway listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
