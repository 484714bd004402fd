//! Per-viewer subscription state machine and the forwarding task.
//!
//! Each viewer connection moves through
//! `Connecting -> Replaying -> Live -> Closing -> Closed`. History is
//! replayed from the atomic store snapshot, live updates are merged from
//! the transcript store and the side channel (filtered by job id), and a
//! heartbeat ticks while the connection is live. A send on the outbound
//! channel only fails when the viewer has dropped its stream, so any send
//! failure, heartbeat included, means disconnect and tears the connection
//! down. Teardown happens exactly once, guarded by a closed flag; dropping
//! the broadcast receivers is what deregisters the listeners.

use crate::wire::{TerminalState, WireEvent};
use crate::{AppState, GatewayConfig};
use quill_core::{ChannelMessage, JobSubscription, StoreNotification};
use quill_proto::{ConversationEntry, JobId};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, interval_at, sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Outbound buffer per viewer connection.
const FORWARD_BUFFER: usize = 64;

/// Lifecycle phases of one viewer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Replaying,
    Live,
    Closing,
    Closed,
}

/// Per-connection bookkeeping so teardown is idempotent and complete.
pub struct Subscription {
    pub job_id: JobId,
    phase: ConnectionPhase,
    closed: bool,
}

impl Subscription {
    /// Creates bookkeeping for a connecting viewer.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            phase: ConnectionPhase::Connecting,
            closed: false,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Moves to a new phase, with a trace of the transition.
    pub fn set_phase(&mut self, phase: ConnectionPhase) {
        debug!(job = %self.job_id, from = ?self.phase, to = ?phase, "connection phase change");
        self.phase = phase;
    }

    /// Closes the connection. Returns true on the first call only;
    /// repeated closes are safe no-ops.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.set_phase(ConnectionPhase::Closed);
        true
    }
}

/// Client-visible conditions that prevent a stream from opening.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No such job, even after the one-shot re-check.
    #[error("job not found: {job_id}")]
    JobNotFound {
        job_id: JobId,
        /// Every job id the store knows, for diagnosability.
        known_jobs: Vec<JobId>,
    },
}

/// Opens a push stream for one viewer of one job.
///
/// If the job is absent the lookup is retried once after a short delay,
/// covering viewers that subscribe before the job record exists. The
/// returned stream yields `connected`, then `history`, then live events;
/// it ends when the job reaches a terminal state or the viewer goes away.
pub async fn open_stream(
    state: &AppState,
    job_id: JobId,
) -> Result<ReceiverStream<WireEvent>, StreamError> {
    debug!(job = %job_id, "viewer connecting");

    let subscription = match state.store.subscribe(&job_id) {
        Some(subscription) => subscription,
        None => {
            sleep(state.config.lookup_retry).await;
            match state.store.subscribe(&job_id) {
                Some(subscription) => subscription,
                None => {
                    let known_jobs = state.store.job_ids();
                    warn!(job = %job_id, known = known_jobs.len(), "job not found for viewer");
                    return Err(StreamError::JobNotFound { job_id, known_jobs });
                }
            }
        }
    };

    let side_rx = state.channel.subscribe();
    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
    tokio::spawn(forward(subscription, side_rx, tx, state.config.clone()));
    Ok(ReceiverStream::new(rx))
}

/// Strips execution metadata from forwarded entries unless diagnostics
/// are requested. The stored transcript is unaffected.
fn shape(entry: ConversationEntry, verbose: bool) -> ConversationEntry {
    if verbose {
        entry
    } else {
        ConversationEntry {
            metadata: None,
            ..entry
        }
    }
}

/// The per-connection forwarding task.
async fn forward(
    subscription: JobSubscription,
    mut side_rx: broadcast::Receiver<ChannelMessage>,
    tx: mpsc::Sender<WireEvent>,
    config: GatewayConfig,
) {
    let job = subscription.snapshot;
    let mut store_rx = subscription.receiver;
    let mut conn = Subscription::new(job.id.clone());

    conn.set_phase(ConnectionPhase::Replaying);
    if tx.send(WireEvent::Connected(job.snapshot())).await.is_err() {
        conn.close();
        return;
    }
    let history = job
        .transcript
        .iter()
        .cloned()
        .map(|entry| shape(entry, config.verbose_diagnostics))
        .collect();
    if tx.send(WireEvent::History(history)).await.is_err() {
        conn.close();
        return;
    }

    // Viewer arrived after the fact: full replay, terminal marker, done.
    if job.status.is_terminal() {
        let _ = tx
            .send(WireEvent::JobAlreadyCompleted(TerminalState {
                status: job.status,
                summary: job.summary.clone(),
                error: job.error.clone(),
            }))
            .await;
        sleep(config.close_grace).await;
        conn.set_phase(ConnectionPhase::Closing);
        conn.close();
        return;
    }

    conn.set_phase(ConnectionPhase::Live);
    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut side_open = true;

    loop {
        tokio::select! {
            notification = store_rx.recv() => match notification {
                Ok(StoreNotification::EntryAdded(entry)) => {
                    let entry = shape(entry, config.verbose_diagnostics);
                    if tx.send(WireEvent::LogEntry(entry)).await.is_err() {
                        break;
                    }
                }
                Ok(StoreNotification::Completed(summary)) => {
                    let _ = tx.send(WireEvent::JobCompleted(summary)).await;
                    sleep(config.close_grace).await;
                    break;
                }
                Ok(StoreNotification::Failed(error)) => {
                    let _ = tx.send(WireEvent::JobFailed { error }).await;
                    sleep(config.close_grace).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(job = %conn.job_id, missed, "viewer lagged behind the transcript feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = side_rx.recv(), if side_open => match message {
                Ok(message) if message.job_id == conn.job_id => {
                    let entry = shape(message.into_entry(), config.verbose_diagnostics);
                    if tx.send(WireEvent::LogEntry(entry)).await.is_err() {
                        break;
                    }
                }
                // Some other job's traffic; not ours to forward.
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(job = %conn.job_id, missed, "viewer lagged behind the side channel");
                }
                Err(broadcast::error::RecvError::Closed) => side_open = false,
            },
            _ = heartbeat.tick() => {
                // A failed send means the viewer dropped its stream, so the
                // heartbeat doubles as disconnect detection on quiet jobs.
                if tx.send(WireEvent::heartbeat()).await.is_err() {
                    debug!(job = %conn.job_id, "viewer disconnected, tearing down");
                    break;
                }
            }
        }
    }

    conn.set_phase(ConnectionPhase::Closing);
    conn.close();
}
