//! Stream attribution: reconstructing agent-bounded messages from the
//! engine's raw feed.
//!
//! The feed is ordered in time but ambiguous in shape: identity may be
//! explicit, implied by a name or session id, or missing entirely, and a
//! single logical turn can be closed by several redundant finish markers.
//! The engine resolves identity per event, tracks the active agent and the
//! per-job turn counter, accumulates deltas in per-agent buffers, and
//! flushes each buffer instance into exactly one `ConversationEntry`. The
//! counter advances only when control changes hands, so an agent speaking
//! again after a flush opens a fresh buffer that reuses the current turn
//! number; two entries may therefore share an iteration, which stays
//! monotonic but is not unique.
//!
//! Precondition: the upstream engine serializes agent turns. Buffers are
//! keyed by agent id only, so two agents streaming concurrently would
//! interleave; that input is out of contract.

use crate::TranscriptStore;
use futures::{Stream, StreamExt};
use quill_proto::{
    AgentId, AgentIdentity, Attribution, ConversationEntry, EntryMetadata, FlushTrigger,
    IdentityHints, JobId, JobSummary, MessageKind, RawEvent, Result, RoleVocabulary, Signal,
};
use std::collections::{BTreeSet, HashMap, hash_map::Entry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Transient accumulation state for one streaming agent.
#[derive(Debug)]
struct OutputBuffer {
    identity: AgentIdentity,
    text: String,
    /// Turn number assigned when the buffer was opened. The counter may
    /// move on before an unflushed buffer is swept; the entry keeps this.
    turn: u32,
    /// Consumption guard: a buffer is flushed at most once.
    sent: bool,
}

impl OutputBuffer {
    fn new(identity: AgentIdentity, turn: u32) -> Self {
        Self {
            identity,
            text: String::new(),
            turn,
            sent: false,
        }
    }
}

/// Attributes the raw event feed of one job and flushes finished messages
/// into the transcript store.
pub struct AttributionEngine {
    store: Arc<TranscriptStore>,
    job_id: JobId,
    vocabulary: RoleVocabulary,
    /// Global per-job turn counter; +1 exactly when the resolved agent
    /// differs from the active pointer.
    turn: u32,
    active: Option<AgentId>,
    buffers: HashMap<AgentId, OutputBuffer>,
    agents_seen: BTreeSet<String>,
    started: Instant,
}

impl AttributionEngine {
    /// Creates an engine for one job run. The job must already exist in
    /// the store.
    pub fn new(store: Arc<TranscriptStore>, job_id: JobId) -> Self {
        Self {
            store,
            job_id,
            vocabulary: RoleVocabulary::default(),
            turn: 0,
            active: None,
            buffers: HashMap::new(),
            agents_seen: BTreeSet::new(),
            started: Instant::now(),
        }
    }

    /// Replaces the role vocabulary used for identity attribution.
    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary: RoleVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// The job this engine feeds.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The store this engine flushes into.
    pub fn store(&self) -> &Arc<TranscriptStore> {
        &self.store
    }

    /// Current value of the turn counter.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Processes one raw event.
    ///
    /// Unattributable events are logged and skipped; store errors abort
    /// the job and propagate to the caller.
    pub fn handle(&mut self, event: RawEvent) -> Result<()> {
        match event.normalize() {
            Signal::TurnStart(hints) => {
                if let Some(identity) = self.resolve(&hints, "turn-start") {
                    self.activate(identity);
                }
                Ok(())
            }
            Signal::Delta(hints, text) => {
                let Some(identity) = self.resolve(&hints, "text-delta") else {
                    return Ok(());
                };
                self.activate(identity.clone());
                if let Some(buffer) = self.buffers.get_mut(&identity.id) {
                    buffer.text.push_str(&text);
                }
                Ok(())
            }
            Signal::Flush {
                hints,
                trigger,
                metadata,
            } => {
                if let Some(identity) = self.resolve(&hints, "finish") {
                    self.activate(identity);
                }
                let Some(active) = self.active.clone() else {
                    debug!(job = %self.job_id, trigger = %trigger, "finish signal with no active agent");
                    return Ok(());
                };
                self.flush_buffer(&active, trigger, metadata)
            }
            Signal::Handoff { from, to, note } => self.record_handoff(from, to, note),
        }
    }

    /// End-of-stream sweep: flushes every unsent, non-empty buffer in turn
    /// order and returns the execution summary. Guards against turns whose
    /// explicit finish signal never arrived.
    pub fn finish(&mut self) -> Result<JobSummary> {
        let mut pending: Vec<(u32, AgentId)> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| !buffer.sent && !buffer.text.is_empty())
            .map(|(id, buffer)| (buffer.turn, id.clone()))
            .collect();
        pending.sort();

        for (turn, id) in pending {
            debug!(job = %self.job_id, agent = %id, turn, "sweeping unflushed buffer at stream end");
            self.flush_buffer(&id, FlushTrigger::StreamEnd, None)?;
        }

        Ok(self.summary())
    }

    /// The execution summary as of now.
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            total_turns: self.turn,
            agents: self.agents_seen.iter().cloned().collect(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Resolves event hints to an identity, applying the active-agent
    /// fallback for events that carry no identity at all.
    fn resolve(&self, hints: &IdentityHints, context: &'static str) -> Option<AgentIdentity> {
        let attribution = self.vocabulary.resolve(hints);
        match attribution {
            Attribution::Unknown => match &self.active {
                Some(active) => self.buffers.get(active).map(|b| b.identity.clone()),
                None => {
                    warn!(
                        job = %self.job_id,
                        context,
                        "dropping event: no identity information and no active agent"
                    );
                    None
                }
            },
            attributed => {
                let source = attributed.source_label();
                let identity = attributed.into_identity();
                if let Some(identity) = &identity {
                    debug!(job = %self.job_id, agent = %identity.id, source, context, "identity resolved");
                }
                identity
            }
        }
    }

    /// Turn tracking: advances the counter iff the resolved agent differs
    /// from the active pointer, and opens a fresh buffer where needed.
    fn activate(&mut self, identity: AgentIdentity) {
        if self.active.as_ref() != Some(&identity.id) {
            self.turn += 1;
            debug!(job = %self.job_id, agent = %identity.id, turn = self.turn, "active agent changed");
            self.active = Some(identity.id.clone());
        }
        self.agents_seen.insert(identity.id.as_str().to_string());

        let turn = self.turn;
        match self.buffers.entry(identity.id.clone()) {
            Entry::Occupied(mut slot) => {
                // A consumed buffer is never reused; the same agent speaking
                // again opens a new one at the current turn.
                if slot.get().sent {
                    *slot.get_mut() = OutputBuffer::new(identity, turn);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(OutputBuffer::new(identity, turn));
            }
        }
    }

    /// The single flush path for all finish shapes and the sweep.
    fn flush_buffer(
        &mut self,
        id: &AgentId,
        trigger: FlushTrigger,
        metadata: Option<EntryMetadata>,
    ) -> Result<()> {
        let entry = {
            let Some(buffer) = self.buffers.get_mut(id) else {
                return Ok(());
            };
            if buffer.sent {
                debug!(job = %self.job_id, agent = %id, trigger = %trigger, "redundant finish signal ignored");
                return Ok(());
            }
            if buffer.text.is_empty() {
                debug!(job = %self.job_id, agent = %id, trigger = %trigger, "finish signal with empty buffer");
                return Ok(());
            }
            let text = std::mem::take(&mut buffer.text);
            buffer.sent = true;
            debug!(
                job = %self.job_id,
                agent = %id,
                turn = buffer.turn,
                trigger = %trigger,
                bytes = text.len(),
                "flushing buffer"
            );
            ConversationEntry::new(buffer.identity.clone(), text, buffer.turn)
                .with_metadata(metadata)
        };
        self.store.append_entry(&self.job_id, entry)
    }

    /// Surfaces an inter-agent handoff as an `internal` entry attributed to
    /// the synthetic router identity. Does not advance the turn counter.
    fn record_handoff(
        &mut self,
        from: Option<String>,
        to: Option<String>,
        note: Option<String>,
    ) -> Result<()> {
        let mut message = match (&from, &to) {
            (Some(from), Some(to)) => format!("handoff: {from} -> {to}"),
            (Some(from), None) => format!("handoff from {from}"),
            (None, Some(to)) => format!("handoff to {to}"),
            (None, None) => "handoff".to_string(),
        };
        if let Some(note) = note {
            message.push_str(" (");
            message.push_str(&note);
            message.push(')');
        }
        let entry = ConversationEntry::new(AgentIdentity::router(), message, self.turn)
            .with_kind(MessageKind::Internal);
        self.store.append_entry(&self.job_id, entry)
    }
}

/// Drives an engine from a raw event stream until the feed ends.
///
/// On any processing error the job is marked failed and the error
/// propagates. On a clean end of stream the remaining buffers are swept
/// and the job is completed with the execution summary.
pub async fn run_feed<S>(mut engine: AttributionEngine, feed: S) -> Result<JobSummary>
where
    S: Stream<Item = RawEvent>,
{
    tokio::pin!(feed);

    while let Some(event) = feed.next().await {
        if let Err(error) = engine.handle(event) {
            warn!(job = %engine.job_id(), error = %error, "attribution failed, aborting job");
            let _ = engine.store.fail_job(&engine.job_id, error.to_string());
            return Err(error);
        }
    }

    match engine.finish() {
        Ok(summary) => {
            engine
                .store
                .complete_job(&engine.job_id, summary.clone())?;
            Ok(summary)
        }
        Err(error) => {
            let _ = engine.store.fail_job(&engine.job_id, error.to_string());
            Err(error)
        }
    }
}
