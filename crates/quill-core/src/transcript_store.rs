//! In-memory, per-job transcript store with publish/subscribe semantics.
//!
//! The store is a process-scoped registry object; components receive a
//! handle to it at construction rather than reaching for ambient state.
//! Appends and subscriptions take the same lock, so every subscriber
//! observes entries in append order, and a subscriber created between two
//! appends gets exactly the earlier entries in its snapshot and exactly the
//! later ones live.

use quill_proto::{ConversationEntry, Error, Job, JobId, JobSnapshot, JobStatus, JobSummary, Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Per-job broadcast buffer. Slow subscribers past this lag are dropped by
/// the channel and surface as a logged `Lagged` on their receiver.
const NOTIFY_CAPACITY: usize = 256;

/// A notification published to every subscriber of a job.
#[derive(Debug, Clone)]
pub enum StoreNotification {
    /// An entry was appended to the transcript.
    EntryAdded(ConversationEntry),
    /// The job reached `Completed`.
    Completed(JobSummary),
    /// The job reached `Failed`, with the error message.
    Failed(String),
}

struct JobSlot {
    job: Job,
    notify: broadcast::Sender<StoreNotification>,
}

/// Atomic snapshot-plus-live-feed handed to a new subscriber.
///
/// `snapshot` holds every entry appended before the subscription existed;
/// `receiver` yields strictly subsequent notifications. No gap, no overlap.
pub struct JobSubscription {
    pub snapshot: Job,
    pub receiver: broadcast::Receiver<StoreNotification>,
}

/// The per-job live transcript store.
#[derive(Default)]
pub struct TranscriptStore {
    jobs: Mutex<HashMap<JobId, JobSlot>>,
}

impl TranscriptStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, JobSlot>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a job, idempotently.
    ///
    /// Returns true if the job was created, false if it already existed
    /// (in which case the existing record is left untouched).
    pub fn create_job(&self, id: JobId, task_type: impl Into<String>) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(&id) {
            debug!(job = %id, "create_job: already exists");
            return false;
        }
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        let job = Job::new(id.clone(), task_type);
        debug!(job = %id, task_type = %job.task_type, "job created");
        jobs.insert(id, JobSlot { job, notify });
        true
    }

    /// Appends an entry to a job's transcript and notifies every current
    /// subscriber. The caller guarantees it never submits the same logical
    /// message twice; no deduplication happens here.
    pub fn append_entry(&self, id: &JobId, entry: ConversationEntry) -> Result<()> {
        let mut jobs = self.lock();
        let slot = jobs.get_mut(id).ok_or_else(|| Error::JobNotFound(id.clone()))?;
        if slot.job.status.is_terminal() {
            return Err(Error::JobTerminated(id.clone()));
        }
        debug!(
            job = %id,
            agent = %entry.agent_id,
            iteration = entry.iteration,
            "transcript entry appended"
        );
        slot.job.transcript.push(entry.clone());
        // No receivers is fine; the job runs whether anyone is watching or not.
        let _ = slot.notify.send(StoreNotification::EntryAdded(entry));
        Ok(())
    }

    /// Marks a job completed and notifies subscribers. A no-op if the job
    /// is already terminal.
    pub fn complete_job(&self, id: &JobId, summary: JobSummary) -> Result<()> {
        let mut jobs = self.lock();
        let slot = jobs.get_mut(id).ok_or_else(|| Error::JobNotFound(id.clone()))?;
        if slot.job.status.is_terminal() {
            debug!(job = %id, "complete_job: already terminal, ignoring");
            return Ok(());
        }
        slot.job.status = JobStatus::Completed;
        slot.job.ended_at = Some(Utc::now());
        slot.job.summary = Some(summary.clone());
        debug!(job = %id, turns = summary.total_turns, "job completed");
        let _ = slot.notify.send(StoreNotification::Completed(summary));
        Ok(())
    }

    /// Marks a job failed and notifies subscribers. A no-op if the job is
    /// already terminal.
    pub fn fail_job(&self, id: &JobId, error: impl Into<String>) -> Result<()> {
        let mut jobs = self.lock();
        let slot = jobs.get_mut(id).ok_or_else(|| Error::JobNotFound(id.clone()))?;
        if slot.job.status.is_terminal() {
            debug!(job = %id, "fail_job: already terminal, ignoring");
            return Ok(());
        }
        let error = error.into();
        slot.job.status = JobStatus::Failed;
        slot.job.ended_at = Some(Utc::now());
        slot.job.error = Some(error.clone());
        warn!(job = %id, error = %error, "job failed");
        let _ = slot.notify.send(StoreNotification::Failed(error));
        Ok(())
    }

    /// Returns a snapshot of a job, transcript included.
    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.lock().get(id).map(|slot| slot.job.clone())
    }

    /// Ids of jobs still running.
    pub fn running_jobs(&self) -> Vec<JobId> {
        self.lock()
            .values()
            .filter(|slot| !slot.job.status.is_terminal())
            .map(|slot| slot.job.id.clone())
            .collect()
    }

    /// Lightweight snapshots of every known job.
    pub fn all_jobs(&self) -> Vec<JobSnapshot> {
        self.lock().values().map(|slot| slot.job.snapshot()).collect()
    }

    /// Every known job id; used for not-found diagnostics.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.lock().keys().cloned().collect()
    }

    /// Subscribes to a job's notifications.
    ///
    /// The transcript snapshot and the live receiver are taken under one
    /// lock acquisition, which is what makes history replay gap-free.
    pub fn subscribe(&self, id: &JobId) -> Option<JobSubscription> {
        let jobs = self.lock();
        let slot = jobs.get(id)?;
        Some(JobSubscription {
            snapshot: slot.job.clone(),
            receiver: slot.notify.subscribe(),
        })
    }
}
