//! Manages the state of long-running card-generation jobs.
//!
//! Batch generation runs outside the request/response cycle: the start
//! endpoint registers a job and returns, the worker reports progress while
//! later unrelated requests poll it. The components here are:
//! - `JobsState`: a clonable, thread-safe container injected into the Actix
//!   application state in `main.rs`. Holds every job snapshot plus the
//!   per-job cooperative cancellation flags.
//! - `JobUpdate`/`JobPatch`: delta messages a worker pushes over an MPSC
//!   channel instead of writing the map directly.
//! - `start_job_updater`: the single writer. Applying patches in one task
//!   keeps the contract cheap to enforce: `processed` never decreases,
//!   terminal states are immutable, readers always see a consistent
//!   snapshot behind one `RwLock` read.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

use common::jobs::{BatchJob, BatchState};
use tokio::sync::{RwLock, mpsc};

/// A delta to one job, applied by the updater task.
#[derive(Debug)]
pub enum JobPatch {
    /// The worker started consuming records.
    Started,
    /// A record attempt finished (success or failure); `processed` is the
    /// total number of attempts so far.
    RecordProcessed { processed: usize },
    /// A record failed; the batch continues.
    RecordFailed { message: String },
    /// Free-form progress log entry.
    Event { message: String },
    /// Terminal: archive promoted to its durable location.
    Completed { archive_path: String },
    /// Terminal: the batch as a whole failed.
    Failed { error: String },
}

/// An update message for a specific job.
#[derive(Debug)]
pub struct JobUpdate {
    pub job_id: String,
    pub patch: JobPatch,
}

/// A thread-safe, shareable container for the state of all batch jobs.
#[derive(Clone)]
pub struct JobsState {
    /// Single source of truth for job snapshots. Concurrent reads (status
    /// polls), exclusive writes (the updater task only).
    pub jobs: Arc<RwLock<HashMap<String, BatchJob>>>,
    /// Cooperative cancellation flags, checked by workers between records.
    cancel_flags: Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>,
    /// Workers push `JobUpdate`s here; the updater task consumes them.
    pub tx: mpsc::Sender<JobUpdate>,
}

impl JobsState {
    /// Creates the shared state plus the receiver the updater task consumes.
    pub fn new() -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(100);
        let state = JobsState {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
            tx,
        };
        (state, rx)
    }

    /// Registers a new job and returns its cancellation flag.
    pub async fn register(&self, job: BatchJob) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .write()
            .await
            .insert(job.id.clone(), flag.clone());
        self.jobs.write().await.insert(job.id.clone(), job);
        flag
    }

    /// A consistent snapshot of one job, possibly stale, never rolled back.
    pub async fn snapshot(&self, job_id: &str) -> Option<BatchJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Sets the cancellation flag. Returns false for unknown jobs.
    pub async fn request_cancel(&self, job_id: &str) -> bool {
        match self.cancel_flags.read().await.get(job_id) {
            Some(flag) => {
                flag.store(true, std::sync::atomic::Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Drops a job and its cancellation flag (after download or retention).
    pub async fn remove(&self, job_id: &str) -> Option<BatchJob> {
        self.cancel_flags.write().await.remove(job_id);
        self.jobs.write().await.remove(job_id)
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Applies one patch to a job snapshot, enforcing the store contract.
pub fn apply_patch(job: &mut BatchJob, patch: JobPatch) {
    if job.state.is_terminal() {
        // Completed/Failed are immutable; late worker messages are dropped.
        return;
    }
    match patch {
        JobPatch::Started => {
            if job.state == BatchState::Pending {
                job.state = BatchState::Processing;
            }
            job.events.push(format!("processing {} records", job.total));
        }
        JobPatch::RecordProcessed { processed } => {
            // Forward-only, never past the total.
            job.processed = job.processed.max(processed.min(job.total));
        }
        JobPatch::RecordFailed { message } => {
            job.events.push(message.clone());
            job.errors.push(message);
        }
        JobPatch::Event { message } => job.events.push(message),
        JobPatch::Completed { archive_path } => {
            job.state = BatchState::Completed;
            job.archive_path = Some(archive_path);
            job.finished_at = Some(epoch_secs());
            job.events.push("batch completed".to_string());
        }
        JobPatch::Failed { error } => {
            job.state = BatchState::Failed;
            job.events.push(format!("batch failed: {error}"));
            job.error = Some(error);
            job.finished_at = Some(epoch_secs());
        }
    }
}

/// Starts the central job state updater task.
///
/// Spawned once from `main.rs`; exits when every sender is gone.
pub async fn start_job_updater(state: JobsState, mut rx: mpsc::Receiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        let mut jobs = state.jobs.write().await;
        if let Some(job) = jobs.get_mut(&update.job_id) {
            apply_patch(job, update.patch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn processed_is_monotonic_and_capped() {
        let mut job = BatchJob::new("j", 5);
        apply_patch(&mut job, JobPatch::RecordProcessed { processed: 3 });
        assert_eq!(job.processed, 3);
        // An out-of-order update never rolls progress back.
        apply_patch(&mut job, JobPatch::RecordProcessed { processed: 2 });
        assert_eq!(job.processed, 3);
        apply_patch(&mut job, JobPatch::RecordProcessed { processed: 99 });
        assert_eq!(job.processed, 5);
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut job = BatchJob::new("j", 2);
        apply_patch(
            &mut job,
            JobPatch::Failed {
                error: "disk full".to_string(),
            },
        );
        assert_eq!(job.state, BatchState::Failed);
        assert!(job.finished_at.is_some());

        apply_patch(
            &mut job,
            JobPatch::Completed {
                archive_path: "late.zip".to_string(),
            },
        );
        assert_eq!(job.state, BatchState::Failed);
        assert_eq!(job.archive_path, None);
    }

    #[test]
    fn record_failures_accumulate_without_failing_the_job() {
        let mut job = BatchJob::new("j", 3);
        apply_patch(&mut job, JobPatch::Started);
        assert_eq!(job.state, BatchState::Processing);
        apply_patch(
            &mut job,
            JobPatch::RecordFailed {
                message: "record 2: corrupt photo".to_string(),
            },
        );
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.state, BatchState::Processing);
    }

    #[tokio::test]
    async fn updater_applies_patches_to_snapshots() {
        let (state, rx) = JobsState::new();
        state.register(BatchJob::new("job-1", 2)).await;
        let updater = tokio::spawn(start_job_updater(state.clone(), rx));

        for patch in [
            JobPatch::Started,
            JobPatch::RecordProcessed { processed: 2 },
            JobPatch::Completed {
                archive_path: "archives/job-1.zip".to_string(),
            },
        ] {
            state
                .tx
                .send(JobUpdate {
                    job_id: "job-1".to_string(),
                    patch,
                })
                .await
                .unwrap();
        }

        let snapshot = loop {
            let snap = state.snapshot("job-1").await.unwrap();
            if snap.state.is_terminal() {
                break snap;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.state, BatchState::Completed);
        assert_eq!(snapshot.archive_path.as_deref(), Some("archives/job-1.zip"));
        updater.abort();
    }

    #[tokio::test]
    async fn cancel_flag_round_trip() {
        let (state, _rx) = JobsState::new();
        let flag = state.register(BatchJob::new("job-1", 1)).await;
        assert!(!flag.load(Ordering::Relaxed));
        assert!(state.request_cancel("job-1").await);
        assert!(flag.load(Ordering::Relaxed));
        assert!(!state.request_cancel("nope").await);

        state.remove("job-1").await;
        assert!(state.snapshot("job-1").await.is_none());
        assert!(!state.request_cancel("job-1").await);
    }
}
