//! Evicts finished jobs whose archives were never downloaded.
//!
//! Download is one-shot and removes the job eagerly; this sweeper covers the
//! jobs nobody came back for, deleting the durable archive and the job entry
//! once the retention period has elapsed.

use std::time::Duration;

use log::{info, warn};

use crate::job_controller::state::{JobsState, epoch_secs};

/// Runs forever, sweeping at a fraction of the retention period.
pub async fn start_retention_sweeper(state: JobsState, retention: Duration) {
    let interval = Duration::from_secs((retention.as_secs() / 4).clamp(10, 300));
    loop {
        tokio::time::sleep(interval).await;
        sweep(&state, retention).await;
    }
}

/// One sweep pass: removes every terminal job older than `retention`.
pub async fn sweep(state: &JobsState, retention: Duration) {
    let cutoff = epoch_secs().saturating_sub(retention.as_secs());
    let expired: Vec<String> = {
        let jobs = state.jobs.read().await;
        jobs.values()
            .filter(|job| {
                job.state.is_terminal() && job.finished_at.map(|t| t <= cutoff).unwrap_or(false)
            })
            .map(|job| job.id.clone())
            .collect()
    };

    for job_id in expired {
        if let Some(job) = state.remove(&job_id).await {
            if let Some(archive) = &job.archive_path {
                if let Err(e) = std::fs::remove_file(archive) {
                    if std::path::Path::new(archive).exists() {
                        warn!("could not remove expired archive {archive}: {e}");
                    }
                }
            }
            info!("evicted expired job {job_id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::jobs::BatchJob;
    use crate::job_controller::state::{JobPatch, apply_patch};
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweep_removes_expired_terminal_jobs_and_archives() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("old-job.zip");
        std::fs::write(&archive, b"zip bytes").unwrap();

        let (state, _rx) = JobsState::new();
        let mut done = BatchJob::new("old-job", 1);
        apply_patch(
            &mut done,
            JobPatch::Completed {
                archive_path: archive.to_string_lossy().into_owned(),
            },
        );
        // Finished far in the past.
        done.finished_at = Some(0);
        state.register(done).await;

        let mut running = BatchJob::new("running", 1);
        apply_patch(&mut running, JobPatch::Started);
        state.register(running).await;

        sweep(&state, Duration::from_secs(60)).await;

        assert!(state.snapshot("old-job").await.is_none());
        assert!(!archive.exists());
        // Non-terminal jobs are never swept.
        assert!(state.snapshot("running").await.is_some());
    }

    #[tokio::test]
    async fn sweep_keeps_recent_terminal_jobs() {
        let (state, _rx) = JobsState::new();
        let mut done = BatchJob::new("fresh", 1);
        apply_patch(
            &mut done,
            JobPatch::Failed {
                error: "boom".to_string(),
            },
        );
        state.register(done).await;

        sweep(&state, Duration::from_secs(3600)).await;
        assert!(state.snapshot("fresh").await.is_some());
    }
}
