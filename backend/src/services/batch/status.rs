//! Progress polling for batch jobs.

use actix_web::{Responder, web};
use common::jobs::{BatchJob, BatchState};
use serde::Serialize;

use crate::job_controller::state::JobsState;

/// What a poll returns. `archive_url` appears only once the job completed
/// and its archive is still on disk; `error` carries the fatal diagnostic
/// of a failed job, while `errors` lists tolerated per-record failures.
#[derive(Serialize)]
struct StatusResponse {
    total: usize,
    processed: usize,
    state: BatchState,
    percent: f64,
    archive_url: Option<String>,
    error: Option<String>,
    errors: Vec<String>,
}

impl From<&BatchJob> for StatusResponse {
    fn from(job: &BatchJob) -> Self {
        let archive_url = match (&job.state, &job.archive_path) {
            (BatchState::Completed, Some(_)) => Some(format!("/api/batch/download/{}", job.id)),
            _ => None,
        };
        StatusResponse {
            total: job.total,
            processed: job.processed,
            state: job.state,
            percent: job.percent(),
            archive_url,
            error: job.error.clone(),
            errors: job.errors.clone(),
        }
    }
}

pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> impl Responder {
    match state.snapshot(&job_id.into_inner()).await {
        Some(job) => actix_web::HttpResponse::Ok().json(StatusResponse::from(&job)),
        None => actix_web::HttpResponse::NotFound().body("Job ID not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_controller::state::{JobPatch, apply_patch};

    #[test]
    fn archive_url_appears_only_when_completed() {
        let mut job = BatchJob::new("j-1", 4);
        apply_patch(&mut job, JobPatch::Started);
        apply_patch(&mut job, JobPatch::RecordProcessed { processed: 2 });

        let response = StatusResponse::from(&job);
        assert_eq!(response.processed, 2);
        assert_eq!(response.percent, 50.0);
        assert!(response.archive_url.is_none());
        assert!(response.error.is_none());

        apply_patch(
            &mut job,
            JobPatch::Completed {
                archive_path: "archives/j-1.zip".to_string(),
            },
        );
        let response = StatusResponse::from(&job);
        assert_eq!(
            response.archive_url.as_deref(),
            Some("/api/batch/download/j-1")
        );
    }

    #[test]
    fn failed_jobs_expose_their_diagnostic() {
        let mut job = BatchJob::new("j-2", 3);
        apply_patch(
            &mut job,
            JobPatch::Failed {
                error: "archive creation failed: disk full".to_string(),
            },
        );
        let response = StatusResponse::from(&job);
        assert_eq!(
            response.error.as_deref(),
            Some("archive creation failed: disk full")
        );
        assert!(response.archive_url.is_none());
    }
}
