//! One-shot archive download.
//!
//! The archive is served exactly once: the server-side copy and the job
//! entry are removed as part of a successful send. A second request gets a
//! 404, and nothing is ever served before the job reaches `Completed`.

use std::fs;

use actix_web::{HttpResponse, Responder, web};
use common::jobs::BatchState;
use log::{error, info, warn};

use crate::job_controller::state::JobsState;

pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> impl Responder {
    let job_id = job_id.into_inner();
    let Some(job) = state.snapshot(&job_id).await else {
        return HttpResponse::NotFound().body("Job ID not found");
    };
    if job.state != BatchState::Completed {
        return HttpResponse::Conflict().body("batch is not completed yet");
    }
    let Some(archive_path) = job.archive_path else {
        return HttpResponse::NotFound().body("archive no longer available");
    };

    let bytes = match fs::read(&archive_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("cannot read archive {archive_path}: {e}");
            return HttpResponse::InternalServerError().body("cannot read archive");
        }
    };

    // One-shot: drop the server-side copy and the job before responding.
    if let Err(e) = fs::remove_file(&archive_path) {
        warn!("could not remove served archive {archive_path}: {e}");
    }
    state.remove(&job_id).await;
    info!("archive for job {job_id} downloaded and removed");

    HttpResponse::Ok()
        .content_type("application/zip")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"carnets_{job_id}.zip\""),
        ))
        .body(bytes)
}
