//! Cooperative cancellation of a running batch.
//!
//! Sets the job's cancellation flag; the worker checks it between records,
//! so the current record finishes normally before the job stops and fails
//! with a cancellation diagnostic.

use actix_web::{Responder, web};

use crate::job_controller::state::JobsState;

pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> impl Responder {
    if state.request_cancel(&job_id.into_inner()).await {
        actix_web::HttpResponse::Ok().body("cancellation requested")
    } else {
        actix_web::HttpResponse::NotFound().body("Job ID not found")
    }
}
