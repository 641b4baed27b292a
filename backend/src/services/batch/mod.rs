//! Batch card-generation endpoints.
//!
//! The lifecycle spans four routes: a start call that validates inputs and
//! returns a job id immediately, a status poll that later unrelated requests
//! hit (typically every second), a one-shot archive download, and a
//! cooperative cancel. The actual work runs in the job worker spawned by
//! `start`; the handlers here only talk to the shared `JobsState`.

use actix_web::Scope;
use actix_web::web::{get, post, scope};

mod cancel;
mod download;
pub mod start;
mod status;

const API_PATH: &str = "/api/batch";

/// Configures and returns the Actix `Scope` for all batch routes.
///
/// # Registered Routes:
///
/// *   **`POST /start`** — resolves the active template and the record set,
///     validates both, registers a job and returns `{job_id, total}`.
/// *   **`GET /status/{job_id}`** — progress snapshot with percentage,
///     per-record errors and, once completed, the archive URL.
/// *   **`GET /download/{job_id}`** — streams the finished archive and
///     deletes the server-side copy (one-shot).
/// *   **`POST /cancel/{job_id}`** — requests cooperative cancellation.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/start", post().to(start::process))
        .route("/status/{job_id}", get().to(status::process))
        .route("/download/{job_id}", get().to(download::process))
        .route("/cancel/{job_id}", post().to(cancel::process))
}
