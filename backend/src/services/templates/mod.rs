//! # Template Service Module
//!
//! Aggregates the API endpoints for managing card templates: saving a
//! template configuration, fetching one, and switching which template is
//! active. Activation history is immutable — templates are deactivated,
//! never deleted.
//!
//! ## Sub-modules:
//! - `get`: retrieval of a template by id and of the active template.
//! - `save`: creation and update of templates.
//! - `activate`: switching the single active template.

mod activate;
mod get;
mod save;

use actix_web::Scope;
use actix_web::web::{get, post, scope};

/// The base path for all template-related API endpoints.
const API_PATH: &str = "/api/templates";

/// Configures and returns the Actix `Scope` for all template routes.
///
/// # Registered Routes:
///
/// *   **`POST /save`** — upserts a `TemplateConfig` (JSON body with the
///     base64 background and the ordered field map).
/// *   **`GET /active/get`** — returns the currently active template.
/// *   **`POST /activate/{template_id}`** — makes a template active.
/// *   **`GET /{template_id}`** — returns one template by id.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/save", post().to(save::process))
        .route("/active/get", get().to(get::process_active))
        .route("/activate/{template_id}", post().to(activate::process))
        .route("/{template_id}", get().to(get::process))
}
