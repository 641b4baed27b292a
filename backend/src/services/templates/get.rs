//! # Template Retrieval Service
//!
//! Fetches template configurations: one by id, or whichever template is
//! currently active. The active template is what `POST /api/batch/start`
//! renders with, so the editor polls `GET /api/templates/active/get` to show
//! operators what a batch would use.

use actix_web::web;

use crate::storage;

/// Actix web handler for `GET /api/templates/{template_id}`.
pub async fn process(template_id: web::Path<String>) -> impl actix_web::Responder {
    match get_template(&template_id).await {
        Ok(template) => actix_web::HttpResponse::Ok().json(template),
        Err(e) => actix_web::HttpResponse::NotFound()
            .body(format!("Error retrieving template: {}", e)),
    }
}

/// Actix web handler for `GET /api/templates/active/get`.
pub async fn process_active() -> impl actix_web::Responder {
    let result = storage::open().and_then(|conn| storage::templates::get_active(&conn));
    match result {
        Ok(Some(template)) => actix_web::HttpResponse::Ok().json(template),
        Ok(None) => actix_web::HttpResponse::NotFound().body("No active template"),
        Err(e) => actix_web::HttpResponse::ServiceUnavailable()
            .body(format!("Error retrieving template: {}", e)),
    }
}

pub async fn get_template(
    template_id: &str,
) -> Result<common::model::template::TemplateConfig, String> {
    let conn = storage::open()?;
    storage::templates::get_template(&conn, template_id)
}
