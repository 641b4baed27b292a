use actix_web::web;

use crate::storage;

/// Actix web handler for `POST /api/templates/activate/{template_id}`.
///
/// Makes the given template the active one; the previously active template
/// is deactivated but kept as history.
pub async fn process(template_id: web::Path<String>) -> impl actix_web::Responder {
    let result = storage::open().and_then(|conn| {
        storage::templates::activate(&conn, &template_id)
    });
    match result {
        Ok(_) => actix_web::HttpResponse::Ok().body("Template activado correctamente"),
        Err(e) if e == "Template not found" => actix_web::HttpResponse::NotFound().body(e),
        Err(e) => actix_web::HttpResponse::ServiceUnavailable()
            .body(format!("Error al activar template: {}", e)),
    }
}
