use actix_web::{Responder, web};
use common::model::template::TemplateConfig;

use crate::storage;

pub async fn process(payload: web::Json<TemplateConfig>) -> impl Responder {
    match save_template(&payload).await {
        Ok(_) => actix_web::HttpResponse::Ok().body("Template guardado correctamente"),
        Err(e) => actix_web::HttpResponse::ServiceUnavailable()
            .body(format!("Error al guardar template: {}", e)),
    }
}

pub async fn save_template(payload: &TemplateConfig) -> Result<(), String> {
    let conn = storage::open()?;
    storage::templates::save_template(&conn, payload)
}
