use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use crate::engine::Engine;

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

#[post("/validate")]
pub async fn validate_handler(
    engine: web::Data<Engine>,
    body: web::Json<ValidateRequest>,
) -> impl Responder {
    let report = engine.validate(&body.code);
    log::debug!(
        "Validated snippet: valid={} auto_wrap={}",
        report.valid,
        report.auto_wrap_applied
    );
    HttpResponse::Ok().json(report)
}
