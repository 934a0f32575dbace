mod execute;
mod groups;
mod validate;

pub use execute::{execute_cells_handler, execute_group_handler, execute_handler};
pub use groups::{connect_handler, disconnect_handler, list_groups_handler};
pub use validate::validate_handler;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use serde::Serialize;

use crate::engine::Engine;
use crate::error::GroupError;
use crate::queue::JobQueue;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

/// Maps a registry error to its HTTP response
fn group_error_response(err: &GroupError) -> HttpResponse {
    let message = err.to_string();
    match err {
        GroupError::NotGrouped(_) | GroupError::UnknownGroup(_) => {
            HttpResponse::NotFound().json(ErrorResponseWithMessage {
                reason: "ERR_NOT_FOUND",
                code: 3,
                message,
            })
        }
        GroupError::AlreadyInDifferentGroup { .. } | GroupError::GroupBusy(_) => {
            HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                reason: "ERR_INVALID_STATE",
                code: 2,
                message,
            })
        }
        _ => HttpResponse::BadRequest().json(ErrorResponseWithMessage {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message,
        }),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    toolchain_available: bool,
    queued_jobs: usize,
}

#[get("/health")]
pub async fn health_handler(
    engine: web::Data<Engine>,
    job_queue: web::Data<JobQueue>,
) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        toolchain_available: engine.toolchain_available().await,
        queued_jobs: job_queue.len().await,
    })
}
