use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponseWithMessage, group_error_response};
use crate::database as db;
use crate::engine::Engine;
use crate::groups::CellGroup;

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub notebook: String,
    pub cell_a: String,
    pub cell_b: String,
}

#[derive(Deserialize)]
pub struct DisconnectRequest {
    pub notebook: String,
    pub cell_id: String,
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub cell_id: String,
    /// What is left of the group; `None` when it was dissolved
    pub group: Option<CellGroup>,
}

#[derive(Deserialize)]
pub struct GroupsQuery {
    pub notebook: String,
}

#[post("/groups/connect")]
pub async fn connect_handler(
    engine: web::Data<Engine>,
    pool: web::Data<SqlitePool>,
    body: web::Json<ConnectRequest>,
) -> impl Responder {
    let group = match engine.connect(&body.notebook, &body.cell_a, &body.cell_b) {
        Ok(group) => group,
        Err(e) => {
            log::info!("Rejected connect in {}: {e}", body.notebook);
            return group_error_response(&e);
        }
    };

    if let Err(response) = persist(&engine, &pool, &body.notebook).await {
        return response;
    }
    HttpResponse::Ok().json(group)
}

#[post("/groups/disconnect")]
pub async fn disconnect_handler(
    engine: web::Data<Engine>,
    pool: web::Data<SqlitePool>,
    body: web::Json<DisconnectRequest>,
) -> impl Responder {
    let group = match engine.disconnect(&body.notebook, &body.cell_id) {
        Ok(group) => group,
        Err(e) => {
            log::info!("Rejected disconnect in {}: {e}", body.notebook);
            return group_error_response(&e);
        }
    };

    if let Err(response) = persist(&engine, &pool, &body.notebook).await {
        return response;
    }
    HttpResponse::Ok().json(DisconnectResponse {
        cell_id: body.into_inner().cell_id,
        group,
    })
}

#[get("/groups")]
pub async fn list_groups_handler(
    engine: web::Data<Engine>,
    query: web::Query<GroupsQuery>,
) -> impl Responder {
    let groups: Vec<CellGroup> = engine.list_groups(&query.notebook).into_values().collect();
    log::debug!("Listed {} group(s) of {}", groups.len(), query.notebook);
    HttpResponse::Ok().json(groups)
}

/// Writes the current groups of `notebook` through to the database.
///
/// The registry change has already taken effect when this runs and is kept on
/// failure: every save writes the whole scope at its latest revision, so the
/// next successful write for the notebook stores it too.
async fn persist(engine: &Engine, pool: &SqlitePool, notebook: &str) -> Result<(), HttpResponse> {
    let snapshot = engine.registry().snapshot(notebook);
    match db::save_scope(notebook, &snapshot, pool).await {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!(
                "Failed to save groups of {notebook} at revision {}: {e}",
                snapshot.revision
            );
            Err(HttpResponse::InternalServerError().json(ErrorResponseWithMessage {
                reason: "ERR_EXTERNAL",
                code: 5,
                message: format!(
                    "groups of {notebook} were updated but not saved, the next change retries"
                ),
            }))
        }
    }
}
