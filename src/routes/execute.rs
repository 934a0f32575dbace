use std::collections::HashMap;

use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use super::{ErrorResponse, ErrorResponseWithMessage};
use crate::engine::{CellExecution, Engine};
use crate::queue::{ExecutionJob, JobKind, JobQueue};

#[derive(Deserialize)]
pub struct CellsExecution {
    pub codes: Vec<String>,
    pub execution_count: Option<u64>,
}

#[derive(Deserialize)]
pub struct GroupExecution {
    pub notebook: String,
    #[serde(default)]
    pub cells: HashMap<String, String>,
    pub execution_count: Option<u64>,
}

#[post("/execute")]
pub async fn execute_handler(
    job_queue: web::Data<JobQueue>,
    body: web::Json<CellExecution>,
) -> impl Responder {
    submit(&job_queue, JobKind::Cell(body.into_inner())).await
}

#[post("/execute/cells")]
pub async fn execute_cells_handler(
    job_queue: web::Data<JobQueue>,
    body: web::Json<CellsExecution>,
) -> impl Responder {
    let CellsExecution {
        codes,
        execution_count,
    } = body.into_inner();
    submit(
        &job_queue,
        JobKind::Cells {
            codes,
            execution_count,
        },
    )
    .await
}

#[post("/groups/{group_id}/execute")]
pub async fn execute_group_handler(
    engine: web::Data<Engine>,
    job_queue: web::Data<JobQueue>,
    path: web::Path<(String,)>,
    body: web::Json<GroupExecution>,
) -> impl Responder {
    let group_id = path.into_inner().0;
    let GroupExecution {
        notebook,
        cells,
        execution_count,
    } = body.into_inner();

    if engine.registry().group(&notebook, &group_id).is_none() {
        return HttpResponse::NotFound().json(ErrorResponseWithMessage {
            reason: "ERR_NOT_FOUND",
            code: 3,
            message: format!("Group {group_id} not found in {notebook}."),
        });
    }

    submit(
        &job_queue,
        JobKind::Group {
            notebook,
            group_id,
            cells,
            execution_count,
        },
    )
    .await
}

/// Queues the job and waits for a worker to answer
async fn submit(job_queue: &JobQueue, kind: JobKind) -> HttpResponse {
    let (job, rx) = ExecutionJob::new(kind);
    let job_id = job.id;
    job_queue.push(job).await;
    log::debug!("Sent job {job_id} to queue");

    match rx.await {
        Ok(result) => {
            log::info!("Received result of job {job_id}: success={}", result.success);
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            log::error!("Failed to receive result of job {job_id}: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            })
        }
    }
}
