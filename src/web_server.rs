use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::queue::JobQueue;
use crate::routes::{
    connect_handler, disconnect_handler, execute_cells_handler, execute_group_handler,
    execute_handler, health_handler, json_error_handler, list_groups_handler, query_error_handler,
    validate_handler,
};

/// Registers every route; shared by the server and the integration tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(execute_handler)
        .service(execute_cells_handler)
        .service(execute_group_handler)
        .service(validate_handler)
        .service(connect_handler)
        .service(disconnect_handler)
        .service(list_groups_handler)
        .service(health_handler);
}

pub fn build_server(
    server_config: ServerConfig,
    engine: Arc<Engine>,
    job_queue: Arc<JobQueue>,
    db_pool: SqlitePool,
) -> std::io::Result<Server> {
    let engine = web::Data::from(engine);
    let job_queue = web::Data::from(job_queue);
    let db_pool = web::Data::new(db_pool);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(job_queue.clone())
            .app_data(db_pool.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
