use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use javanb::config::{CliArgs, Config};
use javanb::database as db;
use javanb::engine::Engine;
use javanb::queue::JobQueue;
use javanb::sandbox::SubprocessRunner;
use javanb::web_server::build_server;
use javanb::worker::worker;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_workers = cli.workers;
    if n_workers == 0 {
        anyhow::bail!("The number of workers must not be 0");
    }

    let Config {
        server: server_config,
        engine: engine_config,
        database: database_config,
    } = cli.to_config().context("Failed to load configuration")?;

    let db_path = match database_config.path {
        Some(path) => path,
        None => db::get_db_path().context("Failed to locate the data directory")?,
    };
    if cli.flush_data {
        db::remove_db(&db_path);
    }
    let db_pool = db::init_db(&db_path)
        .await
        .context("Failed to initialize database")?;

    let engine = Arc::new(Engine::new(engine_config, Arc::new(SubprocessRunner::new())));

    let scopes = db::load_scopes(&db_pool)
        .await
        .context("Failed to load cell groups")?;
    log::info!("Restoring cell groups of {} notebook(s)", scopes.len());
    for (notebook, snapshot) in scopes {
        engine.registry().restore(&notebook, snapshot);
    }

    if engine.toolchain_available().await {
        log::info!("Java toolchain found: {}", engine.config().compiler);
    } else {
        log::warn!(
            "Java compiler `{}` is unavailable, executions will fail until it is installed",
            engine.config().compiler
        );
    }

    let job_queue = Arc::new(JobQueue::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_workers {
        workers.spawn(worker(
            i,
            engine.clone(),
            job_queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server(server_config, engine, job_queue, db_pool)
        .context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Stop accepting requests; in-flight ones finish first
    server_handle.stop(true).await;

    // 2. Broadcast shutdown signal to workers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    // 3. Wait until every worker terminates
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(Err(e)) => log::error!("Worker finished with error: {e:#}"),
            Err(e) if e.is_panic() => log::error!("Worker handle panicked: {:?}", e),
            Err(e) => log::error!("Worker handle finished with error: {:?}", e),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
