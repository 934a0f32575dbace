use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use assert_json_diff::{assert_json_eq, assert_json_include};
use parking_lot::Mutex;
use serde_json::json;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use javanb::config::EngineConfig;
use javanb::database as db;
use javanb::engine::Engine;
use javanb::queue::JobQueue;
use javanb::sandbox::{BoxFuture, ProcessOutput, ProcessRunner, ProcessSpec};
use javanb::web_server::configure;
use javanb::worker::worker;

// Mock toolchain: every compile succeeds, every run prints the class it was asked to start
#[derive(Default)]
struct MockToolchain {
    calls: Mutex<Vec<ProcessSpec>>,
}

impl ProcessRunner for MockToolchain {
    fn run_process<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        _timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<ProcessOutput>> {
        Box::pin(async move {
            self.calls.lock().push(spec.clone());
            let stdout = match spec.program.as_str() {
                "java" => format!("ran {}\n", spec.args.last().cloned().unwrap_or_default()),
                _ => String::new(),
            };
            Ok(ProcessOutput {
                stdout: stdout.into_bytes(),
                exit_code: Some(0),
                ..Default::default()
            })
        })
    }
}

struct TestContext {
    engine: Arc<Engine>,
    queue: Arc<JobQueue>,
    pool: SqlitePool,
    token: CancellationToken,
    _dir: TempDir,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn setup() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::init_db(dir.path().join("test.sqlite3")).await.unwrap();
    let config = EngineConfig {
        workspace_root: Some(dir.path().join("workspaces")),
        ..Default::default()
    };
    let engine = Arc::new(Engine::new(config, Arc::new(MockToolchain::default())));
    let queue = Arc::new(JobQueue::new());
    let token = CancellationToken::new();

    tokio::spawn(worker(1, engine.clone(), queue.clone(), token.clone()));

    TestContext {
        engine,
        queue,
        pool,
        token,
        _dir: dir,
    }
}

macro_rules! init_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($ctx.engine.clone()))
                .app_data(web::Data::from($ctx.queue.clone()))
                .app_data(web::Data::new($ctx.pool.clone()))
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_execute_single_cell() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(json!({ "code": "System.out.println(\"Hello\");" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "success": true,
            "execution_count": 1,
            "outputs": [{ "output_type": "stream", "name": "stdout", "text": "ran Main\n" }]
        })
    );
}

#[actix_web::test]
async fn test_execute_classification_error() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(json!({ "code": "public class A {}\npublic class B {}", "execution_count": 7 }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], false);
    assert_eq!(body["execution_count"], 7);
    assert_eq!(body["outputs"][0]["output_type"], "error");
    assert_eq!(body["outputs"][0]["ename"], "ClassificationError");
}

#[actix_web::test]
async fn test_execute_cells_across_packages() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/execute/cells")
        .set_json(json!({
            "codes": [
                "package util;\npublic class Greeter { public static String hi() { return \"hi\"; } }",
                "package app;\nimport util.Greeter;\npublic class App { public static void main(String[] a) { System.out.println(Greeter.hi()); } }"
            ]
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["outputs"][0]["text"], "ran app.App\n");
}

#[actix_web::test]
async fn test_validate_multiple_public_types() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/validate")
        .set_json(json!({ "code": "public class A {}\npublic class B {}" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_json_eq!(
        body,
        json!({
            "valid": false,
            "class_name": null,
            "has_entry_point": false,
            "auto_wrap_applied": false,
            "errors": ["multiple public types"]
        })
    );
}

#[actix_web::test]
async fn test_group_lifecycle() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    // connect
    let req = test::TestRequest::post()
        .uri("/groups/connect")
        .set_json(json!({ "notebook": "nb", "cell_a": "lib", "cell_b": "main" }))
        .to_request();
    let group: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let group_id = group["group_id"].as_str().unwrap().to_string();
    assert_eq!(group["cell_ids"], json!(["lib", "main"]));

    // persisted
    let stored = db::load_scopes(&ctx.pool).await.unwrap();
    assert_eq!(stored["nb"].groups[&group_id].cell_ids, vec!["lib", "main"]);

    // list
    let req = test::TestRequest::get().uri("/groups?notebook=nb").to_request();
    let groups: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(groups.as_array().unwrap().len(), 1);

    // executing a member runs the whole group
    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(json!({
            "code": "package p;\npublic class Runner { public static void main(String[] a) { System.out.println(Lib.NAME); } }",
            "cell_id": "main",
            "notebook": "nb",
            "cells": { "lib": "package p;\npublic class Lib { public static final String NAME = \"lib\"; }" }
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["outputs"][0]["text"], "ran p.Runner\n");

    // executing the group directly without all sources fails
    let req = test::TestRequest::post()
        .uri(&format!("/groups/{group_id}/execute"))
        .set_json(json!({ "notebook": "nb", "cells": { "lib": "package p;\npublic class Lib {}" } }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["outputs"][0]["ename"], "GroupError");

    // disconnect dissolves a two-cell group
    let req = test::TestRequest::post()
        .uri("/groups/disconnect")
        .set_json(json!({ "notebook": "nb", "cell_id": "main" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(body, json!({ "cell_id": "main", "group": null }));

    let stored = db::load_scopes(&ctx.pool).await.unwrap();
    assert!(stored["nb"].groups.is_empty());
    assert_eq!(stored["nb"].revision, 2);
}

#[actix_web::test]
async fn test_group_errors() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/groups/connect")
        .set_json(json!({ "notebook": "nb", "cell_a": "a", "cell_b": "a" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");

    ctx.engine.connect("nb", "a", "b").unwrap();
    ctx.engine.connect("nb", "c", "d").unwrap();
    let req = test::TestRequest::post()
        .uri("/groups/connect")
        .set_json(json!({ "notebook": "nb", "cell_a": "b", "cell_b": "c" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_STATE");

    let req = test::TestRequest::post()
        .uri("/groups/disconnect")
        .set_json(json!({ "notebook": "nb", "cell_id": "zzz" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri("/groups/group-00000000/execute")
        .set_json(json!({ "notebook": "nb" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_failed_save_keeps_the_registry_change() {
    let ctx = setup().await;
    let app = init_app!(ctx);
    ctx.pool.close().await;

    let req = test::TestRequest::post()
        .uri("/groups/connect")
        .set_json(json!({ "notebook": "nb", "cell_a": "a", "cell_b": "b" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "reason": "ERR_EXTERNAL", "code": 5 }));

    let groups = ctx.engine.list_groups("nb");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.values().next().unwrap().cell_ids, vec!["a", "b"]);
}

#[actix_web::test]
async fn test_malformed_body() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(json!({ "source": "missing code field" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_eq!(body, json!({ "reason": "ERR_INVALID_ARGUMENT", "code": 1 }));
}

#[actix_web::test]
async fn test_health() {
    let ctx = setup().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(
        body,
        json!({ "status": "ok", "toolchain_available": true, "queued_jobs": 0 })
    );
}
