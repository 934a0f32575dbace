//! End-to-end runs against a real JDK. Each test returns early when `javac`
//! is not on the PATH.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use javanb::config::{EngineConfig, Millisecond};
use javanb::engine::{CellExecution, Engine};
use javanb::result::{OutputRecord, StreamName};
use javanb::sandbox::SubprocessRunner;

async fn engine_with(config: EngineConfig) -> Option<(Engine, TempDir)> {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        workspace_root: Some(dir.path().to_path_buf()),
        ..config
    };
    let engine = Engine::new(config, Arc::new(SubprocessRunner::new()));
    if !engine.toolchain_available().await {
        eprintln!("javac not available, skipping");
        return None;
    }
    Some((engine, dir))
}

async fn engine() -> Option<(Engine, TempDir)> {
    engine_with(EngineConfig::default()).await
}

fn cell(code: &str) -> CellExecution {
    CellExecution {
        code: code.to_string(),
        ..Default::default()
    }
}

fn stream(name: StreamName, text: &str) -> OutputRecord {
    OutputRecord::Stream {
        name,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_bare_statement_prints_hello() {
    let Some((engine, dir)) = engine().await else { return };

    let result = engine.execute(cell("System.out.println(\"Hello\");")).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.outputs, vec![stream(StreamName::Stdout, "Hello\n")]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_imports_are_hoisted_out_of_the_wrapper() {
    let Some((engine, _dir)) = engine().await else { return };

    let result = engine
        .execute(cell(
            "import java.util.List;\n\nList<Integer> xs = List.of(3, 4);\nSystem.out.println(xs.get(0) + xs.get(1));",
        ))
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.outputs, vec![stream(StreamName::Stdout, "7\n")]);
}

#[tokio::test]
async fn test_group_across_packages() {
    let Some((engine, _dir)) = engine().await else { return };
    engine.connect("nb", "util", "app").unwrap();

    let result = engine
        .execute(CellExecution {
            code: "package app;\nimport util.Greeter;\npublic class App {\n    public static void main(String[] args) {\n        System.out.println(Greeter.greet(\"Ada\"));\n    }\n}".to_string(),
            cell_id: Some("app".to_string()),
            notebook: Some("nb".to_string()),
            cells: HashMap::from([(
                "util".to_string(),
                "package util;\npublic class Greeter {\n    public static String greet(String name) { return \"Hi, \" + name; }\n}".to_string(),
            )]),
            execution_count: None,
        })
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.outputs, vec![stream(StreamName::Stdout, "Hi, Ada\n")]);
}

#[tokio::test]
async fn test_compile_error_is_reported() {
    let Some((engine, _dir)) = engine().await else { return };

    let result = engine.execute(cell("int x = \"not a number\";")).await;

    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("Compilation failed"));
    let OutputRecord::Error {
        ename, traceback, ..
    } = &result.outputs[0]
    else {
        panic!("expected an error record, got {:?}", result.outputs);
    };
    assert_eq!(ename, "CompilationError");
    assert!(traceback.iter().any(|l| l.contains("incompatible types")));
    // files are named relative to the workspace
    assert!(traceback[0].starts_with("Main.java:"), "{traceback:?}");
    assert!(traceback.iter().all(|l| !l.contains("javanb-")));
}

#[tokio::test]
async fn test_package_private_class_is_rejected_before_compiling() {
    let Some((engine, dir)) = engine().await else { return };

    let result = engine
        .execute(cell(
            "class Hello {\n    public static void main(String[] args) {\n        System.out.println(\"hi\");\n    }\n}",
        ))
        .await;

    assert!(!result.success);
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].error_name(), Some("ClassificationError"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_runtime_exception_keeps_stdout() {
    let Some((engine, _dir)) = engine().await else { return };

    let result = engine
        .execute(cell(
            "System.out.println(\"before\");\nthrow new IllegalStateException(\"boom\");",
        ))
        .await;

    assert!(!result.success);
    assert_eq!(result.outputs[0], stream(StreamName::Stdout, "before\n"));
    let OutputRecord::Error {
        ename, traceback, ..
    } = &result.outputs[1]
    else {
        panic!("expected an error record, got {:?}", result.outputs);
    };
    assert_eq!(ename, "RuntimeFailure");
    assert!(traceback.iter().any(|l| l.contains("IllegalStateException: boom")));
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let config = EngineConfig {
        run_timeout: Millisecond(2000),
        ..Default::default()
    };
    let Some((engine, _dir)) = engine_with(config).await else { return };

    let start = Instant::now();
    let result = engine
        .execute(cell("System.out.println(\"spinning\");\nSystem.out.flush();\nwhile (true) {}"))
        .await;

    assert!(!result.success);
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(result.outputs[0], stream(StreamName::Stdout, "spinning\n"));
    assert_eq!(result.outputs[1].error_name(), Some("TimeoutError"));
}
