use crate::config::EngineConfig;
use crate::error::EngineError;

use super::{ExecutionOutcome, ProcessRunner, ProcessSpec, Workspace};

pub fn run_command(config: &EngineConfig, workspace: &Workspace, main_class: &str) -> ProcessSpec {
    ProcessSpec::new(&config.runtime)
        .args(config.runtime_args.iter().cloned())
        .arg("-cp")
        .arg(workspace.root().to_string_lossy())
        .arg(main_class)
        .current_dir(workspace.root())
        .output_limit(config.output_limit)
}

/// Launches `main_class` from the compiled workspace
pub async fn run(
    runner: &dyn ProcessRunner,
    config: &EngineConfig,
    workspace: &Workspace,
    main_class: &str,
) -> Result<ExecutionOutcome, EngineError> {
    let spec = run_command(config, workspace, main_class);
    let output = runner
        .run_process(&spec, config.run_timeout.into())
        .await
        .map_err(|e| EngineError::Launch {
            program: config.runtime.clone(),
            reason: format!("{e:#}"),
        })?;

    let outcome = ExecutionOutcome::from_output(&output);
    log::debug!(
        "Ran {main_class} in {:?}: exit={:?} timed_out={}",
        outcome.duration,
        outcome.exit_code,
        outcome.timed_out
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    #[test]
    fn test_runtime_args_precede_class_path() {
        let parent = tempfile::tempdir().unwrap();
        let units = vec![classify("a", "int x = 1;").unwrap()];
        let workspace = Workspace::materialize(parent.path(), &units).unwrap();
        let config = EngineConfig {
            runtime_args: vec!["-Xmx64m".to_string()],
            ..Default::default()
        };

        let spec = run_command(&config, &workspace, "demo.Main");
        let root = workspace.root().to_string_lossy().into_owned();
        assert_eq!(spec.program, "java");
        assert_eq!(
            spec.args,
            vec!["-Xmx64m".to_string(), "-cp".to_string(), root, "demo.Main".to_string()]
        );
    }
}
