use crate::config::EngineConfig;
use crate::error::EngineError;

use super::{CompilationOutcome, ProcessRunner, ProcessSpec, Workspace};

/// Builds the compiler invocation for every source in the workspace.
///
/// Classes are written next to their sources and the workspace doubles as
/// class path and source path, so units can reference each other in any order.
/// Everything is addressed relative to the workspace root, which is also the
/// working directory, so diagnostics name files by their package path.
pub fn compile_command(config: &EngineConfig, workspace: &Workspace) -> ProcessSpec {
    ProcessSpec::new(&config.compiler)
        .args(["-d", ".", "-cp", ".", "-sourcepath", "."])
        .args(["-encoding", "UTF-8"])
        .args(config.compiler_args.iter().cloned())
        .args(workspace.relative_source_files().map(|f| f.to_string_lossy().into_owned()))
        .current_dir(workspace.root())
        .output_limit(config.output_limit)
}

pub async fn compile(
    runner: &dyn ProcessRunner,
    config: &EngineConfig,
    workspace: &Workspace,
) -> Result<CompilationOutcome, EngineError> {
    let spec = compile_command(config, workspace);
    let output = runner
        .run_process(&spec, config.compile_timeout.into())
        .await
        .map_err(|e| EngineError::Launch {
            program: config.compiler.clone(),
            reason: format!("{e:#}"),
        })?;

    let outcome = CompilationOutcome::from_output(&output);
    log::debug!(
        "Compiled {} file(s) in {:?}: succeeded={} timed_out={}",
        workspace.source_files().len(),
        outcome.duration,
        outcome.succeeded,
        outcome.timed_out
    );
    Ok(outcome)
}
