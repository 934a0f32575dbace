mod compile;
mod process;
mod runtime;
mod workspace;

pub use compile::compile;
pub use process::SubprocessRunner;
pub use runtime::run;
pub use workspace::Workspace;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Bytes kept per output stream; the rest is dropped and marked
    pub output_limit: Option<usize>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            output_limit: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn output_limit(mut self, limit: Option<usize>) -> Self {
        self.output_limit = limit;
        self
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything observed about a finished (or killed) process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Launches external programs under a wall-clock budget.
///
/// Implementations must capture stdout and stderr separately and keep
/// whatever was written before a timeout. `Err` is reserved for failures to
/// launch or supervise the process at all.
pub trait ProcessRunner: Send + Sync {
    fn run_process<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<ProcessOutput>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationOutcome {
    pub succeeded: bool,
    /// Combined compiler output, stdout first
    pub diagnostics: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CompilationOutcome {
    pub fn from_output(output: &ProcessOutput) -> Self {
        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            succeeded: !output.timed_out && output.exit_code == Some(0),
            diagnostics,
            timed_out: output.timed_out,
            duration: output.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    pub fn from_output(output: &ProcessOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: output.duration,
            timed_out: output.timed_out,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}
