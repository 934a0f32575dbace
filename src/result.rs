//! Turns compiler and runtime outcomes into the notebook output records.
//!
//! Records follow the Jupyter output shape (`output_type` tagged), which the
//! presentation layer renders as-is.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::sandbox::{CompilationOutcome, ExecutionOutcome};

pub const COMPILATION_ERROR: &str = "CompilationError";
pub const TIMEOUT_ERROR: &str = "TimeoutError";
pub const RUNTIME_FAILURE: &str = "RuntimeFailure";
pub const SYSTEM_ERROR: &str = "SystemError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputRecord {
    Stream {
        name: StreamName,
        text: String,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    ExecuteResult {
        text: String,
    },
}

impl OutputRecord {
    fn error(ename: &str, evalue: impl Into<String>, traceback: Vec<String>) -> Self {
        Self::Error {
            ename: ename.to_string(),
            evalue: evalue.into(),
            traceback,
        }
    }

    fn stream(name: StreamName, text: &str) -> Self {
        Self::Stream {
            name,
            text: text.to_string(),
        }
    }

    /// `ename` of an error record
    pub fn error_name(&self) -> Option<&str> {
        match self {
            Self::Error { ename, .. } => Some(ename),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub outputs: Vec<OutputRecord>,
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock seconds spent on the whole request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl ExecutionResult {
    fn succeeded(outputs: Vec<OutputRecord>, execution_count: u64) -> Self {
        Self {
            success: true,
            outputs,
            execution_count,
            error_message: None,
            execution_time: None,
        }
    }

    fn failed(outputs: Vec<OutputRecord>, message: String, execution_count: u64) -> Self {
        Self {
            success: false,
            outputs,
            execution_count,
            error_message: Some(message),
            execution_time: None,
        }
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = Some(elapsed.as_secs_f64());
        self
    }
}

/// Maps the outcomes of one request to its result.
///
/// A failed compilation short-circuits: the execution outcome is ignored.
pub fn assemble(
    compilation: Option<&CompilationOutcome>,
    execution: Option<&ExecutionOutcome>,
    execution_count: u64,
) -> ExecutionResult {
    if let Some(compilation) = compilation.filter(|c| !c.succeeded) {
        return compile_failure(compilation, execution_count);
    }

    let Some(execution) = execution else {
        return system_failure("program was compiled but never run", execution_count);
    };

    let mut outputs = Vec::new();
    if !execution.stdout.is_empty() {
        outputs.push(OutputRecord::stream(StreamName::Stdout, &execution.stdout));
    }

    if execution.timed_out {
        let message = format!(
            "Execution timed out after {:.1}s",
            execution.duration.as_secs_f64()
        );
        outputs.push(OutputRecord::error(
            TIMEOUT_ERROR,
            &message,
            stderr_trace(&execution.stderr),
        ));
        return ExecutionResult::failed(outputs, message, execution_count);
    }

    if !execution.succeeded() {
        let message = match execution.exit_code {
            Some(code) => format!("Process exited with code {code}"),
            None => "Process was terminated by a signal".to_string(),
        };
        outputs.push(OutputRecord::error(
            RUNTIME_FAILURE,
            &message,
            stderr_trace(&execution.stderr),
        ));
        return ExecutionResult::failed(outputs, message, execution_count);
    }

    if !execution.stderr.is_empty() {
        outputs.push(OutputRecord::stream(StreamName::Stderr, &execution.stderr));
    }
    if outputs.is_empty() {
        outputs.push(OutputRecord::ExecuteResult {
            text: String::new(),
        });
    }
    ExecutionResult::succeeded(outputs, execution_count)
}

fn compile_failure(compilation: &CompilationOutcome, execution_count: u64) -> ExecutionResult {
    let trace = clean_diagnostics(&compilation.diagnostics);
    if compilation.timed_out {
        let message = format!(
            "Compilation timed out after {:.1}s",
            compilation.duration.as_secs_f64()
        );
        let record = OutputRecord::error(TIMEOUT_ERROR, &message, trace);
        return ExecutionResult::failed(vec![record], message, execution_count);
    }

    let record = OutputRecord::error(COMPILATION_ERROR, &compilation.diagnostics, trace);
    ExecutionResult::failed(vec![record], "Compilation failed".to_string(), execution_count)
}

/// Result for a request that failed before producing any outcome
pub fn failure(err: &EngineError, execution_count: u64) -> ExecutionResult {
    let message = err.to_string();
    let record = OutputRecord::error(err.kind(), &message, Vec::new());
    ExecutionResult::failed(vec![record], message, execution_count)
}

pub fn system_failure(message: &str, execution_count: u64) -> ExecutionResult {
    let record = OutputRecord::error(SYSTEM_ERROR, message, Vec::new());
    ExecutionResult::failed(vec![record], message.to_string(), execution_count)
}

/// Non-empty trimmed compiler lines, without a leading `error:`.
///
/// Lines reporting one of the usual beginner mistakes are followed by a
/// `hint:` line.
pub fn clean_diagnostics(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let line = line.strip_prefix("error:").map_or(line, str::trim_start);
        lines.push(line.to_string());
        if let Some(hint) = hint_for(line) {
            lines.push(format!("hint: {hint}"));
        }
    }
    lines
}

fn hint_for(line: &str) -> Option<&'static str> {
    let line = line.to_lowercase();
    // javac names the missing symbol on its own line after "cannot find symbol"
    if let Some(symbol) = line.strip_prefix("symbol:") {
        let symbol = symbol.trim_start();
        return Some(if symbol.starts_with("class") {
            "a class could not be found, check the import statements and package declarations"
        } else if symbol.starts_with("method") {
            "a method could not be found, check its name and parameters"
        } else {
            "a variable or identifier could not be found, check its spelling and declaration"
        });
    }

    if line.contains("package") && line.contains("does not exist") {
        Some("the package does not exist, check the package declarations of the cells")
    } else if line.contains("duplicate class") {
        Some("two classes share a name, rename one of them")
    } else if line.contains("illegal start of expression") {
        Some("invalid syntax, check braces { } and semicolons ;")
    } else if line.contains("incompatible types") {
        Some("the value does not match the variable type")
    } else if line.contains("unreachable statement") {
        Some("this code can never run, check for statements after a return")
    } else {
        None
    }
}

fn stderr_trace(stderr: &str) -> Vec<String> {
    stderr.lines().map(str::to_string).collect()
}
