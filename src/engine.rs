mod stage;

pub use stage::{RequestTracker, Stage};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::classifier::{self, ExecutionRequest, SourceUnit, ValidationReport};
use crate::config::EngineConfig;
use crate::error::{EngineError, GroupError};
use crate::groups::{CellGroup, CellGroupRegistry, ExecutionGate};
use crate::result::{self, ExecutionResult};
use crate::sandbox::{self, ProcessRunner, ProcessSpec, Workspace};

const TOOLCHAIN_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Request to execute one cell
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CellExecution {
    pub code: String,
    pub cell_id: Option<String>,
    /// Scope the cell's group membership is looked up in
    pub notebook: Option<String>,
    /// Sources of the other cells, needed when this cell is grouped
    #[serde(default)]
    pub cells: HashMap<String, String>,
    pub execution_count: Option<u64>,
}

/// Orchestrates classification, materialization, compilation and execution
pub struct Engine {
    config: EngineConfig,
    runner: Arc<dyn ProcessRunner>,
    registry: CellGroupRegistry,
    gate: ExecutionGate,
    execution_count: AtomicU64,
}

impl Engine {
    pub fn new(config: EngineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            registry: CellGroupRegistry::new(),
            gate: ExecutionGate::new(),
            execution_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CellGroupRegistry {
        &self.registry
    }

    /// A supplied count is used as-is and becomes the new session counter
    pub fn next_execution_count(&self, requested: Option<u64>) -> u64 {
        match requested {
            Some(count) => {
                self.execution_count.store(count, Ordering::SeqCst);
                count
            }
            None => self.execution_count.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Executes a cell, or the whole group it belongs to
    pub async fn execute(&self, request: CellExecution) -> ExecutionResult {
        let CellExecution {
            code,
            cell_id,
            notebook,
            mut cells,
            execution_count,
        } = request;
        let count = self.next_execution_count(execution_count);

        if let (Some(notebook), Some(cell_id)) = (&notebook, &cell_id)
            && let Some(group) = self.registry.group_for(notebook, cell_id)
        {
            log::info!("Cell {cell_id} belongs to {}, executing the group", group.group_id);
            cells.insert(cell_id.clone(), code);
            return self.run_group(&group, &cells, count).await;
        }

        let id = cell_id.unwrap_or_else(|| "cell".to_string());
        self.run_sources(vec![(id, code)], count).await
    }

    pub async fn execute_group(
        &self,
        notebook: &str,
        group_id: &str,
        cells: &HashMap<String, String>,
        execution_count: Option<u64>,
    ) -> ExecutionResult {
        let count = self.next_execution_count(execution_count);
        match self.registry.group(notebook, group_id) {
            Some(group) => self.run_group(&group, cells, count).await,
            None => result::failure(&GroupError::UnknownGroup(group_id.to_string()).into(), count),
        }
    }

    /// Executes several snippets as one program, without any registry lookup
    pub async fn execute_cells(&self, codes: Vec<String>, execution_count: Option<u64>) -> ExecutionResult {
        let count = self.next_execution_count(execution_count);
        let sources = codes
            .into_iter()
            .enumerate()
            .map(|(i, code)| (format!("cell-{}", i + 1), code))
            .collect();
        self.run_sources(sources, count).await
    }

    async fn run_group(
        &self,
        group: &CellGroup,
        cells: &HashMap<String, String>,
        count: u64,
    ) -> ExecutionResult {
        let _permit = match self.gate.try_acquire(&group.notebook_scope, &group.group_id) {
            Ok(permit) => permit,
            Err(e) => return result::failure(&e.into(), count),
        };

        let mut sources = Vec::with_capacity(group.cell_ids.len());
        for cell_id in &group.cell_ids {
            let Some(code) = cells.get(cell_id) else {
                return result::failure(&GroupError::MissingCellSource(cell_id.clone()).into(), count);
            };
            sources.push((cell_id.clone(), code.clone()));
        }
        self.run_sources(sources, count).await
    }

    /// Runs the full pipeline over `(cell id, source)` pairs in order
    pub async fn run_sources(&self, sources: Vec<(String, String)>, count: u64) -> ExecutionResult {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut tracker = RequestTracker::new(request_id);
        log::info!(
            "Request {} started with {} unit(s), execution count {count}",
            tracker.id(),
            sources.len()
        );

        let result = match self.run_pipeline(&sources, count, &mut tracker).await {
            Ok(result) => result,
            Err(e) => {
                log::info!("Request {} failed at {}: {e}", tracker.id(), tracker.stage());
                result::failure(&e, count)
            }
        };
        if !tracker.stage().is_terminal() {
            log::warn!(
                "Request {} ended in non-terminal stage {}",
                tracker.id(),
                tracker.stage()
            );
        }

        log::info!(
            "Request {} finished in {:?}: success={}",
            tracker.id(),
            tracker.elapsed(),
            result.success
        );
        result.with_execution_time(tracker.elapsed())
    }

    async fn run_pipeline(
        &self,
        sources: &[(String, String)],
        count: u64,
        tracker: &mut RequestTracker,
    ) -> Result<ExecutionResult, EngineError> {
        tracker.advance(Stage::Classifying);
        let request = classify_all(sources).inspect_err(|_| {
            tracker.advance(Stage::ClassificationFailed);
        })?;
        tracker.advance(Stage::Classified);

        tracker.advance(Stage::Materializing);
        let workspace = Workspace::materialize(&self.config.workspace_root(), &request.units)
            .inspect_err(|_| {
                tracker.advance(Stage::MaterializeFailed);
            })?;
        tracker.advance(Stage::Materialized);

        let result = self.compile_and_run(&request, &workspace, count, tracker).await;
        workspace.release();
        result
    }

    async fn compile_and_run(
        &self,
        request: &ExecutionRequest,
        workspace: &Workspace,
        count: u64,
        tracker: &mut RequestTracker,
    ) -> Result<ExecutionResult, EngineError> {
        tracker.advance(Stage::Compiling);
        let compilation = sandbox::compile(self.runner.as_ref(), &self.config, workspace)
            .await
            .inspect_err(|_| {
                tracker.advance(Stage::CompileFailed);
            })?;
        if !compilation.succeeded {
            tracker.advance(Stage::CompileFailed);
            return Ok(result::assemble(Some(&compilation), None, count));
        }
        tracker.advance(Stage::Compiled);

        let main_class = request
            .entry_unit()
            .and_then(|unit| workspace.fully_qualified_name(&unit.id))
            .ok_or(GroupError::NoEntryPoint)?;

        tracker.advance(Stage::Running);
        let execution = sandbox::run(self.runner.as_ref(), &self.config, workspace, main_class)
            .await
            .inspect_err(|_| {
                tracker.advance(Stage::RuntimeFailed);
            })?;
        tracker.advance(if execution.timed_out {
            Stage::TimedOut
        } else if execution.succeeded() {
            Stage::Completed
        } else {
            Stage::RuntimeFailed
        });

        let result = result::assemble(Some(&compilation), Some(&execution), count);
        tracker.advance(Stage::Assembled);
        Ok(result)
    }

    pub fn validate(&self, code: &str) -> ValidationReport {
        classifier::validate(code)
    }

    pub fn connect(&self, notebook: &str, cell_a: &str, cell_b: &str) -> Result<CellGroup, GroupError> {
        self.registry.connect(notebook, cell_a, cell_b)
    }

    pub fn disconnect(&self, notebook: &str, cell: &str) -> Result<Option<CellGroup>, GroupError> {
        self.registry.disconnect(notebook, cell)
    }

    pub fn list_groups(&self, notebook: &str) -> BTreeMap<String, CellGroup> {
        self.registry.list_groups(notebook)
    }

    /// Whether the configured compiler can be launched
    pub async fn toolchain_available(&self) -> bool {
        let spec = ProcessSpec::new(&self.config.compiler).arg("-version");
        match self.runner.run_process(&spec, TOOLCHAIN_PROBE_TIMEOUT).await {
            Ok(output) if output.exit_code == Some(0) => true,
            Ok(output) => {
                log::warn!(
                    "`{spec}` exited with {:?}: {}",
                    output.exit_code,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                log::warn!("`{spec}` could not be launched: {e:#}");
                false
            }
        }
    }
}

fn classify_all(sources: &[(String, String)]) -> Result<ExecutionRequest, EngineError> {
    let units = sources
        .iter()
        .map(|(id, code)| {
            classifier::classify(id, code).map_err(|source| EngineError::Classification {
                cell: id.clone(),
                source,
            })
        })
        .collect::<Result<Vec<SourceUnit>, _>>()?;
    Ok(ExecutionRequest::compose(units)?)
}
