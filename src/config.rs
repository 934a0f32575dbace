use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "javanb", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Whether to flush the persisted cell groups
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Number of execution workers
    #[arg(long = "workers", short = 'w', default_value_t = 4)]
    pub workers: u8,
}

impl CliArgs {
    /// Load the configuration from the specified file, or the defaults
    pub fn to_config(&self) -> std::io::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub database: DatabaseConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub compile_timeout: Millisecond,
    pub run_timeout: Millisecond,
    /// Parent of the per-request workspaces; the system temp dir when unset
    pub workspace_root: Option<PathBuf>,
    pub compiler: String,
    pub runtime: String,
    pub compiler_args: Vec<String>,
    pub runtime_args: Vec<String>,
    /// Bytes of stdout and of stderr kept per process, `null` for no limit
    pub output_limit: Option<usize>,
}

const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compile_timeout: Millisecond(30_000),
            run_timeout: Millisecond(30_000),
            workspace_root: None,
            compiler: "javac".to_string(),
            runtime: "java".to_string(),
            compiler_args: Vec::new(),
            runtime_args: Vec::new(),
            output_limit: Some(DEFAULT_OUTPUT_LIMIT),
        }
    }
}

impl EngineConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Millisecond(pub u64);

impl From<Millisecond> for Duration {
    fn from(value: Millisecond) -> Self {
        Duration::from_millis(value.0)
    }
}
