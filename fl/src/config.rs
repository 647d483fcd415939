//! FeatureLoop configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main FeatureLoop configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External agent process
    pub agent: AgentConfig,

    /// File locations
    pub paths: PathsConfig,

    /// Iteration and retry budgets
    #[serde(rename = "loop")]
    pub looping: LoopConfig,

    /// Parallel executor limits
    pub executor: ExecutorConfig,

    /// Context size discipline
    pub context: ContextConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Project-local config file name, looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = ".featureloop.yml";

impl Config {
    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first of
    /// `<work_dir>/.featureloop.yml` and `~/.config/featureloop/featureloop.yml`
    /// that parses wins, and defaults apply when neither does. `work_dir` is the
    /// `-C` directory when given, else the current directory.
    pub fn load(explicit: Option<&Path>, work_dir: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path).with_context(|| format!("Failed to load config from {}", path.display()));
        }

        let local = work_dir.unwrap_or(Path::new(".")).join(LOCAL_CONFIG_FILE);
        let user = dirs::config_dir().map(|dir| dir.join("featureloop").join("featureloop.yml"));
        for path in std::iter::once(local).chain(user).filter(|p| p.is_file()) {
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping config file: {:#}", e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Config::load_from_file: called");
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Resolve a configured path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.work_dir.join(path)
        }
    }

    pub fn spec_path(&self) -> PathBuf {
        self.resolve(&self.paths.spec)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.resolve(&self.paths.progress)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.resolve(&self.paths.state_dir)
    }
}

/// External agent process configuration
///
/// The prompt is written to the process's stdin; stdout is the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Executable to spawn
    pub command: String,

    /// Arguments passed on every invocation
    pub args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["-p".to_string()],
        }
    }
}

/// File locations, relative paths resolve against `work-dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(rename = "work-dir")]
    pub work_dir: PathBuf,

    /// Feature specification file
    pub spec: PathBuf,

    /// Append-only progress log
    pub progress: PathBuf,

    /// Tool-state subdirectory holding the resume file
    #[serde(rename = "state-dir")]
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            spec: PathBuf::from("features.json"),
            progress: PathBuf::from("progress.md"),
            state_dir: PathBuf::from(".featureloop"),
        }
    }
}

/// Iteration and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Hard cap on iterations for one run
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Rejected plans allowed per feature before giving up
    #[serde(rename = "max-validation-attempts")]
    pub max_validation_attempts: u32,

    /// Planning/Validating/Executing cycle; false runs single-shot iterations
    pub phased: bool,

    /// Pin a feature id instead of priority selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_validation_attempts: 3,
            phased: true,
            feature: None,
        }
    }
}

/// Per-category concurrency limits for the parallel executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Concurrent read_files sub-actions
    #[serde(rename = "max-reads")]
    pub max_reads: usize,

    /// Concurrent run_command sub-actions
    #[serde(rename = "max-commands")]
    pub max_commands: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_reads: 10,
            max_commands: 3,
        }
    }
}

/// Size discipline for iteration contexts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Most recent progress-log lines kept
    #[serde(rename = "progress-tail-lines")]
    pub progress_tail_lines: usize,

    /// Specs larger than this are referenced instead of inlined
    #[serde(rename = "spec-inline-max-bytes")]
    pub spec_inline_max_bytes: usize,

    /// Include a working-tree listing
    #[serde(rename = "include-listing")]
    pub include_listing: bool,

    #[serde(rename = "listing-max-entries")]
    pub listing_max_entries: usize,

    /// Per tagged file
    #[serde(rename = "max-file-bytes")]
    pub max_file_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            progress_tail_lines: 40,
            spec_inline_max_bytes: 16 * 1024,
            include_listing: true,
            listing_max_entries: 200,
            max_file_bytes: 64 * 1024,
        }
    }
}
