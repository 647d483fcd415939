//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

/// FeatureLoop - phased feature build loop around an external agent
#[derive(Debug, Parser)]
#[command(
    name = "fl",
    about = "Drive an external agent through a feature list, one fresh-context iteration at a time",
    version,
    after_help = "Logs are written to: ~/.local/share/featureloop/logs/fl.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Working directory (overrides paths.work-dir)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Feature specification file (overrides paths.spec)
    #[arg(long, global = true, value_name = "FILE")]
    pub spec: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the feature loop
    Run(RunArgs),

    /// Print the id of the next eligible feature
    Select {
        /// Pin a feature id instead of priority selection
        #[arg(long)]
        feature: Option<String>,
    },

    /// Show the persisted resume state
    Status,

    /// Delete the persisted resume state
    Reset,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Progress log (overrides paths.progress)
    #[arg(long, value_name = "FILE")]
    pub progress: Option<PathBuf>,

    /// Work on this feature only
    #[arg(long)]
    pub feature: Option<String>,

    /// Maximum iterations
    #[arg(short, long)]
    pub max_iterations: Option<u32>,

    /// Maximum re-plans per feature
    #[arg(long)]
    pub max_validation_attempts: Option<u32>,

    /// Ignore any persisted resume state
    #[arg(long)]
    pub fresh: bool,

    /// Single-shot iterations without Planning/Validating/Executing
    #[arg(long)]
    pub single_shot: bool,

    /// Include a file in the first iteration's context
    #[arg(short, long = "tag", value_name = "FILE")]
    pub tags: Vec<PathBuf>,
}

impl Cli {
    /// Apply global flags on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(work_dir) = &self.work_dir {
            config.paths.work_dir = work_dir.clone();
        }
        if let Some(spec) = &self.spec {
            config.paths.spec = spec.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
    }
}

impl RunArgs {
    /// Apply `run` flags on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(progress) = &self.progress {
            config.paths.progress = progress.clone();
        }
        if let Some(feature) = &self.feature {
            config.looping.feature = Some(feature.clone());
        }
        if let Some(max) = self.max_iterations {
            config.looping.max_iterations = max;
        }
        if let Some(max) = self.max_validation_attempts {
            config.looping.max_validation_attempts = max;
        }
        if self.single_shot {
            config.looping.phased = false;
        }
    }
}
