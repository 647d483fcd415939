//! FeatureLoop - phased feature build loop
//!
//! CLI entry point for running and inspecting the loop.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use featureloop::cli::{Cli, Command, RunArgs};
use featureloop::config::Config;
use featureloop::domain::FeatureList;
use featureloop::exit_codes;
use featureloop::r#loop::{LoopEngine, LoopOutcome};
use featureloop::state::ResumeStore;
use featureloop::{CommandAgent, StdinUser};

fn setup_logging(level: tracing::Level) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("featureloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let log_file = fs::File::create(log_dir.join("fl.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

/// CLI flag, then config, then INFO
fn resolve_log_level(config: &Config) -> tracing::Level {
    config
        .log_level
        .as_deref()
        .and_then(|l| tracing::Level::from_str(l).ok())
        .unwrap_or(tracing::Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref(), cli.work_dir.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    setup_logging(resolve_log_level(&config)).context("Failed to setup logging")?;
    info!(
        "FeatureLoop loaded config: agent={}, work_dir={}",
        config.agent.command,
        config.paths.work_dir.display()
    );

    let code = match cli.command {
        Command::Run(args) => cmd_run(config, args).await?,
        Command::Select { feature } => cmd_select(&config, feature.as_deref())?,
        Command::Status => cmd_status(&config)?,
        Command::Reset => cmd_reset(&config)?,
    };

    if code != exit_codes::OK {
        std::process::exit(code);
    }
    Ok(())
}

/// Run the loop until it reaches an outcome
async fn cmd_run(mut config: Config, args: RunArgs) -> Result<i32> {
    args.apply_overrides(&mut config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            eprintln!("\n{}", "Interrupted, finishing up...".yellow());
            trigger.cancel();
        }
    });

    let agent = Arc::new(CommandAgent::new(&config.agent, config.paths.work_dir.clone()));
    let engine = LoopEngine::new(config, agent, Arc::new(StdinUser))
        .context("Failed to start feature loop")?
        .with_tagged(args.tags)
        .fresh(args.fresh);

    let outcome = engine.run(cancel).await.context("Feature loop failed")?;
    match &outcome {
        LoopOutcome::Completed => println!("{} {}", "Done:".green().bold(), outcome),
        LoopOutcome::Cancelled => println!("{} resume state saved to {}", "Cancelled:".yellow(), engine.store().path().display()),
        LoopOutcome::IterationsExhausted { iterations } => {
            println!("{} {}", "Stopped:".red().bold(), outcome);
            println!(
                "Iteration numbers carry over between runs. Continue with --max-iterations above {}, or run `fl reset` to start over.",
                iterations
            );
        }
        _ => println!("{} {}", "Stopped:".red().bold(), outcome),
    }
    Ok(exit_codes::for_outcome(&outcome))
}

/// Print the next eligible feature id
fn cmd_select(config: &Config, pinned: Option<&str>) -> Result<i32> {
    let features = FeatureList::load(&config.spec_path())?;
    let pinned = pinned.or(config.looping.feature.as_deref());

    if let Some(feature) = features.select_next(pinned) {
        println!("{}", feature.id);
        return Ok(exit_codes::OK);
    }
    if features.all_passing() {
        eprintln!("All features pass");
        return Ok(exit_codes::OK);
    }
    eprintln!("No eligible features; pending: {}", features.pending_ids().join(", "));
    Ok(exit_codes::NO_ELIGIBLE_FEATURES)
}

/// Show the resume state and feature progress
fn cmd_status(config: &Config) -> Result<i32> {
    let store = ResumeStore::new(config.state_dir());

    match store.read() {
        Ok(Some(state)) => {
            println!("{}", "Resume state".bold());
            println!("  {:<20} {}", "Session:", state.session_id);
            println!("  {:<20} {}", "Saved:", state.timestamp.to_rfc3339());
            println!(
                "  {:<20} {}",
                "Feature:",
                state.current_feature.as_deref().unwrap_or("-").cyan()
            );
            let phase = state.phase.map(|p| p.to_string()).unwrap_or_else(|| "single-shot".to_string());
            println!("  {:<20} {}", "Phase:", phase.cyan());
            println!("  {:<20} {}/{}", "Iteration:", state.iteration, state.total_iterations);
            println!("  {:<20} {}", "Re-plans:", state.validation_attempts);
            println!("  {:<20} {}", "Work dir:", state.work_dir.display());
        }
        Ok(None) => println!("No resume state in {}", config.state_dir().display()),
        Err(e) => println!("{} {:#}", "Resume state unreadable:".red(), e),
    }

    match FeatureList::load(&config.spec_path()) {
        Ok(features) => {
            let passing = features.features.iter().filter(|f| f.passes).count();
            println!("{:<22} {}/{} passing", "Features:", passing, features.features.len());
        }
        Err(e) => println!("{} {:#}", "Features unavailable:".red(), e),
    }
    Ok(exit_codes::OK)
}

/// Delete the resume state
fn cmd_reset(config: &Config) -> Result<i32> {
    let store = ResumeStore::new(config.state_dir());
    if store.clear()? {
        println!("Removed {}", store.path().display());
    } else {
        println!("No resume state to remove");
    }
    Ok(exit_codes::OK)
}
