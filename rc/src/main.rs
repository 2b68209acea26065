//! rc - live-update restart coordinator
//!
//! CLI entry point for simulating coordinator scenarios, managing pending
//! update records and performing a coordinated restart.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use restartcoord::cli::{Cli, Command, OutputFormat, PendingCommand, get_log_path};
use restartcoord::config::Config;
use restartcoord::coordinator::{Coordinator, RestartOutcome};
use restartcoord::executor::{PATH_PREFIX_ENV, PendingUpdateExecutor, ProcessRelauncher};
use restartcoord::pending::{AfterRestart, PendingUpdateStore};
use restartcoord::simulation::{Report, Scenario};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    config.validate()?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate { scenario, format } => cmd_simulate(&config, &scenario, format).await,
        Command::Pending { command } => cmd_pending(&config, command).await,
        Command::Restart { only_if_pending, prefix } => cmd_restart(&config, only_if_pending, prefix).await,
    }
}

async fn cmd_simulate(config: &Config, path: &std::path::Path, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), %format, "cmd_simulate: called");
    let scenario = Scenario::load(path).await?;
    let report = scenario.run(config.coordinator.clone()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &Report) {
    for line in &report.log {
        println!("{}", line);
    }

    println!();
    println!("{}", "Executor invocations:".bold());
    if report.invocations.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (i, call) in report.invocations.iter().enumerate() {
        println!(
            "  {}. only-if-update-pending={} path-prefix={:?}",
            i + 1,
            call.only_if_update_pending,
            call.path_prefix
        );
    }

    if !report.outcomes.is_empty() {
        println!("{}", "Outcomes:".bold());
        for outcome in &report.outcomes {
            println!("  {}", outcome);
        }
    }

    let status = &report.final_status;
    println!("{}", "Final status:".bold());
    println!("  allowed:     {}", status.restarts_allowed);
    println!("  in progress: {}", status.restart_in_progress);
    println!("  restarted:   {}", status.restarted);
    println!("  pending:     {}", status.pending.len());
    println!("  last prefix: {:?}", status.last_path_prefix);
}

async fn cmd_pending(config: &Config, command: PendingCommand) -> Result<()> {
    let store = PendingUpdateStore::open(&config.store_path);
    debug!(path = %store.path().display(), ?command, "cmd_pending: called");

    match command {
        PendingCommand::Set { hash, prefix, loading } => {
            store.save(&hash, loading, &prefix).await?;
            println!("{} Pending update {} for prefix {:?}", "✓".green(), hash.cyan(), prefix);
        }
        PendingCommand::Show { prefix } => match store.get(&prefix).await? {
            Some(update) => {
                println!("hash:       {}", update.hash);
                println!("is-loading: {}", update.is_loading);
                println!("pending:    {}", store.is_pending(None, &prefix).await?);
            }
            None => println!("No pending update for prefix {:?}", prefix),
        },
        PendingCommand::Init { prefix } => {
            let prefix = relaunched_prefix(prefix);
            match store.initialize_after_restart(&prefix).await? {
                AfterRestart::NoPendingUpdate => println!("No pending update for prefix {:?}", prefix),
                AfterRestart::FirstRun { hash } => {
                    println!("{} Running update {} for the first time", "✓".green(), hash.cyan())
                }
                AfterRestart::RolledBack { hash } => {
                    println!("{} Update {} never finished loading; rolled back", "✗".red(), hash.cyan())
                }
            }
        }
        PendingCommand::Ready { prefix } => {
            let prefix = relaunched_prefix(prefix);
            if store.mark_ready(&prefix).await? {
                println!("{} Update ready for prefix {:?}", "✓".green(), prefix);
            } else {
                println!("No pending update for prefix {:?}", prefix);
            }
        }
        PendingCommand::Clear { prefix } => {
            if store.remove(&prefix).await? {
                println!("{} Cleared pending update for prefix {:?}", "✓".green(), prefix);
            } else {
                println!("No pending update for prefix {:?}", prefix);
            }
        }
    }
    Ok(())
}

/// Prefix from the command line, else the one the relauncher exported
fn relaunched_prefix(prefix: Option<String>) -> String {
    prefix
        .or_else(|| std::env::var(PATH_PREFIX_ENV).ok())
        .unwrap_or_default()
}

async fn cmd_restart(config: &Config, only_if_pending: bool, prefix: String) -> Result<()> {
    debug!(only_if_pending, %prefix, "cmd_restart: called");
    let store = PendingUpdateStore::open(&config.store_path);
    let executor = PendingUpdateExecutor::new(store, ProcessRelauncher::from_config(&config.relaunch));
    let (handle, task) = Coordinator::spawn(config.coordinator.clone(), Arc::new(executor));

    let outcome = handle.request_restart(only_if_pending, prefix).await;
    handle.shutdown().await?;
    task.await.context("Coordinator task panicked")?;

    match outcome? {
        RestartOutcome::Restarting => println!("{} Relaunched application", "✓".green()),
        RestartOutcome::NotRestarted => println!("No pending update; not restarting"),
        RestartOutcome::Queued(reason) => println!("Restart queued: {:?}", reason),
    }
    Ok(())
}
