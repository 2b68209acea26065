//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// rc - live-update restart coordinator
#[derive(Parser, Debug)]
#[command(name = "rc")]
#[command(author, version, about = "Coordinate live-update restarts", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay a YAML scenario against a coordinator with a hand-released executor
    Simulate {
        /// Scenario file
        #[arg(required = true)]
        scenario: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect or edit pending update records
    Pending {
        #[command(subcommand)]
        command: PendingCommand,
    },

    /// Restart the application through the coordinator
    Restart {
        /// Only restart if an update is pending for the prefix
        #[arg(long)]
        only_if_pending: bool,

        /// Path prefix selecting the update bundle
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
}

/// Pending update subcommands
#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// Record a pending update
    Set {
        /// Update package hash
        #[arg(required = true)]
        hash: String,

        /// Path prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Mark the update as already loading
        #[arg(long)]
        loading: bool,
    },

    /// Show the pending update for a prefix
    Show {
        /// Path prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Advance the pending update after a relaunch (mark loading, or roll back)
    Init {
        /// Path prefix (defaults to RC_PATH_PREFIX set by the relauncher)
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Report that the running update loaded successfully
    Ready {
        /// Path prefix (defaults to RC_PATH_PREFIX set by the relauncher)
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Remove the pending update for a prefix
    Clear {
        /// Path prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("restartcoord")
        .join("logs")
        .join("rc.log")
}

/// Output format for reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
