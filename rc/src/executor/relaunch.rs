//! Process relaunch hand-off

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::RelaunchConfig;
use crate::error::ExecutorError;

/// Environment variable carrying the path prefix to the relaunched process
pub const PATH_PREFIX_ENV: &str = "RC_PATH_PREFIX";

/// Starts the replacement process
pub trait Relaunch: Send + Sync {
    fn relaunch(&self, path_prefix: &str) -> Result<(), ExecutorError>;
}

/// Spawns the configured command, detached, and leaves the exit to the caller
#[derive(Debug, Clone, Default)]
pub struct ProcessRelauncher {
    command: Option<String>,
    args: Vec<String>,
}

impl ProcessRelauncher {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
        }
    }

    pub fn from_config(config: &RelaunchConfig) -> Self {
        debug!(?config, "ProcessRelauncher::from_config: called");
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Relaunch for ProcessRelauncher {
    fn relaunch(&self, path_prefix: &str) -> Result<(), ExecutorError> {
        let command = self.command.as_deref().ok_or(ExecutorError::NotConfigured)?;
        debug!(%command, args = ?self.args, %path_prefix, "ProcessRelauncher::relaunch: called");

        let child = Command::new(command)
            .args(&self.args)
            .env(PATH_PREFIX_ENV, path_prefix)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: command.to_string(),
                source,
            })?;

        info!(pid = child.id(), %command, "Spawned replacement process");
        Ok(())
    }
}
