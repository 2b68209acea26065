//! Error types for the coordinator and its executors

use thiserror::Error;

/// Errors raised by a restart executor
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn relaunch command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pending update store error: {0}")]
    Store(String),

    #[error("No relaunch command configured")]
    NotConfigured,

    #[error("Restart failed: {0}")]
    Failed(String),
}

/// Errors surfaced to callers of a [`crate::coordinator::CoordinatorHandle`]
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("Coordinator dropped the reply")]
    Dropped,

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl CoordinatorError {
    /// Check if the coordinator task is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, CoordinatorError::ChannelClosed | CoordinatorError::Dropped)
    }
}
