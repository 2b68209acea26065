//! Restart executors
//!
//! The coordinator only decides *when* to restart. An executor performs the
//! restart itself and reports whether the process is going down.

mod gated;
mod pending;
mod relaunch;

use async_trait::async_trait;

use crate::error::ExecutorError;

pub use gated::{GatedExecutor, Invocation};
pub use pending::PendingUpdateExecutor;
pub use relaunch::{PATH_PREFIX_ENV, ProcessRelauncher, Relaunch};

/// Performs the actual restart hand-off
#[async_trait]
pub trait RestartExecutor: Send + Sync {
    /// Restart the application
    ///
    /// Returns `Ok(true)` once the process has begun tearing down, `Ok(false)`
    /// when no restart happened (e.g. `only_if_update_pending` was set and
    /// nothing is pending).
    async fn execute_restart(&self, only_if_update_pending: bool, path_prefix: &str) -> Result<bool, ExecutorError>;
}
