//! Executor that restarts only when the pending update store says so

use async_trait::async_trait;
use tracing::{debug, info};

use super::RestartExecutor;
use super::relaunch::Relaunch;
use crate::error::ExecutorError;
use crate::pending::PendingUpdateStore;

/// Checks the pending update store, then hands off to a [`Relaunch`]
pub struct PendingUpdateExecutor {
    store: PendingUpdateStore,
    relauncher: Box<dyn Relaunch>,
}

impl PendingUpdateExecutor {
    pub fn new(store: PendingUpdateStore, relauncher: impl Relaunch + 'static) -> Self {
        Self {
            store,
            relauncher: Box::new(relauncher),
        }
    }
}

#[async_trait]
impl RestartExecutor for PendingUpdateExecutor {
    async fn execute_restart(&self, only_if_update_pending: bool, path_prefix: &str) -> Result<bool, ExecutorError> {
        debug!(only_if_update_pending, %path_prefix, "PendingUpdateExecutor::execute_restart: called");

        if only_if_update_pending {
            let pending = self
                .store
                .is_pending(None, path_prefix)
                .await
                .map_err(|e| ExecutorError::Store(format!("{:#}", e)))?;
            if !pending {
                info!(%path_prefix, "No pending update, not restarting");
                return Ok(false);
            }
        }

        self.relauncher.relaunch(path_prefix)?;
        Ok(true)
    }
}
