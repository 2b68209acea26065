//! Executor whose calls stay outstanding until released by hand

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::debug;

use super::RestartExecutor;
use crate::error::ExecutorError;

/// One recorded `execute_restart` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Invocation {
    pub only_if_update_pending: bool,
    pub path_prefix: String,
}

impl Invocation {
    pub fn new(only_if_update_pending: bool, path_prefix: impl Into<String>) -> Self {
        Self {
            only_if_update_pending,
            path_prefix: path_prefix.into(),
        }
    }
}

#[derive(Default)]
struct GateState {
    invocations: Vec<Invocation>,
    waiting: VecDeque<oneshot::Sender<Result<bool, ExecutorError>>>,
}

/// Records every invocation and parks it until `resolve` or `fail`
///
/// Calls are released oldest first. Drives the simulator and lets tests
/// hold a restart "in progress" for as long as they need.
#[derive(Default)]
pub struct GatedExecutor {
    state: Mutex<GateState>,
    changed: Notify,
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every invocation so far, in call order
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().await.invocations.clone()
    }

    /// Number of calls waiting to be released
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.waiting.len()
    }

    /// Wait until at least `count` invocations have been recorded
    pub async fn wait_for_invocations(&self, count: usize) {
        debug!(count, "GatedExecutor::wait_for_invocations: called");
        loop {
            let changed = self.changed.notified();
            if self.state.lock().await.invocations.len() >= count {
                return;
            }
            changed.await;
        }
    }

    /// Wait until at least one call is outstanding
    pub async fn wait_for_outstanding(&self) {
        debug!("GatedExecutor::wait_for_outstanding: called");
        loop {
            let changed = self.changed.notified();
            if !self.state.lock().await.waiting.is_empty() {
                return;
            }
            changed.await;
        }
    }

    /// Resolve the oldest outstanding call. Returns false if none was waiting.
    pub async fn resolve(&self, restarted: bool) -> bool {
        debug!(restarted, "GatedExecutor::resolve: called");
        self.release(Ok(restarted)).await
    }

    /// Fail the oldest outstanding call. Returns false if none was waiting.
    pub async fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        debug!(%message, "GatedExecutor::fail: called");
        self.release(Err(ExecutorError::Failed(message))).await
    }

    async fn release(&self, result: Result<bool, ExecutorError>) -> bool {
        let mut state = self.state.lock().await;
        match state.waiting.pop_front() {
            Some(tx) => {
                // The caller may have gone away; nothing to report then
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RestartExecutor for GatedExecutor {
    async fn execute_restart(&self, only_if_update_pending: bool, path_prefix: &str) -> Result<bool, ExecutorError> {
        debug!(only_if_update_pending, %path_prefix, "GatedExecutor::execute_restart: called");
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state
                .invocations
                .push(Invocation::new(only_if_update_pending, path_prefix));
            state.waiting.push_back(tx);
        }
        self.changed.notify_waiters();

        rx.await
            .map_err(|_| ExecutorError::Failed("gate dropped before resolution".to_string()))?
    }
}
