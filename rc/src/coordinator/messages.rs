//! Message types for the Coordinator

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::state::{QueueReason, RestartIntent};
use crate::error::ExecutorError;

/// Raw executor result as delivered back to the coordinator
pub(crate) type ExecutorResult = Result<bool, ExecutorError>;

/// Internal requests to the Coordinator task
///
/// Only the handle and the coordinator's own executor tasks send these.
#[derive(Debug)]
pub(crate) enum CoordRequest {
    /// Re-allow restarts and replay the queue head
    Allow { reply_tx: oneshot::Sender<()> },

    /// Disallow restarts until the next Allow
    Disallow { reply_tx: oneshot::Sender<()> },

    /// Drop every queued intent
    ClearPending { reply_tx: oneshot::Sender<usize> },

    /// Request a restart
    RequestRestart {
        only_if_update_pending: bool,
        path_prefix: String,
        reply_tx: oneshot::Sender<Submitted>,
    },

    /// An executor call returned (internal)
    ExecutorResolved {
        path_prefix: String,
        result: ExecutorResult,
        completion_tx: oneshot::Sender<ExecutorResult>,
    },

    /// Get a status snapshot
    GetStatus {
        reply_tx: oneshot::Sender<CoordinatorStatus>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// Immediate answer to a restart request
#[derive(Debug)]
pub(crate) enum Submitted {
    Queued(QueueReason),
    /// Executor invoked; the receiver yields its result once the coordinator has applied it
    Executing(oneshot::Receiver<ExecutorResult>),
}

/// Final result of a restart request as seen by its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartOutcome {
    /// Deferred until the blocking condition lifts
    Queued(QueueReason),
    /// The executor reported the process is tearing down
    Restarting,
    /// The executor declined (no update pending)
    NotRestarted,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorMetrics {
    pub requests_received: u64,
    pub requests_queued: u64,
    pub executor_invocations: u64,
    pub executor_resolutions: u64,
    pub intents_cleared: u64,
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorStatus {
    pub restarts_allowed: bool,
    pub restart_in_progress: bool,
    pub pending: Vec<RestartIntent>,
    pub last_path_prefix: String,
    /// An executor call confirmed the process is restarting
    pub restarted: bool,
    pub metrics: CoordinatorMetrics,
}
