//! CoordinatorHandle - Client interface for restart requests

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::messages::{CoordRequest, CoordinatorStatus, ExecutorResult, RestartOutcome, Submitted};
use super::state::QueueReason;
use crate::error::CoordinatorError;

type Result<T> = std::result::Result<T, CoordinatorError>;

/// Handle for callers to interact with the Coordinator
///
/// This handle is cloneable; every clone talks to the same coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// Latest status published by the Coordinator
    status_rx: watch::Receiver<CoordinatorStatus>,
}

/// A restart request the coordinator has already decided on
#[derive(Debug)]
pub struct RestartTicket {
    submitted: Submitted,
}

impl RestartTicket {
    /// Why the request was queued, if it was
    pub fn queued(&self) -> Option<QueueReason> {
        match self.submitted {
            Submitted::Queued(reason) => Some(reason),
            Submitted::Executing(_) => None,
        }
    }

    /// Whether the executor was invoked for this request
    pub fn is_executing(&self) -> bool {
        matches!(self.submitted, Submitted::Executing(_))
    }

    /// Wait for the final outcome
    ///
    /// Queued tickets resolve immediately. Executing tickets resolve once the
    /// coordinator has applied the executor's result.
    pub async fn outcome(self) -> Result<RestartOutcome> {
        debug!(executing = self.is_executing(), "RestartTicket::outcome: called");
        match self.submitted {
            Submitted::Queued(reason) => Ok(RestartOutcome::Queued(reason)),
            Submitted::Executing(rx) => to_outcome(rx.await.map_err(|_| CoordinatorError::Dropped)?),
        }
    }

    /// Check for the outcome without waiting
    ///
    /// Returns `None` while the executor call is outstanding. Once this has
    /// returned `Some` for an executing ticket, later calls report `Dropped`.
    pub fn try_outcome(&mut self) -> Option<Result<RestartOutcome>> {
        match &mut self.submitted {
            Submitted::Queued(reason) => Some(Ok(RestartOutcome::Queued(*reason))),
            Submitted::Executing(rx) => match rx.try_recv() {
                Ok(result) => Some(to_outcome(result)),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(Err(CoordinatorError::Dropped)),
            },
        }
    }
}

fn to_outcome(result: ExecutorResult) -> Result<RestartOutcome> {
    if result? {
        Ok(RestartOutcome::Restarting)
    } else {
        Ok(RestartOutcome::NotRestarted)
    }
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, status_rx: watch::Receiver<CoordinatorStatus>) -> Self {
        debug!("CoordinatorHandle::new: called");
        Self { tx, status_rx }
    }

    async fn send(&self, req: CoordRequest) -> Result<()> {
        self.tx.send(req).await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Re-allow restarts, replaying the oldest queued request
    pub async fn allow(&self) -> Result<()> {
        debug!("CoordinatorHandle::allow: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Allow { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Dropped)
    }

    /// Defer all restart requests until the next `allow`
    pub async fn disallow(&self) -> Result<()> {
        debug!("CoordinatorHandle::disallow: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Disallow { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Dropped)
    }

    /// Discard every queued request, returning how many were dropped
    ///
    /// A restart already handed to the executor is not affected.
    pub async fn clear_pending(&self) -> Result<usize> {
        debug!("CoordinatorHandle::clear_pending: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::ClearPending { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Dropped)
    }

    /// Submit a restart request and return once it has been queued or handed to the executor
    pub async fn submit_restart(
        &self,
        only_if_update_pending: bool,
        path_prefix: impl Into<String>,
    ) -> Result<RestartTicket> {
        let path_prefix = path_prefix.into();
        debug!(only_if_update_pending, %path_prefix, "CoordinatorHandle::submit_restart: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::RequestRestart {
            only_if_update_pending,
            path_prefix,
            reply_tx,
        })
        .await?;

        let submitted = reply_rx.await.map_err(|_| CoordinatorError::Dropped)?;
        Ok(RestartTicket { submitted })
    }

    /// Request a restart and wait for its outcome
    pub async fn request_restart(
        &self,
        only_if_update_pending: bool,
        path_prefix: impl Into<String>,
    ) -> Result<RestartOutcome> {
        self.submit_restart(only_if_update_pending, path_prefix)
            .await?
            .outcome()
            .await
    }

    /// Get current coordinator status
    pub async fn status(&self) -> Result<CoordinatorStatus> {
        debug!("CoordinatorHandle::status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::GetStatus { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Dropped)
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_until(&self, predicate: impl FnMut(&CoordinatorStatus) -> bool) -> Result<CoordinatorStatus> {
        debug!("CoordinatorHandle::wait_until: called");
        let mut status_rx = self.status_rx.clone();
        let status = status_rx
            .wait_for(predicate)
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        Ok(status.clone())
    }

    /// Request shutdown of the Coordinator
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.send(CoordRequest::Shutdown).await
    }
}
