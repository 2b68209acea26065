//! Main Coordinator task implementation

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CoordRequest, CoordinatorMetrics, CoordinatorStatus, ExecutorResult, Submitted};
use super::state::{CoordinatorState, Dispatch, QueueReason, RestartIntent};
use crate::executor::RestartExecutor;

/// The Coordinator decides when restart requests reach the executor
///
/// All state lives inside the task started by [`Coordinator::run`]; callers
/// talk to it through a [`CoordinatorHandle`]. Executor calls run in their
/// own tasks and report back as messages, so the coordinator keeps serving
/// requests while a restart is outstanding.
pub struct Coordinator {
    inner: Inner,
    rx: mpsc::Receiver<CoordRequest>,
    status_tx: watch::Sender<CoordinatorStatus>,
}

/// State owned by the running task
struct Inner {
    state: CoordinatorState,
    metrics: CoordinatorMetrics,
    restarted: bool,
    executor: Arc<dyn RestartExecutor>,
    tx: mpsc::Sender<CoordRequest>,
}

impl Inner {
    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            restarts_allowed: self.state.restarts_allowed(),
            restart_in_progress: self.state.restart_in_progress(),
            pending: self.state.pending().copied().collect(),
            last_path_prefix: self.state.last_path_prefix().to_string(),
            restarted: self.restarted,
            metrics: self.metrics.clone(),
        }
    }

    /// Run one request through the decision sequence
    ///
    /// On `Execute` the executor call is spawned and the returned receiver
    /// yields its result. Replays of queued intents just drop the receiver.
    fn dispatch(&mut self, intent: RestartIntent, path_prefix: &str) -> Submitted {
        match self.state.request(intent, path_prefix) {
            Dispatch::Queued(reason) => {
                match reason {
                    QueueReason::InProgress => {
                        info!("Restart request queued until the current restart is completed")
                    }
                    QueueReason::Disallowed => info!("Restart request queued until restarts are re-allowed"),
                }
                self.metrics.requests_queued += 1;
                Submitted::Queued(reason)
            }
            Dispatch::Execute => {
                debug!(?intent, %path_prefix, "Invoking restart executor");
                self.metrics.executor_invocations += 1;

                let (completion_tx, completion_rx) = oneshot::channel();
                let executor = Arc::clone(&self.executor);
                let coord_tx = self.tx.clone();
                let path_prefix = path_prefix.to_string();
                tokio::spawn(async move {
                    let result = executor
                        .execute_restart(intent.only_if_update_pending, &path_prefix)
                        .await;
                    let _ = coord_tx
                        .send(CoordRequest::ExecutorResolved {
                            path_prefix,
                            result,
                            completion_tx,
                        })
                        .await;
                });

                Submitted::Executing(completion_rx)
            }
        }
    }

    fn resolved(&mut self, path_prefix: &str, result: &ExecutorResult) {
        self.metrics.executor_resolutions += 1;

        match result {
            Ok(true) => {
                info!("Restarting app");
                self.restarted = true;
                self.state.settle(true);
            }
            Ok(false) => {
                debug!(%path_prefix, "Executor did not restart");
                // Replay the head with the resolving call's prefix, not the one it was queued with
                if let Some(intent) = self.state.settle(false) {
                    let _ = self.dispatch(intent, path_prefix);
                }
            }
            Err(e) => {
                warn!(error = %e, %path_prefix, "Restart executor failed, restart stays in progress");
            }
        }
    }
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig, executor: Arc<dyn RestartExecutor>) -> Self {
        debug!(?config, "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let inner = Inner {
            state: CoordinatorState::new(),
            metrics: CoordinatorMetrics::default(),
            restarted: false,
            executor,
            tx,
        };
        let (status_tx, _) = watch::channel(inner.status());

        Self { inner, rx, status_tx }
    }

    /// Start a Coordinator on the current runtime
    pub fn spawn(config: CoordinatorConfig, executor: Arc<dyn RestartExecutor>) -> (CoordinatorHandle, JoinHandle<()>) {
        let coordinator = Self::new(config, executor);
        let handle = coordinator.handle();
        (handle, tokio::spawn(coordinator.run()))
    }

    /// Create a client handle
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.inner.tx.clone(), self.status_tx.subscribe())
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested.
    pub async fn run(self) {
        let Coordinator {
            mut inner,
            mut rx,
            status_tx,
        } = self;

        info!("Coordinator started");

        while let Some(req) = rx.recv().await {
            match req {
                CoordRequest::Allow { reply_tx } => {
                    info!("Re-allowing restarts");
                    if let Some(intent) = inner.state.allow() {
                        info!("Executing pending restart");
                        let path_prefix = inner.state.last_path_prefix().to_string();
                        let _ = inner.dispatch(intent, &path_prefix);
                    }
                    status_tx.send_replace(inner.status());
                    let _ = reply_tx.send(());
                }

                CoordRequest::Disallow { reply_tx } => {
                    info!("Disallowing restarts");
                    inner.state.disallow();
                    status_tx.send_replace(inner.status());
                    let _ = reply_tx.send(());
                }

                CoordRequest::ClearPending { reply_tx } => {
                    let cleared = inner.state.clear_pending();
                    debug!(cleared, "Cleared pending restarts");
                    inner.metrics.intents_cleared += cleared as u64;
                    status_tx.send_replace(inner.status());
                    let _ = reply_tx.send(cleared);
                }

                CoordRequest::RequestRestart {
                    only_if_update_pending,
                    path_prefix,
                    reply_tx,
                } => {
                    debug!(only_if_update_pending, %path_prefix, "Restart requested");
                    inner.metrics.requests_received += 1;
                    let submitted = inner.dispatch(RestartIntent::new(only_if_update_pending), &path_prefix);
                    status_tx.send_replace(inner.status());
                    let _ = reply_tx.send(submitted);
                }

                CoordRequest::ExecutorResolved {
                    path_prefix,
                    result,
                    completion_tx,
                } => {
                    inner.resolved(&path_prefix, &result);
                    // Nobody waits on replays of queued intents
                    let _ = completion_tx.send(result);
                    status_tx.send_replace(inner.status());
                }

                CoordRequest::GetStatus { reply_tx } => {
                    let _ = reply_tx.send(inner.status());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::messages::RestartOutcome;
    use crate::executor::{GatedExecutor, Invocation};
    use tracing_test::traced_test;

    fn start() -> (Arc<GatedExecutor>, CoordinatorHandle, JoinHandle<()>) {
        let gate = Arc::new(GatedExecutor::new());
        let (handle, task) = Coordinator::spawn(CoordinatorConfig::default(), gate.clone());
        (gate, handle, task)
    }

    #[tokio::test]
    async fn test_coordinator_starts_and_stops() {
        let (_gate, handle, task) = start();

        let status = handle.status().await.unwrap();
        assert!(status.restarts_allowed);
        assert!(!status.restart_in_progress);
        assert!(status.pending.is_empty());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(handle.status().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_single_request_not_restarted() {
        let (gate, handle, task) = start();

        let ticket = handle.submit_restart(false, "/a").await.unwrap();
        assert!(ticket.is_executing());

        gate.wait_for_invocations(1).await;
        assert!(gate.resolve(false).await);
        assert_eq!(ticket.outcome().await.unwrap(), RestartOutcome::NotRestarted);

        let status = handle.status().await.unwrap();
        assert!(!status.restart_in_progress);
        assert!(status.pending.is_empty());
        assert_eq!(status.metrics.executor_invocations, 1);
        assert_eq!(gate.invocations().await, vec![Invocation::new(false, "/a")]);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_while_in_progress_are_queued_in_order() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/x").await.unwrap();
        for flag in [true, false, true] {
            let outcome = handle.request_restart(flag, "/y").await.unwrap();
            assert_eq!(outcome, RestartOutcome::Queued(QueueReason::InProgress));
        }

        let status = handle.status().await.unwrap();
        let queued: Vec<bool> = status.pending.iter().map(|i| i.only_if_update_pending).collect();
        assert_eq!(queued, vec![true, false, true]);
        assert_eq!(status.last_path_prefix, "/y");

        gate.wait_for_invocations(1).await;
        assert_eq!(gate.invocations().await.len(), 1);

        drop(first);
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_not_restarted_replays_only_queue_head() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/x").await.unwrap();
        handle.request_restart(true, "/a").await.unwrap();
        handle.request_restart(false, "/b").await.unwrap();

        gate.wait_for_invocations(1).await;
        gate.resolve(false).await;
        assert_eq!(first.outcome().await.unwrap(), RestartOutcome::NotRestarted);

        // Head replayed with the resolving call's prefix; the second entry waits
        gate.wait_for_invocations(2).await;
        assert_eq!(gate.invocations().await[1], Invocation::new(true, "/x"));

        let status = handle.status().await.unwrap();
        assert!(status.restart_in_progress);
        assert_eq!(status.pending, vec![RestartIntent::new(false)]);
        assert_eq!(status.last_path_prefix, "/x");

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_restarted_abandons_queue() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/x").await.unwrap();
        handle.request_restart(true, "/a").await.unwrap();

        gate.wait_for_invocations(1).await;
        gate.resolve(true).await;
        assert_eq!(first.outcome().await.unwrap(), RestartOutcome::Restarting);

        // Unblocking again cannot reach the executor any more
        handle.allow().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.restarted);
        assert!(status.restart_in_progress);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(gate.invocations().await.len(), 1);
        assert_eq!(gate.outstanding().await, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_executor_error_reaches_caller() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(true, "/x").await.unwrap();
        handle.request_restart(false, "/a").await.unwrap();

        gate.wait_for_invocations(1).await;
        gate.fail("native bridge gone").await;

        let err = first.outcome().await.unwrap_err();
        assert!(err.to_string().contains("native bridge gone"));

        let status = handle.status().await.unwrap();
        assert!(status.restart_in_progress);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.metrics.executor_resolutions, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_drained_head_requeued_when_disallowed() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/x").await.unwrap();
        handle.request_restart(true, "/a").await.unwrap();
        handle.request_restart(false, "/b").await.unwrap();
        handle.disallow().await.unwrap();

        gate.wait_for_invocations(1).await;
        gate.resolve(false).await;
        first.outcome().await.unwrap();

        let status = handle.status().await.unwrap();
        assert!(!status.restart_in_progress);
        assert_eq!(status.pending, vec![RestartIntent::new(false), RestartIntent::new(true)]);
        assert_eq!(gate.invocations().await.len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_one_outstanding_executor_call() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/a").await.unwrap();
        assert!(first.is_executing());
        gate.wait_for_invocations(1).await;

        let second = handle.submit_restart(false, "/b").await.unwrap();
        assert_eq!(second.queued(), Some(QueueReason::InProgress));

        let status = handle.status().await.unwrap();
        assert!(status.restart_in_progress);
        assert_eq!(status.metrics.executor_invocations, 1);
        assert_eq!(gate.outstanding().await, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_gating_events() {
        let (gate, handle, task) = start();

        handle.disallow().await.unwrap();
        handle.request_restart(true, "p").await.unwrap();
        handle.allow().await.unwrap();
        gate.wait_for_invocations(1).await;

        assert!(logs_contain("Disallowing restarts"));
        assert!(logs_contain("Restart request queued until restarts are re-allowed"));
        assert!(logs_contain("Re-allowing restarts"));
        assert!(logs_contain("Executing pending restart"));
        assert!(!logs_contain("Restarting app"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_allow_without_queue() {
        let (_gate, handle, task) = start();

        handle.allow().await.unwrap();
        assert!(logs_contain("Re-allowing restarts"));
        assert!(!logs_contain("Executing pending restart"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_restarting_app_only_on_true() {
        let (gate, handle, task) = start();

        let first = handle.submit_restart(false, "/x").await.unwrap();
        handle.request_restart(true, "/y").await.unwrap();
        assert!(logs_contain("Restart request queued until the current restart is completed"));

        gate.wait_for_invocations(1).await;
        gate.resolve(false).await;
        assert_eq!(first.outcome().await.unwrap(), RestartOutcome::NotRestarted);
        assert!(!logs_contain("Restarting app"));

        gate.wait_for_invocations(2).await;
        gate.resolve(true).await;
        handle.wait_until(|s| s.restarted).await.unwrap();
        assert!(logs_contain("Restarting app"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
