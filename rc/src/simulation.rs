//! Scenario runner: replay a scripted sequence against a live coordinator
//!
//! Scenarios are YAML files with a list of steps. The executor is a
//! [`GatedExecutor`], so restarts stay "in progress" until a `resolve` or
//! `fail` step releases them.
//!
//! ```yaml
//! steps:
//!   - op: disallow
//!   - op: request
//!     only-if-update-pending: true
//!     path-prefix: CodePush
//!   - op: allow
//!   - op: resolve
//!     restarted: false
//! ```

use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorStatus, RestartOutcome, RestartTicket,
};
use crate::executor::{GatedExecutor, Invocation};

/// A scripted scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    Request {
        #[serde(default, rename = "only-if-update-pending")]
        only_if_update_pending: bool,
        #[serde(default, rename = "path-prefix")]
        path_prefix: String,
    },
    Allow,
    Disallow,
    ClearPending,
    /// Release the oldest outstanding executor call
    Resolve { restarted: bool },
    /// Fail the oldest outstanding executor call
    Fail { message: String },
    /// Record a status snapshot in the report
    Status,
}

/// What happened while running a scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    /// One line per step
    pub log: Vec<String>,
    /// Executor calls in invocation order
    pub invocations: Vec<Invocation>,
    /// Snapshots recorded by `status` steps
    pub snapshots: Vec<CoordinatorStatus>,
    /// Outcomes of requests that reached the executor, in completion order
    pub outcomes: Vec<String>,
    pub final_status: CoordinatorStatus,
}

impl Scenario {
    /// Load a scenario from a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to parse scenario {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Run every step against a fresh coordinator
    pub async fn run(&self, config: CoordinatorConfig) -> Result<Report> {
        debug!(steps = self.steps.len(), "Scenario::run: called");
        let gate = Arc::new(GatedExecutor::new());
        let (handle, task) = Coordinator::spawn(config, gate.clone());

        let mut report = Report::default();
        let mut waiting: Vec<(usize, RestartTicket)> = Vec::new();
        let mut resolutions = 0u64;

        for (index, step) in self.steps.iter().enumerate() {
            let n = index + 1;
            match step {
                Step::Request {
                    only_if_update_pending,
                    path_prefix,
                } => {
                    let ticket = handle.submit_restart(*only_if_update_pending, path_prefix.clone()).await?;
                    match ticket.queued() {
                        Some(reason) => {
                            report.log.push(format!(
                                "{n}: request({only_if_update_pending}, {path_prefix:?}) queued: {reason:?}"
                            ));
                        }
                        None => {
                            report.log.push(format!(
                                "{n}: request({only_if_update_pending}, {path_prefix:?}) executing"
                            ));
                            waiting.push((n, ticket));
                        }
                    }
                }

                Step::Allow => {
                    handle.allow().await?;
                    report.log.push(format!("{n}: allow"));
                }

                Step::Disallow => {
                    handle.disallow().await?;
                    report.log.push(format!("{n}: disallow"));
                }

                Step::ClearPending => {
                    let cleared = handle.clear_pending().await?;
                    report.log.push(format!("{n}: clear-pending ({cleared} discarded)"));
                }

                Step::Resolve { restarted } => {
                    ensure_outstanding(&handle, resolutions, n).await?;
                    gate.wait_for_outstanding().await;
                    gate.resolve(*restarted).await;
                    resolutions += 1;
                    handle
                        .wait_until(|s| s.metrics.executor_resolutions >= resolutions)
                        .await?;
                    report.log.push(format!("{n}: resolve({restarted})"));
                    collect_outcomes(&mut waiting, &mut report.outcomes);
                }

                Step::Fail { message } => {
                    ensure_outstanding(&handle, resolutions, n).await?;
                    gate.wait_for_outstanding().await;
                    gate.fail(message.clone()).await;
                    resolutions += 1;
                    handle
                        .wait_until(|s| s.metrics.executor_resolutions >= resolutions)
                        .await?;
                    report.log.push(format!("{n}: fail({message:?})"));
                    collect_outcomes(&mut waiting, &mut report.outcomes);
                }

                Step::Status => {
                    let status = handle.status().await?;
                    report.log.push(format!(
                        "{n}: status allowed={} in-progress={} pending={}",
                        status.restarts_allowed,
                        status.restart_in_progress,
                        status.pending.len()
                    ));
                    report.snapshots.push(status);
                }
            }
        }

        report.final_status = handle.status().await?;
        report.invocations = gate.invocations().await;
        // Requests still parked in the gate never complete
        collect_outcomes(&mut waiting, &mut report.outcomes);

        handle.shutdown().await?;
        task.await.context("Coordinator task panicked")?;

        info!(
            invocations = report.invocations.len(),
            pending = report.final_status.pending.len(),
            "Scenario complete"
        );
        Ok(report)
    }
}

/// Fail the step instead of waiting forever on a call that will never arrive
async fn ensure_outstanding(handle: &CoordinatorHandle, resolutions: u64, step: usize) -> Result<()> {
    let status = handle.status().await?;
    if status.metrics.executor_invocations <= resolutions {
        eyre::bail!("step {step}: no executor call to release");
    }
    Ok(())
}

/// Move finished tickets' outcomes into `outcomes`, keeping the rest
fn collect_outcomes(waiting: &mut Vec<(usize, RestartTicket)>, outcomes: &mut Vec<String>) {
    waiting.retain_mut(|(step, ticket)| {
        let Some(outcome) = ticket.try_outcome() else {
            return true;
        };
        outcomes.push(match outcome {
            Ok(RestartOutcome::Restarting) => format!("step {step}: restarting"),
            Ok(RestartOutcome::NotRestarted) => format!("step {step}: not restarted"),
            Ok(RestartOutcome::Queued(reason)) => format!("step {step}: queued {reason:?}"),
            Err(e) => format!("step {step}: error: {e}"),
        });
        false
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::RestartIntent;

    async fn run(yaml: &str) -> Report {
        Scenario::parse(yaml)
            .unwrap()
            .run(CoordinatorConfig::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::parse(
            r#"
steps:
  - op: request
    only-if-update-pending: true
    path-prefix: CodePush
  - op: clear-pending
  - op: resolve
    restarted: false
  - op: fail
    message: boom
"#,
        )
        .unwrap();

        assert_eq!(
            scenario.steps,
            vec![
                Step::Request {
                    only_if_update_pending: true,
                    path_prefix: "CodePush".to_string()
                },
                Step::ClearPending,
                Step::Resolve { restarted: false },
                Step::Fail {
                    message: "boom".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scenario.yml");
        tokio::fs::write(&path, "steps:\n  - op: disallow\n  - op: status\n")
            .await
            .unwrap();

        let scenario = Scenario::load(&path).await.unwrap();
        assert_eq!(scenario.steps, vec![Step::Disallow, Step::Status]);

        let err = Scenario::load(&dir.path().join("missing.yml")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read scenario"));
    }

    #[tokio::test]
    async fn test_resolve_without_call_is_an_error() {
        let scenario = Scenario::parse("steps:\n  - op: resolve\n    restarted: false\n").unwrap();
        let err = scenario.run(CoordinatorConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("no executor call to release"));
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        assert!(Scenario::parse("steps:\n  - op: reboot\n").is_err());
    }

    #[tokio::test]
    async fn test_disallow_request_allow() {
        let report = run(r#"
steps:
  - op: disallow
  - op: request
    only-if-update-pending: true
    path-prefix: p
  - op: allow
  - op: resolve
    restarted: false
"#)
        .await;

        assert_eq!(report.invocations, vec![Invocation::new(true, "p")]);
        assert!(!report.final_status.restart_in_progress);
        assert!(report.final_status.pending.is_empty());
    }

    #[tokio::test]
    async fn test_disallow_allow_without_queue() {
        let report = run("steps:\n  - op: disallow\n  - op: allow\n").await;
        assert!(report.invocations.is_empty());
        assert!(report.final_status.restarts_allowed);
    }

    #[tokio::test]
    async fn test_clear_pending_prevents_replay() {
        let report = run(r#"
steps:
  - op: disallow
  - op: request
  - op: request
    only-if-update-pending: true
  - op: request
  - op: clear-pending
  - op: allow
  - op: status
"#)
        .await;

        assert!(report.invocations.is_empty());
        assert_eq!(report.snapshots.len(), 1);
        assert!(report.snapshots[0].pending.is_empty());
        assert_eq!(report.final_status.metrics.intents_cleared, 3);
        assert!(report.log.iter().any(|l| l.contains("3 discarded")));
    }

    #[tokio::test]
    async fn test_restart_confirmed() {
        let report = run(r#"
steps:
  - op: request
    path-prefix: /a
  - op: request
    only-if-update-pending: true
    path-prefix: /b
  - op: resolve
    restarted: true
"#)
        .await;

        assert_eq!(report.invocations, vec![Invocation::new(false, "/a")]);
        assert!(report.final_status.restarted);
        assert_eq!(report.final_status.pending, vec![RestartIntent::new(true)]);
        assert_eq!(report.outcomes, vec!["step 1: restarting".to_string()]);
    }

    #[tokio::test]
    async fn test_chained_drain() {
        let report = run(r#"
steps:
  - op: request
    path-prefix: /x
  - op: request
    only-if-update-pending: true
    path-prefix: /a
  - op: request
    path-prefix: /b
  - op: resolve
    restarted: false
  - op: resolve
    restarted: false
  - op: resolve
    restarted: false
"#)
        .await;

        assert_eq!(
            report.invocations,
            vec![
                Invocation::new(false, "/x"),
                Invocation::new(true, "/x"),
                Invocation::new(false, "/x"),
            ]
        );
        assert!(!report.final_status.restart_in_progress);
        assert!(report.final_status.pending.is_empty());
    }
}
