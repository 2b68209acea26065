//! restartcoord - live-update restart coordination
//!
//! Decides *when* an application may restart so a freshly installed update
//! takes effect. Restart requests made at unsafe moments are deferred,
//! concurrent requests are serialized, and the restart executor is invoked
//! for at most one request at a time.
//!
//! # Core Concepts
//!
//! - **Allow / Disallow**: callers bracket critical sections; requests made
//!   inside them are queued
//! - **One restart at a time**: requests arriving while the executor runs are
//!   queued, never executed concurrently
//! - **Drain**: each unblocking event replays the oldest queued request
//! - **Executor**: the pluggable component that actually restarts the app
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use restartcoord::{Coordinator, CoordinatorConfig, GatedExecutor};
//!
//! let executor = Arc::new(GatedExecutor::new());
//! let (handle, _task) = Coordinator::spawn(CoordinatorConfig::default(), executor);
//!
//! handle.disallow().await?;
//! handle.request_restart(true, "CodePush").await?; // queued
//! handle.allow().await?;                           // replayed now
//! ```
//!
//! # Modules
//!
//! - [`coordinator`] - restart state machine, coordinator task and handle
//! - [`executor`] - executor trait and implementations
//! - [`pending`] - pending update records per path prefix
//! - [`simulation`] - YAML scenario runner
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod pending;
pub mod simulation;

// Re-export commonly used types
pub use config::{Config, RelaunchConfig};
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, CoordinatorState, CoordinatorStatus,
    QueueReason, RestartIntent, RestartOutcome, RestartTicket,
};
pub use error::{CoordinatorError, ExecutorError};
pub use executor::{GatedExecutor, Invocation, PendingUpdateExecutor, ProcessRelauncher, Relaunch, RestartExecutor};
pub use pending::{AfterRestart, PendingUpdate, PendingUpdateStore};
pub use simulation::{Report, Scenario, Step};
