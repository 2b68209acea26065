//! Coordinator for restart requests
//!
//! The Coordinator serializes every restart intent through one state machine:
//! - **Allow / Disallow:** gate restarts around unsafe moments
//! - **Request:** execute now, or queue behind a blocking condition
//! - **Drain:** replay the queue head whenever a blocking condition lifts

mod config;
mod core;
mod handle;
mod messages;
mod state;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::{CoordinatorHandle, RestartTicket};
pub use messages::{CoordinatorMetrics, CoordinatorStatus, RestartOutcome};
pub use state::{CoordinatorState, Dispatch, QueueReason, RestartIntent};
