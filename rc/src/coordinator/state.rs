//! Restart coordination state machine
//!
//! Pure and synchronous: the coordinator task owns one `CoordinatorState`
//! and applies every request to it in arrival order. Executor calls happen
//! outside, the state only records that one is outstanding.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A deferred restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartIntent {
    /// Only restart if an update is pending
    #[serde(rename = "only-if-update-pending")]
    pub only_if_update_pending: bool,
}

impl RestartIntent {
    pub fn new(only_if_update_pending: bool) -> Self {
        Self { only_if_update_pending }
    }
}

/// Why a request was queued instead of executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueReason {
    /// Another restart is outstanding
    InProgress,
    /// Restarts are currently disallowed
    Disallowed,
}

/// Decision taken for a single restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Appended to the pending queue
    Queued(QueueReason),
    /// The caller must invoke the executor now
    Execute,
}

/// Process-wide restart coordination state
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    restarts_allowed: bool,
    restart_in_progress: bool,
    pending_queue: VecDeque<RestartIntent>,
    last_path_prefix: String,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            restarts_allowed: true,
            restart_in_progress: false,
            pending_queue: VecDeque::new(),
            last_path_prefix: String::new(),
        }
    }
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts_allowed(&self) -> bool {
        self.restarts_allowed
    }

    pub fn restart_in_progress(&self) -> bool {
        self.restart_in_progress
    }

    pub fn last_path_prefix(&self) -> &str {
        &self.last_path_prefix
    }

    pub fn pending(&self) -> impl Iterator<Item = &RestartIntent> {
        self.pending_queue.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_queue.len()
    }

    /// Decide what to do with a restart request
    ///
    /// The prefix is recorded even when the request ends up queued. On
    /// `Dispatch::Execute` the state is already marked in progress.
    pub fn request(&mut self, intent: RestartIntent, path_prefix: &str) -> Dispatch {
        debug!(?intent, %path_prefix, "CoordinatorState::request: called");
        self.last_path_prefix = path_prefix.to_string();

        if self.restart_in_progress {
            self.pending_queue.push_back(intent);
            return Dispatch::Queued(QueueReason::InProgress);
        }

        if !self.restarts_allowed {
            self.pending_queue.push_back(intent);
            return Dispatch::Queued(QueueReason::Disallowed);
        }

        self.restart_in_progress = true;
        Dispatch::Execute
    }

    /// Re-allow restarts, handing back the queue head to replay (if any)
    pub fn allow(&mut self) -> Option<RestartIntent> {
        self.restarts_allowed = true;
        self.pending_queue.pop_front()
    }

    pub fn disallow(&mut self) {
        self.restarts_allowed = false;
    }

    /// Drop every queued intent, returning how many were discarded
    pub fn clear_pending(&mut self) -> usize {
        let cleared = self.pending_queue.len();
        self.pending_queue.clear();
        cleared
    }

    /// Record that the outstanding executor call returned
    ///
    /// A restarted process keeps the in-progress flag forever and abandons
    /// the queue. Otherwise the flag clears and the queue head (if any) is
    /// handed back for replay.
    pub fn settle(&mut self, restarted: bool) -> Option<RestartIntent> {
        debug!(restarted, "CoordinatorState::settle: called");
        if restarted {
            return None;
        }

        self.restart_in_progress = false;
        self.pending_queue.pop_front()
    }
}
