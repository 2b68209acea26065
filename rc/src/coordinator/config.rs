//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Channel buffer size for coordinator requests
    #[serde(default = "default_channel_buffer", rename = "channel-buffer")]
    pub channel_buffer: usize,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            channel_buffer: default_channel_buffer(),
        }
    }
}
