//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use relaymcp_transport::DEFAULT_MAX_MESSAGE_SIZE;

/// Settings for the blocking send/wait core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a caller waits for its response; 0 waits indefinitely
    pub request_timeout_ms: u32,

    /// Largest request the client will send
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000, // 30 seconds
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Set the request timeout in milliseconds (0 disables it)
    pub fn with_request_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum request size
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Request timeout as a duration, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0)
            .then(|| Duration::from_millis(u64::from(self.request_timeout_ms)))
    }
}
