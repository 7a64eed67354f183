//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum message size (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Settings shared by the bundled transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest accepted frame payload in bytes
    pub max_message_size: usize,
    /// Maximum time to establish a connection
    pub connect_timeout: Duration,
    /// Idle read timeout on a connection (`None` blocks indefinitely)
    pub read_timeout: Option<Duration>,
    /// How often blocked loops re-check their running flag
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl TransportConfig {
    /// Set the maximum message size
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
