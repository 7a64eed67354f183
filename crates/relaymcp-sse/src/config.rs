//! SSE client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between connection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default interval at which the running flag is checked
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default wait between idle checks on an open stream
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default time without data before the stream is dropped
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(300);

/// Default socket read size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Default cap on a pending line or an event's accumulated data
pub const DEFAULT_MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Where and how the SSE client connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Sent as `Authorization: Bearer <key>` when set
    pub api_key: Option<String>,
    /// Require a TLS-capable connector
    pub use_tls: bool,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Delay before reconnecting after a failure or drop
    pub reconnect_delay: Duration,
    /// Granularity of running-flag checks while waiting
    pub poll_interval: Duration,
    /// Longest single wait on the socket before the idle check
    pub heartbeat_interval: Duration,
    /// Drop the stream after this long without data
    pub max_idle: Duration,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
    /// Largest pending line or event data; larger streams are dropped
    pub max_event_size: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            api_key: None,
            use_tls: false,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_idle: DEFAULT_MAX_IDLE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
        }
    }
}

impl SseConfig {
    /// Configuration for `host:port` with default timings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the bearer token
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Require TLS
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the running-flag poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the idle limit
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the event size limit
    pub fn with_max_event_size(mut self, max_event_size: usize) -> Self {
        self.max_event_size = max_event_size;
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Endpoint URL, for logs
    pub fn url(&self) -> String {
        format!(
            "http{}://{}:{}/events",
            if self.use_tls { "s" } else { "" },
            self.host,
            self.port
        )
    }

    /// Socket read timeout: the shorter of the poll and heartbeat intervals
    pub(crate) fn read_timeout(&self) -> Duration {
        self.poll_interval
            .min(self.heartbeat_interval)
            .max(Duration::from_millis(1))
    }
}
