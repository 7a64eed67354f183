//! SSE client errors

use std::io;

use thiserror::Error;

use relaymcp_core::McpError;

/// Result alias for SSE operations
pub type SseResult<T> = std::result::Result<T, SseError>;

/// Failures of the SSE client and its event loop
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SseError {
    /// Invalid client configuration
    #[error("Invalid SSE configuration: {0}")]
    Config(String),

    /// Host resolution or TCP connect failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        /// `host:port` being connected to
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The server answered with a non-2xx status or a malformed head
    #[error("Unexpected HTTP response: {0}")]
    Http(String),

    /// Reading or writing the stream failed
    #[error("SSE stream I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the stream
    #[error("SSE stream closed by server")]
    Closed,

    /// Nothing arrived within the idle limit
    #[error("SSE stream idle for {0} seconds")]
    Idle(u64),

    /// A line or event grew past the configured limit
    #[error("SSE event exceeds {0} bytes")]
    EventTooLarge(usize),

    /// The message callback rejected an event
    #[error("Message callback failed: {0}")]
    Callback(McpError),

    /// The client is already running
    #[error("SSE client already running")]
    AlreadyRunning,
}

impl SseError {
    /// Whether the loop should reconnect after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::AlreadyRunning)
    }
}
