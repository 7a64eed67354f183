//! Transport error types.

use std::time::Duration;
use thiserror::Error;

use relaymcp_core::framing::FramingError;
use relaymcp_core::{ErrorCode, McpError};

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The transport is being stopped; outstanding work is abandoned.
    #[error("transport stopping")]
    Stopping,

    /// The transport has not been started.
    #[error("Transport not started")]
    NotStarted,

    /// The transport was already started.
    #[error("Transport already started")]
    AlreadyStarted,

    /// The operation did not complete within the specified timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation is not available for this transport kind.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Malformed framing on the wire.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// Message size exceeds the configured maximum limit.
    #[error(
        "Message size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, raise `TransportConfig::max_message_size`"
    )]
    MessageTooLarge {
        /// The actual size of the message in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<FramingError> for TransportError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::TooLarge { size, max } => Self::MessageTooLarge { size, max },
            FramingError::Io(e) => Self::Io(e.to_string()),
            other => Self::ProtocolError(other.to_string()),
        }
    }
}

impl From<TransportError> for McpError {
    fn from(err: TransportError) -> Self {
        McpError::new(ErrorCode::TransportError, err.to_string())
    }
}

/// Validate a message against the configured maximum size
///
/// # Errors
///
/// Returns [`TransportError::MessageTooLarge`] if `size > max`.
pub fn validate_message_size(size: usize, max: usize) -> TransportResult<()> {
    if size > max {
        return Err(TransportError::MessageTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopping_message() {
        assert_eq!(TransportError::Stopping.to_string(), "transport stopping");
    }

    #[test]
    fn test_converts_to_transport_code() {
        let err: McpError = TransportError::ConnectionLost("peer closed".into()).into();
        assert_eq!(err.code, ErrorCode::TransportError);
        assert!(err.message.contains("peer closed"));
    }

    #[test]
    fn test_framing_too_large_maps_to_message_too_large() {
        let err: TransportError = FramingError::TooLarge { size: 10, max: 5 }.into();
        assert_eq!(err, TransportError::MessageTooLarge { size: 10, max: 5 });
    }

    #[test]
    fn test_validate_message_size() {
        assert!(validate_message_size(1024, 1024).is_ok());
        assert!(validate_message_size(1025, 1024).is_err());
    }
}
