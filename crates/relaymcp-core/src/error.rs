//! Protocol error taxonomy.
//!
//! Every failure that crosses the wire is expressed as an [`McpError`]: an
//! [`ErrorCode`] plus a short English message. JSON-RPC numeric codes are
//! reused where they exist; the MCP-specific codes live in the
//! implementation-defined `-32100..` band.
//!
//! ```rust
//! use relaymcp_core::{ErrorCode, McpError};
//!
//! let err = McpError::new(ErrorCode::Forbidden, "Access denied to tool");
//! assert_eq!(err.code.as_i32(), -32103);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Result type alias for protocol operations
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Error classification with a stable numeric wire mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Malformed JSON or framing (-32700)
    ParseError,
    /// Valid JSON that is not a valid JSON-RPC message, failed auth, or oversized input (-32600)
    InvalidRequest,
    /// Unknown method or disabled capability (-32601)
    MethodNotFound,
    /// Missing or mistyped parameter (-32602)
    InvalidParams,
    /// Handler or serializer failure (-32603)
    InternalError,
    /// Send/receive failure, closed connection or timeout (-32100)
    TransportError,
    /// Resource missing and no handler could produce it (-32101)
    ResourceNotFound,
    /// Tool missing (-32102)
    ToolNotFound,
    /// Auth context lacks a matching pattern (-32103)
    Forbidden,
    /// Rate limit exceeded for the client (-32104)
    TooManyRequests,
    /// Server is tearing down (-32105)
    ServerShuttingDown,
    /// Code received from a peer that this system does not define
    Other(i32),
}

impl ErrorCode {
    /// Numeric JSON-RPC code
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::TransportError => -32100,
            Self::ResourceNotFound => -32101,
            Self::ToolNotFound => -32102,
            Self::Forbidden => -32103,
            Self::TooManyRequests => -32104,
            Self::ServerShuttingDown => -32105,
            Self::Other(code) => code,
        }
    }

    /// Map a numeric code back to its classification
    pub const fn from_i32(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32100 => Self::TransportError,
            -32101 => Self::ResourceNotFound,
            -32102 => Self::ToolNotFound,
            -32103 => Self::Forbidden,
            -32104 => Self::TooManyRequests,
            -32105 => Self::ServerShuttingDown,
            other => Self::Other(other),
        }
    }

    /// Default message used when a handler supplies none
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::TransportError => "Transport error",
            Self::ResourceNotFound => "Resource not found",
            Self::ToolNotFound => "Tool not found",
            Self::Forbidden => "Forbidden",
            Self::TooManyRequests => "Too many requests",
            Self::ServerShuttingDown => "Server shutting down",
            Self::Other(_) => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.as_i32())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        i32::deserialize(deserializer).map(Self::from_i32)
    }
}

/// Protocol-level error: a code and a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code:?})")]
pub struct McpError {
    /// Error classification
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl McpError {
    /// Create a new error with code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error carrying the code's default message
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Create an invalid request error
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create a method not found error
    #[must_use]
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    /// Create an invalid params error
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportError, message)
    }

    /// Create a forbidden error
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Whether this error originated below the protocol layer
    pub fn is_transport(&self) -> bool {
        self.code == ErrorCode::TransportError
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("Serialization failed: {err}"))
    }
}
