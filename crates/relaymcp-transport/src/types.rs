//! Core transport types.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Wire discipline of a transport
///
/// The kind decides whether the client send/wait core correlates responses
/// through callbacks (framed) or reads them back synchronously (HTTP,
/// WebSocket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed binary frames
    Framed,
    /// HTTP request/response
    Http,
    /// WebSocket messages
    WebSocket,
}

impl TransportKind {
    /// Whether responses are read back with `receive` after each send
    pub const fn is_synchronous(self) -> bool {
        matches!(self, Self::Http | Self::WebSocket)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framed => write!(f, "framed"),
            Self::Http => write!(f, "HTTP"),
            Self::WebSocket => write!(f, "WebSocket"),
        }
    }
}

/// Which end of a connection a transport serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    /// Initiates requests
    Client,
    /// Accepts connections and answers requests
    Server,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Represents the current state of a transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    /// The transport is not connected.
    Disconnected,
    /// The transport is in the process of connecting.
    Connecting,
    /// The transport is connected and ready to send/receive messages.
    Connected,
    /// The transport is in the process of disconnecting.
    Disconnecting,
    /// The transport has encountered an unrecoverable error.
    Failed {
        /// A description of the failure reason.
        reason: String,
    },
}

impl TransportState {
    /// Whether messages can flow
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Metadata the transport attaches to each inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    /// Remote address, when the transport has one
    pub peer: Option<SocketAddr>,
    /// Transport-local connection number
    pub connection_id: u64,
}

impl MessageContext {
    /// Context for a network peer
    pub fn from_peer(peer: SocketAddr, connection_id: u64) -> Self {
        Self {
            peer: Some(peer),
            connection_id,
        }
    }

    /// Peer IP as text, used as the rate-limit key
    pub fn client_ip(&self) -> Option<String> {
        self.peer.map(|addr| addr.ip().to_string())
    }
}
