//! # RelayMCP Transport
//!
//! The transport contract shared by the RelayMCP client and server, plus the
//! bundled implementations:
//!
//! - [`ChannelTransport`]: in-process framed pair, for tests and embedding
//! - [`LoopbackTransport`]: in-process request/response (HTTP/WebSocket
//!   semantics) wired to a server-side handler
//! - [`TcpClientTransport`] / [`TcpServerTransport`]: framed TCP on blocking
//!   sockets with one reader thread per connection
//!
//! Framed transports carry every message as a 4-byte big-endian length
//! followed by the JSON text. Request/response transports delimit messages
//! themselves and strip a length prefix if one is present.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
pub mod config;
pub mod error;
pub mod loopback;
pub mod metrics;
pub mod tcp;
pub mod traits;
pub mod types;

pub use channel::ChannelTransport;
pub use config::{DEFAULT_MAX_MESSAGE_SIZE, TransportConfig};
pub use error::{TransportError, TransportResult, validate_message_size};
pub use loopback::LoopbackTransport;
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use tcp::{TcpClientTransport, TcpServerTransport};
pub use traits::{MessageHandler, Transport};
pub use types::{MessageContext, TransportKind, TransportRole, TransportState};
