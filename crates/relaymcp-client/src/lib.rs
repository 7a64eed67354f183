//! # RelayMCP Client
//!
//! Blocking MCP client. A caller thread formats a request, registers a
//! waiter keyed by the request id, hands the framed bytes to the transport
//! and parks until the transport's reader thread delivers the matching
//! response, the request times out, or the transport stops.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaymcp_client::{Client, ClientConfig};
//! use relaymcp_transport::{TcpClientTransport, TransportConfig};
//!
//! # fn example() -> relaymcp_core::McpResult<()> {
//! let transport = Arc::new(TcpClientTransport::new("127.0.0.1:9000", TransportConfig::default()));
//! let client = Client::new(transport, ClientConfig::default().with_request_timeout_ms(5_000));
//! client.connect()?;
//!
//! assert_eq!(client.ping()?, "pong");
//! for resource in client.list_resources()? {
//!     println!("{}", resource.uri);
//! }
//! client.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Error mapping
//!
//! | Situation | Code | Message |
//! |---|---|---|
//! | deadline passed | `TransportError` | `Request timed out` |
//! | transport stopped | `TransportError` | `transport stopping` |
//! | connection failed | `TransportError` | `Transport connection error` |
//! | unparseable response | `ParseError` | `Failed to parse response JSON` |
//! | server error | server's code | server's message |

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;

pub use client::{
    BatchRequest, Client, ClientConfig, Delivery, PendingRegistry, PendingStatus,
};
