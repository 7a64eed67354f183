//! # RelayMCP SSE
//!
//! Client for a server's `text/event-stream` endpoint. A dedicated thread
//! keeps a `GET /events` stream open, parses events as they arrive and
//! hands each one to a callback in order. Dropped streams are reopened
//! after a fixed delay with `Last-Event-ID` set to the last delivered id.
//!
//! ```rust,no_run
//! use relaymcp_sse::{SseClient, SseConfig, SseEvent};
//!
//! # fn example() -> relaymcp_sse::SseResult<()> {
//! let client = SseClient::new(SseConfig::new("127.0.0.1", 8080), |event: &SseEvent| {
//!     println!("{}: {}", event.event_type(), event.data);
//!     Ok(())
//! })?;
//! client.start()?;
//! // ...
//! client.stop();
//! # Ok(())
//! # }
//! ```

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
pub mod config;
pub mod connector;
pub mod error;
pub mod parser;

pub use client::{ErrorCallback, MessageCallback, SseClient, build_request};
pub use config::SseConfig;
pub use connector::{Connector, SseStream, TcpConnector};
pub use error::{SseError, SseResult};
pub use parser::{SseEvent, SseParser};
