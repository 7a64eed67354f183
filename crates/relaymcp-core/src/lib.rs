//! # RelayMCP Core
//!
//! Transport-neutral building blocks shared by the RelayMCP client and
//! server:
//!
//! - [`hashmap`]: chained hash table with pluggable hashing policies, used for
//!   request correlation, routing tables, rate-limit counters and caches
//! - [`error`]: the protocol error taxonomy ([`ErrorCode`], [`McpError`])
//! - [`jsonrpc`]: JSON-RPC 2.0 formatting, single/batch parsing and fast id
//!   extraction
//! - [`framing`]: 4-byte big-endian length framing
//! - [`types`]: resources, templates, tools and content items
//!
//! ## Wire example
//!
//! ```rust
//! use relaymcp_core::{framing, jsonrpc};
//!
//! let request = jsonrpc::format_request(1, "ping", None);
//! let frame = framing::encode_frame(request.as_bytes())?;
//! assert_eq!(&frame[..4], &(request.len() as u32).to_be_bytes());
//! # Ok::<(), relaymcp_core::framing::FramingError>(())
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

pub mod error;
pub mod framing;
pub mod hashmap;
pub mod jsonrpc;
pub mod types;

pub use error::{ErrorCode, McpError, McpResult};
pub use hashmap::{HashMap, IntMap, StringMap};
pub use jsonrpc::{Message, Notification, Payload, Request, Response};
pub use types::{ContentItem, ContentKind, Resource, ResourceTemplate, Tool, ToolOutput, ToolParam};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
