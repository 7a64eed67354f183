//! # RelayMCP
//!
//! A thread-based Model Context Protocol runtime. No async executor: every
//! connection reader, accept loop and event stream runs on its own OS
//! thread, and callers block on condition variables with timeouts.
//!
//! | Crate | Contents |
//! |---|---|
//! | [`core`] | chained hash map, error taxonomy, JSON-RPC codec, framing, domain types |
//! | [`transport`] | transport contract, in-memory channel and loopback, framed TCP |
//! | [`client`] | pending-request registry and blocking send/wait |
//! | [`server`] | dispatcher, auth, cache, rate limiting, metrics, gateway |
//! | [`sse`] | Server-Sent Events client |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaymcp::prelude::*;
//!
//! # fn main() -> McpResult<()> {
//! let server = Server::new(ServerConfig::builder().name("hello").build())?;
//! server.add_resource(Resource::new("memo://greeting").with_name("Greeting"));
//! server.set_resource_handler(|_uri: &str| -> McpResult<Vec<ContentItem>> {
//!     Ok(vec![ContentItem::text("hello")])
//! });
//!
//! let (client_end, server_end) = ChannelTransport::pair(TransportConfig::default());
//! server.start(Arc::new(server_end))?;
//!
//! let client = Client::new(Arc::new(client_end), ClientConfig::default());
//! client.connect()?;
//! let contents = client.read_resource("memo://greeting")?;
//! assert_eq!(contents[0].as_text(), "hello");
//!
//! client.stop();
//! server.shutdown(None);
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

pub use relaymcp_core as core;
pub use relaymcp_transport as transport;

#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub use relaymcp_client as client;

#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub use relaymcp_server as server;

#[cfg(feature = "sse")]
#[cfg_attr(docsrs, doc(cfg(feature = "sse")))]
pub use relaymcp_sse as sse;

pub use relaymcp_core::{ErrorCode, McpError, McpResult};

/// Facade version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use relaymcp_core::{
        ContentItem, ErrorCode, McpError, McpResult, Resource, ResourceTemplate, StringMap, Tool,
        ToolOutput, ToolParam,
    };
    pub use relaymcp_transport::{
        ChannelTransport, LoopbackTransport, MessageContext, MessageHandler, TcpClientTransport,
        TcpServerTransport, Transport, TransportConfig, TransportError, TransportKind,
    };

    #[cfg(feature = "client")]
    pub use relaymcp_client::{BatchRequest, Client, ClientConfig};

    #[cfg(feature = "server")]
    pub use relaymcp_server::{
        AuthContext, LoggingConfig, ResourceHandler, Server, ServerConfig, ShutdownHandle,
        ToolHandler,
    };

    #[cfg(feature = "sse")]
    pub use relaymcp_sse::{SseClient, SseConfig, SseError, SseEvent};
}
