//! # RelayMCP Server
//!
//! Thread-based MCP server. Each inbound payload is size-checked, parsed as
//! a single message or a batch, authenticated once, rate limited per
//! request and then either forwarded to a gateway backend or answered by a
//! local method handler.
//!
//! ## Methods
//!
//! | Method | Result |
//! |---|---|
//! | `ping` | `{"message":"pong"}` |
//! | `list_resources` | `{"resources":[...]}` |
//! | `list_resource_templates` | `{"resourceTemplates":[...]}` |
//! | `read_resource` | `{"contents":[...]}` (cached) |
//! | `list_tools` | `{"tools":[...]}` |
//! | `call_tool` | `{"content":[...],"isError":bool}` |
//! | `get_performance_metrics` | metrics snapshot |
//! | `reset_performance_metrics` | `{"success":true}` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaymcp_core::McpResult;
//! use relaymcp_core::types::{ContentItem, Tool, ToolOutput};
//! use relaymcp_server::{Server, ServerConfig};
//! use relaymcp_transport::{TcpServerTransport, TransportConfig};
//! use serde_json::Value;
//!
//! # fn example() -> McpResult<()> {
//! let server = Server::new(ServerConfig::builder().name("demo").build())?;
//! server.add_tool(Tool::new("echo").with_description("Echo the arguments"));
//! server.set_tool_handler(|_name: &str, args: &Value| -> McpResult<ToolOutput> {
//!     Ok(ToolOutput::success(vec![ContentItem::json(args)]))
//! });
//!
//! let transport = TcpServerTransport::bind("127.0.0.1:9000", TransportConfig::default())?;
//! server.start(Arc::new(transport))?;
//! // ...
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

pub mod auth;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod rate_limit;
pub mod server;

pub use auth::{AuthContext, AuthKind, Authenticator, wildcard_match};
pub use cache::ResourceCache;
pub use config::{
    AccessConfig, BackendConfig, CapabilitiesConfig, ConfigError, ConfigResult,
    ConfigurationBuilder, GatewayConfig, LogOutput, LogRotation, LoggingConfig, RateLimitConfig,
    RoutingRules, ServerConfig,
};
pub use dispatcher::Dispatcher;
pub use gateway::{BackendConnector, BackendInfo, Gateway, PooledTcpConnector, find_backend};
pub use handlers::{ResourceHandler, ToolHandler};
pub use logging::LoggingGuard;
pub use metrics::{PerformanceMetrics, PerformanceTimer, RequestOutcome};
pub use pool::ThreadPool;
pub use rate_limit::RateLimiter;
pub use server::{Server, ShutdownHandle};

/// Default server name
pub const SERVER_NAME: &str = "relaymcp-server";

/// Crate version, used as the default server version
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
