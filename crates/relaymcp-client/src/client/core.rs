//! Blocking send/wait core
//!
//! Framed transports deliver responses on their reader thread, so the caller
//! parks on its registry entry until [`ResponseRouter`] fills it in.
//! Request/response transports (HTTP, WebSocket) are read back directly with
//! [`Transport::receive`] after each send.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use relaymcp_core::framing;
use relaymcp_core::jsonrpc::{self, Message, NO_ID};
use relaymcp_core::{ErrorCode, McpError, McpResult};
use relaymcp_transport::{MessageContext, MessageHandler, Transport, TransportError};

use super::config::ClientConfig;
use super::registry::{Delivery, PendingRegistry, PendingStatus};

/// One element of a [`Client::send_batch`] call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Method name
    pub method: String,
    /// Parameters (`{}` when absent)
    pub params: Option<Value>,
}

impl BatchRequest {
    /// Request without parameters
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Request with parameters
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// Blocking MCP client over any [`Transport`]
///
/// Cloning is cheap; clones share the transport and the pending-request
/// registry, so several threads can issue requests concurrently.
#[derive(Clone)]
pub struct Client {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<PendingRegistry>,
    pub(crate) config: ClientConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("pending", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Client {
    /// Wrap a transport; call [`Client::connect`] before sending
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            registry: Arc::new(PendingRegistry::new()),
            config,
        }
    }

    /// Start the transport with this client's response router
    ///
    /// # Errors
    ///
    /// Returns a transport error if the transport cannot start.
    pub fn connect(&self) -> McpResult<()> {
        let router = Arc::new(ResponseRouter {
            registry: Arc::clone(&self.registry),
        });
        self.transport.start(router)?;
        debug!("Client connected over {} transport", self.transport.kind());
        Ok(())
    }

    /// Stop the transport and wake every waiting caller
    pub fn stop(&self) {
        self.transport.stop();
        // Transports that were never started have no handler to notify
        self.registry
            .fail_all(&McpError::transport(TransportError::Stopping.to_string()));
    }

    /// Whether the transport is connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }

    /// Send a request and block for its result
    ///
    /// Returns the response `result` as JSON text.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::TransportError`] when sending fails, the transport
    ///   stops, or the request times out
    /// - [`ErrorCode::ParseError`] when the response cannot be parsed
    /// - the server's error code when it answers with an error
    pub fn send_request(&self, method: &str, params: Option<&Value>) -> McpResult<String> {
        let id = self.registry.next_id();
        let request = jsonrpc::format_request(id, method, params);
        if request.len() > self.config.max_message_size {
            return Err(McpError::invalid_request(format!(
                "Request size {} exceeds maximum {}",
                request.len(),
                self.config.max_message_size
            )));
        }
        trace!("Sending request {}: {}", id, method);

        if self.transport.is_synchronous() {
            self.send_and_receive(id, &request)
        } else {
            self.send_and_wait(id, &request)
        }
    }

    /// Send several requests one after another
    ///
    /// Each element gets its own outcome; a failure does not stop the
    /// remaining requests.
    pub fn send_batch(&self, requests: &[BatchRequest]) -> Vec<McpResult<String>> {
        requests
            .iter()
            .map(|request| self.send_request(&request.method, request.params.as_ref()))
            .collect()
    }

    fn send_framed(&self, request: &str) -> McpResult<()> {
        let prefix = framing::length_prefix(request.len())
            .map_err(|e| McpError::invalid_request(e.to_string()))?;
        self.transport.sendv(&[&prefix, request.as_bytes()])?;
        Ok(())
    }

    fn send_and_receive(&self, id: u64, request: &str) -> McpResult<String> {
        let kind = self.transport.kind();
        self.send_framed(request)?;

        let bytes = self
            .transport
            .receive(self.config.request_timeout())
            .map_err(|e| {
                warn!("Failed to receive {} response for request {}: {}", kind, id, e);
                McpError::transport(format!("Failed to receive {kind} response"))
            })?;

        let text = String::from_utf8_lossy(framing::strip_frame(&bytes));
        let response = jsonrpc::parse_response(&text).map_err(|e| {
            warn!("Invalid response to request {}: {}", id, e.message);
            McpError::parse("Failed to parse response JSON")
        })?;

        if response.id != id {
            warn!("Response ID {} doesn't match request ID {}", response.id, id);
            return Err(McpError::internal("Response ID doesn't match request ID"));
        }
        response.outcome
    }

    fn send_and_wait(&self, id: u64, request: &str) -> McpResult<String> {
        self.registry.register(id)?;
        if let Err(e) = self.send_framed(request) {
            self.registry.remove(id);
            return Err(e);
        }

        match self.registry.wait(id, self.config.request_timeout()) {
            PendingStatus::Completed(result) => Ok(result),
            PendingStatus::Error(error) => Err(error),
            PendingStatus::Timeout => {
                warn!("Request {} timed out", id);
                Err(McpError::transport("Request timed out"))
            }
            PendingStatus::Invalid => Err(McpError::parse("Failed to parse response JSON")),
            PendingStatus::Waiting => Err(McpError::internal("Request left the registry while waiting")),
        }
    }
}

/// Transport callback that routes responses to waiting callers
pub(crate) struct ResponseRouter {
    registry: Arc<PendingRegistry>,
}

impl ResponseRouter {
    fn route(&self, message: Message) {
        let response = match message {
            Message::Response(response) => response,
            other => {
                debug!("Ignoring inbound {:?} message", other.method());
                return;
            }
        };
        let id = response.id;
        if id == NO_ID {
            debug!("Ignoring response without request ID");
            return;
        }
        match self.registry.deliver(response) {
            Delivery::Delivered => trace!("Delivered response for request {}", id),
            Delivery::Unknown | Delivery::AlreadyCompleted => {
                warn!("Received response for unknown or completed request ID: {}", id);
            }
        }
    }
}

impl MessageHandler for ResponseRouter {
    fn on_message(&self, data: &[u8], _ctx: &MessageContext) -> McpResult<Option<String>> {
        let text = String::from_utf8_lossy(data);
        match jsonrpc::parse_payload(&text) {
            Ok(payload) => payload.messages.into_iter().for_each(|m| self.route(m)),
            Err(e) => {
                let id = jsonrpc::extract_id(data);
                warn!("Failed to parse response JSON (id {}): {}", id, e.message);
                if id != NO_ID && self.registry.mark_invalid(id) != Delivery::Delivered {
                    debug!("No waiter for unparseable response {}", id);
                }
            }
        }
        Ok(None)
    }

    fn on_error(&self, error: &TransportError) {
        let error = match error {
            TransportError::Stopping => McpError::transport(error.to_string()),
            other => {
                warn!("Transport error: {}", other);
                McpError::new(ErrorCode::TransportError, "Transport connection error")
            }
        };
        self.registry.fail_all(&error);
    }
}
