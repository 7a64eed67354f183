//! Inbound message dispatch
//!
//! One inbound payload (a single message or a batch) is authenticated once,
//! then each request is rate limited, offered to the gateway and finally
//! handled locally. Batch responses keep input order; notifications and
//! stray responses produce no output.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use relaymcp_core::jsonrpc::{self, Message, NO_ID, Request};
use relaymcp_core::{ErrorCode, McpError, McpResult, StringMap};
use relaymcp_transport::{MessageContext, MessageHandler, TransportError};

use crate::auth::AuthContext;
use crate::handlers::{MethodFn, method_table};
use crate::metrics::{PerformanceTimer, RequestOutcome};
use crate::server::ServerState;

/// Rate-limit key used when the transport has no peer address
const UNKNOWN_CLIENT: &str = "unknown";

/// [`MessageHandler`] that runs the server's methods
pub struct Dispatcher {
    state: Arc<ServerState>,
    methods: StringMap<MethodFn>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

struct Reply {
    text: String,
    is_error: bool,
}

impl Reply {
    fn success(id: u64, result: &Value) -> Self {
        Self {
            text: jsonrpc::format_success_response(id, result),
            is_error: false,
        }
    }

    fn error(id: u64, error: &McpError) -> Self {
        Self {
            text: jsonrpc::format_error(id, error),
            is_error: true,
        }
    }
}

impl Dispatcher {
    pub(crate) fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            methods: method_table(),
        }
    }

    /// Process one inbound payload; `None` when nothing should be sent back
    pub fn dispatch(&self, data: &[u8], ctx: &MessageContext) -> Option<String> {
        let Some(_active) = self.state.begin_request() else {
            warn!("Server is shutting down, rejecting new request");
            return Some(jsonrpc::format_error(
                jsonrpc::extract_id(data),
                &McpError::from_code(ErrorCode::ServerShuttingDown),
            ));
        };
        self.dispatch_active(data, ctx)
    }

    /// Process a payload already counted as an active request
    pub(crate) fn dispatch_active(&self, data: &[u8], ctx: &MessageContext) -> Option<String> {
        let timer = PerformanceTimer::start();
        let metrics = &self.state.metrics;
        metrics.record_bytes_received(data.len());

        let (output, failed) = match self.process(data, ctx) {
            Ok((replies, is_batch)) => {
                let failed = replies.iter().any(|reply| reply.is_error);
                let texts: Vec<String> = replies.into_iter().map(|reply| reply.text).collect();
                let output = if is_batch {
                    jsonrpc::format_batch(&texts)
                } else {
                    texts.into_iter().next()
                };
                (output, failed)
            }
            // Payload-level failures answer with one bare error object
            Err(reply) => (Some(reply.text), true),
        };

        let outcome = if failed {
            RequestOutcome::Failure
        } else {
            RequestOutcome::Success
        };
        let elapsed = timer.stop(metrics, outcome);
        if let Some(text) = &output {
            metrics.record_bytes_sent(text.len());
        }
        trace!("Dispatched {} bytes in {:?}", data.len(), elapsed);
        output
    }

    /// Replies in input order, or one error reply for the whole payload
    fn process(&self, data: &[u8], ctx: &MessageContext) -> Result<(Vec<Reply>, bool), Reply> {
        let max = self.state.config.max_message_size;
        if data.len() > max {
            warn!("Received message size ({}) exceeds limit ({})", data.len(), max);
            return Err(Reply::error(
                jsonrpc::extract_id(data),
                &McpError::invalid_request(format!(
                    "Message size {} exceeds maximum {}",
                    data.len(),
                    max
                )),
            ));
        }

        let text = std::str::from_utf8(data).map_err(|e| {
            Reply::error(NO_ID, &McpError::parse(format!("Message is not UTF-8: {e}")))
        })?;
        let payload = jsonrpc::parse_payload(text).map_err(|e| {
            debug!("Failed to parse inbound message: {}", e.message);
            Reply::error(jsonrpc::extract_id(data), &e)
        })?;

        let auth = self.authenticate(&payload.messages)?;
        let client = ctx.client_ip();
        let client = client.as_deref().unwrap_or(UNKNOWN_CLIENT);

        let mut replies = Vec::with_capacity(payload.messages.len());
        for message in &payload.messages {
            match message {
                Message::Request(request) => replies.push(self.handle_request(request, &auth, client)),
                Message::Notification(notification) => {
                    debug!("Received notification: {}", notification.method);
                }
                Message::Response(response) => {
                    debug!("Ignoring response {} sent to server", response.id);
                }
            }
        }
        Ok((replies, payload.is_batch))
    }

    /// Authenticate with the first request's `params.apiKey`
    fn authenticate(&self, messages: &[Message]) -> Result<AuthContext, Reply> {
        let first = messages.iter().find_map(|message| match message {
            Message::Request(request) => Some(request),
            _ => None,
        });
        let credentials = first
            .and_then(|request| request.params.as_ref())
            .and_then(|params| params.get("apiKey"))
            .and_then(Value::as_str);

        if let Some(context) = self.state.auth.verify(credentials) {
            return Ok(context);
        }
        match first {
            Some(request) if request.method == "ping" => {
                debug!("Allowing unauthenticated ping");
                Ok(AuthContext::anonymous())
            }
            _ => {
                let id = first.map_or(NO_ID, |request| request.id);
                warn!("Authentication failed for request {}", id);
                Err(Reply::error(id, &McpError::invalid_request("Authentication failed")))
            }
        }
    }

    fn handle_request(&self, request: &Request, auth: &AuthContext, client: &str) -> Reply {
        if !self.state.rate_limiter.check(client) {
            warn!("Rate limit exceeded for client IP: {}", client);
            return Reply::error(request.id, &McpError::from_code(ErrorCode::TooManyRequests));
        }

        if let Some(gateway) = self.state.gateway() {
            if let Some(backend) = gateway.route(request) {
                info!(
                    "Request for method '{}' routed to backend '{}'. Attempting to forward...",
                    request.method, backend.name
                );
                let text = gateway.forward(backend, request);
                let is_error = jsonrpc::parse_response(&text).map_or(true, |r| r.outcome.is_err());
                return Reply { text, is_error };
            }
        }

        match self.call_local(request, auth) {
            Ok(result) => Reply::success(request.id, &result),
            Err(e) => {
                debug!("Request {} ({}) failed: {}", request.id, request.method, e);
                Reply::error(request.id, &e)
            }
        }
    }

    fn call_local(&self, request: &Request, auth: &AuthContext) -> McpResult<Value> {
        let handler = self
            .methods
            .get(request.method.as_str())
            .ok_or_else(|| McpError::method_not_found("Method not found"))?;
        handler(&self.state, request, auth)
    }
}

impl MessageHandler for Dispatcher {
    fn on_message(&self, data: &[u8], ctx: &MessageContext) -> McpResult<Option<String>> {
        Ok(self.dispatch(data, ctx))
    }

    fn on_error(&self, error: &TransportError) {
        match error {
            TransportError::Stopping => debug!("Server transport stopping"),
            other => warn!("Server transport error: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dispatcher(config: ServerConfig) -> Dispatcher {
        Dispatcher::new(Arc::new(ServerState::new(config)))
    }

    fn send(dispatcher: &Dispatcher, text: &str) -> Option<String> {
        dispatcher.dispatch(text.as_bytes(), &MessageContext::default())
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_single_ping() {
        let d = dispatcher(ServerConfig::default());
        let reply = send(&d, r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#);
        assert_eq!(
            reply.as_deref(),
            Some(r#"{"jsonrpc":"2.0","id":1,"result":{"message":"pong"}}"#)
        );
    }

    #[test]
    fn test_batch_with_notification_and_unknown_method() {
        let d = dispatcher(ServerConfig::default());
        let reply = send(
            &d,
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping","params":{}},
                {"jsonrpc":"2.0","method":"notify"},
                {"jsonrpc":"2.0","id":2,"method":"unknown","params":{}}]"#,
        )
        .unwrap();
        let value = parse(&reply);
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 1);
        assert_eq!(items[0]["result"]["message"], "pong");
        assert_eq!(items[1]["id"], 2);
        assert_eq!(items[1]["error"]["code"], -32601);
        assert_eq!(items[1]["error"]["message"], "Method not found");
    }

    #[test]
    fn test_notification_only_produces_nothing() {
        let d = dispatcher(ServerConfig::default());
        assert!(send(&d, r#"{"jsonrpc":"2.0","method":"notify"}"#).is_none());
        assert!(send(&d, r#"[{"jsonrpc":"2.0","method":"a"},{"jsonrpc":"2.0","method":"b"}]"#).is_none());
    }

    #[test]
    fn test_single_element_batch_stays_array() {
        let d = dispatcher(ServerConfig::default());
        let reply = send(&d, r#"[{"jsonrpc":"2.0","id":4,"method":"ping"}]"#).unwrap();
        assert!(reply.starts_with('['));
        assert_eq!(parse(&reply)[0]["id"], 4);
    }

    #[test]
    fn test_parse_error_uses_extracted_id() {
        let d = dispatcher(ServerConfig::default());
        let reply = send(&d, r#"{"jsonrpc":"2.0","id":9,"method":"#).unwrap();
        let value = parse(&reply);
        assert_eq!(value["id"], 9);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let d = dispatcher(ServerConfig::builder().max_message_size(64).build());
        let text = format!(
            r#"{{"jsonrpc":"2.0","id":3,"method":"ping","params":{{"pad":"{}"}}}}"#,
            "x".repeat(64)
        );
        let value = parse(&send(&d, &text).unwrap());
        assert_eq!(value["id"], 3);
        assert_eq!(value["error"]["code"], -32600);
    }

    #[test]
    fn test_message_at_limit_accepted() {
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#;
        let d = dispatcher(ServerConfig::builder().max_message_size(text.len()).build());
        assert!(parse(&send(&d, text).unwrap())["result"].is_object());
        let d = dispatcher(ServerConfig::builder().max_message_size(text.len() - 1).build());
        assert_eq!(parse(&send(&d, text).unwrap())["error"]["code"], -32600);
    }

    #[test]
    fn test_api_key_required() {
        let d = dispatcher(ServerConfig::builder().api_key("secret").build());

        let reply = send(&d, r#"{"jsonrpc":"2.0","id":5,"method":"list_tools","params":{}}"#).unwrap();
        assert_eq!(
            reply,
            r#"{"jsonrpc":"2.0","id":5,"error":{"code":-32600,"message":"Authentication failed"}}"#
        );

        let reply = send(
            &d,
            r#"{"jsonrpc":"2.0","id":6,"method":"list_tools","params":{"apiKey":"secret"}}"#,
        )
        .unwrap();
        assert_eq!(parse(&reply)["result"], json!({"tools": []}));
    }

    #[test]
    fn test_ping_allowed_without_key() {
        let d = dispatcher(ServerConfig::builder().api_key("secret").build());
        let reply = send(&d, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(parse(&reply)["result"]["message"], "pong");

        // The first request decides; later requests ride on its context
        let reply = send(
            &d,
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","id":2,"method":"list_tools"}]"#,
        )
        .unwrap();
        assert!(parse(&reply)[1]["result"]["tools"].is_array());

        let reply = send(
            &d,
            r#"[{"jsonrpc":"2.0","id":7,"method":"list_tools"},{"jsonrpc":"2.0","id":8,"method":"ping"}]"#,
        )
        .unwrap();
        let value = parse(&reply);
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["message"], "Authentication failed");
    }

    #[test]
    fn test_rate_limit_per_request() {
        let d = dispatcher(ServerConfig::builder().rate_limit(60, 2).build());
        let reply = send(
            &d,
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},
                {"jsonrpc":"2.0","id":2,"method":"ping"},
                {"jsonrpc":"2.0","id":3,"method":"ping"}]"#,
        )
        .unwrap();
        let value = parse(&reply);
        assert!(value[0]["result"].is_object());
        assert!(value[1]["result"].is_object());
        assert_eq!(value[2]["error"]["code"], -32104);
    }

    #[test]
    fn test_shutting_down_rejects() {
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let d = Dispatcher::new(Arc::clone(&state));
        state.begin_shutdown();
        let reply = send(&d, r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).unwrap();
        let value = parse(&reply);
        assert_eq!(value["id"], 2);
        assert_eq!(value["error"]["code"], -32105);
    }

    #[test]
    fn test_metrics_track_dispatch() {
        let d = dispatcher(ServerConfig::default());
        send(&d, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        send(&d, r#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#);
        let reply = send(&d, r#"{"jsonrpc":"2.0","id":3,"method":"get_performance_metrics"}"#).unwrap();
        let metrics = &parse(&reply)["result"];
        assert_eq!(metrics["requests"]["total"], 2);
        assert_eq!(metrics["requests"]["successful"], 1);
        assert_eq!(metrics["requests"]["failed"], 1);
    }
}
