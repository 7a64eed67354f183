//! Request forwarding to backend servers
//!
//! `read_resource` requests route by URI prefix or regular expression,
//! `call_tool` requests by exact tool name. A routed request is sent to
//! the backend through a pooled client that allocates its own request ids;
//! the backend's answer is re-emitted under the inbound request's id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::{debug, error, info, warn};

use relaymcp_client::{Client, ClientConfig};
use relaymcp_core::jsonrpc::{self, Request};
use relaymcp_core::{ErrorCode, McpResult, StringMap};
use relaymcp_transport::{TcpClientTransport, TransportConfig};

use crate::config::{BackendConfig, GatewayConfig};

/// A backend with compiled routing rules
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Display name
    pub name: String,
    /// `host:port`
    pub address: String,
    /// Connect and request timeout
    pub timeout: Duration,
    resource_prefixes: Vec<String>,
    resource_regex: Vec<Regex>,
    tool_names: Vec<String>,
}

impl BackendInfo {
    /// Compile a backend description
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid regular expression.
    pub fn from_config(config: &BackendConfig) -> Result<Self, regex::Error> {
        let resource_regex = config
            .routing
            .resource_regex
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            name: config.name.clone(),
            address: config.address.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            resource_prefixes: config.routing.resource_prefixes.clone(),
            resource_regex,
            tool_names: config.routing.tool_names.clone(),
        })
    }

    fn serves_resource(&self, uri: &str) -> bool {
        if let Some(prefix) = self.resource_prefixes.iter().find(|p| uri.starts_with(p.as_str())) {
            debug!("Routing resource '{}' to backend '{}' via prefix '{}'", uri, self.name, prefix);
            return true;
        }
        if let Some(regex) = self.resource_regex.iter().find(|r| r.is_match(uri)) {
            debug!(
                "Routing resource '{}' to backend '{}' via regex '{}'",
                uri,
                self.name,
                regex.as_str()
            );
            return true;
        }
        false
    }

    fn serves_tool(&self, name: &str) -> bool {
        let found = self.tool_names.iter().any(|tool| tool == name);
        if found {
            debug!("Routing tool '{}' to backend '{}'", name, self.name);
        }
        found
    }
}

/// First backend whose rules match the request, in configuration order
pub fn find_backend<'a>(
    backends: &'a [BackendInfo],
    method: &str,
    params: Option<&Value>,
) -> Option<&'a BackendInfo> {
    let field = |key: &str| params.and_then(|p| p.get(key)).and_then(Value::as_str);
    match method {
        "read_resource" => {
            let uri = field("uri")?;
            let backend = backends.iter().find(|b| b.serves_resource(uri));
            if backend.is_none() {
                debug!("No backend route found for resource '{}'", uri);
            }
            backend
        }
        "call_tool" => {
            let name = field("name")?;
            let backend = backends.iter().find(|b| b.serves_tool(name));
            if backend.is_none() {
                debug!("No backend route found for tool '{}'", name);
            }
            backend
        }
        _ => None,
    }
}

/// Source of connected clients for backends
pub trait BackendConnector: Send + Sync + fmt::Debug {
    /// Hand out a connected client for `backend`
    ///
    /// # Errors
    ///
    /// Returns an error when no connection can be made.
    fn acquire(&self, backend: &BackendInfo) -> McpResult<Client>;

    /// Return a client; unhealthy clients are discarded
    fn release(&self, backend: &BackendInfo, client: Client, healthy: bool);
}

/// Connector keeping idle framed TCP clients per backend address
#[derive(Debug)]
pub struct PooledTcpConnector {
    max_idle: usize,
    idle: Mutex<StringMap<Vec<Client>>>,
}

impl PooledTcpConnector {
    /// Keep up to `max_idle` idle clients per backend
    pub fn new(max_idle: usize) -> Self {
        Self {
            max_idle,
            idle: Mutex::new(StringMap::new()),
        }
    }

    /// Idle clients held for `address`
    pub fn idle_count(&self, address: &str) -> usize {
        self.idle.lock().get(address).map_or(0, Vec::len)
    }

    fn connect(backend: &BackendInfo) -> McpResult<Client> {
        info!(
            "Creating new connection for backend: {} ({})",
            backend.name, backend.address
        );
        let transport = TcpClientTransport::new(
            backend.address.clone(),
            TransportConfig::default().with_connect_timeout(backend.timeout),
        );
        let timeout_ms = u32::try_from(backend.timeout.as_millis()).unwrap_or(u32::MAX);
        let client = Client::new(
            Arc::new(transport),
            ClientConfig::default().with_request_timeout_ms(timeout_ms),
        );
        client.connect()?;
        Ok(client)
    }
}

impl BackendConnector for PooledTcpConnector {
    fn acquire(&self, backend: &BackendInfo) -> McpResult<Client> {
        loop {
            let idle = self
                .idle
                .lock()
                .get_mut(backend.address.as_str())
                .and_then(Vec::pop);
            match idle {
                Some(client) if client.is_connected() => return Ok(client),
                Some(client) => client.stop(),
                None => return Self::connect(backend),
            }
        }
    }

    fn release(&self, backend: &BackendInfo, client: Client, healthy: bool) {
        if !healthy || !client.is_connected() {
            debug!("Discarding connection for backend: {}", backend.name);
            client.stop();
            return;
        }
        let mut idle = self.idle.lock();
        let overflow = match idle.get_mut(backend.address.as_str()) {
            Some(clients) if clients.len() < self.max_idle => {
                clients.push(client);
                None
            }
            Some(_) => Some(client),
            None if self.max_idle > 0 => {
                if let Err(e) = idle.put(backend.address.clone(), vec![client]) {
                    warn!("Failed to pool connection for backend {}: {}", backend.name, e);
                }
                None
            }
            None => Some(client),
        };
        drop(idle);
        match overflow {
            Some(client) => client.stop(),
            None => debug!("Releasing connection for backend: {}", backend.name),
        }
    }
}

/// Routing table plus connector
#[derive(Debug)]
pub struct Gateway {
    backends: Vec<BackendInfo>,
    connector: Arc<dyn BackendConnector>,
}

impl Gateway {
    /// Gateway over explicit backends and connector
    pub fn new(backends: Vec<BackendInfo>, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            backends,
            connector,
        }
    }

    /// Gateway from configuration with the pooled TCP connector
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid routing regular expression.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, regex::Error> {
        let backends = config
            .backends
            .iter()
            .map(BackendInfo::from_config)
            .collect::<Result<_, _>>()?;
        info!("Gateway configured with {} backends", config.backends.len());
        Ok(Self::new(
            backends,
            Arc::new(PooledTcpConnector::new(config.pool_size)),
        ))
    }

    /// Configured backends
    pub fn backends(&self) -> &[BackendInfo] {
        &self.backends
    }

    /// Backend that should answer `request`, if any
    pub fn route(&self, request: &Request) -> Option<&BackendInfo> {
        find_backend(&self.backends, &request.method, request.params.as_ref())
    }

    /// Forward `request` and return the response text under its own id
    pub fn forward(&self, backend: &BackendInfo, request: &Request) -> String {
        let id = request.id;
        let client = match self.connector.acquire(backend) {
            Ok(client) => client,
            Err(e) => {
                error!(
                    "Failed to get connection from gateway pool for backend '{}': {}",
                    backend.name, e
                );
                return jsonrpc::format_error_response(
                    id,
                    ErrorCode::InternalError,
                    "Gateway failed to get backend connection.",
                );
            }
        };

        let outcome = client.send_request(&request.method, request.params.as_ref());
        let healthy = !matches!(&outcome, Err(e) if e.is_transport());
        self.connector.release(backend, client, healthy);

        match outcome {
            Ok(result) => match RawValue::from_string(result) {
                Ok(raw) => {
                    debug!(
                        "Successfully received response from backend '{}' for request ID {}.",
                        backend.name, id
                    );
                    jsonrpc::format_raw_success_response(id, &raw)
                }
                Err(e) => {
                    error!("Backend '{}' result is not JSON: {}", backend.name, e);
                    jsonrpc::format_error_response(
                        id,
                        ErrorCode::InternalError,
                        "Gateway internal forwarding error",
                    )
                }
            },
            Err(e) if e.is_transport() => {
                error!("Failed to forward request to backend '{}': {}", backend.name, e);
                jsonrpc::format_error_response(
                    id,
                    ErrorCode::TransportError,
                    "Backend connection or timeout error",
                )
            }
            Err(e) => {
                warn!(
                    "Backend '{}' returned error for request ID {}: {} ({})",
                    backend.name,
                    id,
                    e.code.as_i32(),
                    e.message
                );
                jsonrpc::format_error(id, &e)
            }
        }
    }
}
