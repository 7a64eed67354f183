//! Server state and lifecycle
//!
//! [`Server`] owns the shared [`ServerState`] read by every dispatcher, the
//! worker pool behind [`Server::dispatch_async`] and the transport it was
//! started on. Shutdown flips a flag so new messages are rejected, then
//! waits for in-flight requests to drain before tearing down.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use relaymcp_core::types::{Resource, ResourceTemplate, Tool};
use relaymcp_core::{ErrorCode, McpError, McpResult, jsonrpc};
use relaymcp_transport::{MessageContext, Transport};

use crate::auth::Authenticator;
use crate::cache::ResourceCache;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::gateway::Gateway;
use crate::handlers::{Catalog, ResourceHandler, ToolHandler};
use crate::metrics::PerformanceMetrics;
use crate::pool::ThreadPool;
use crate::rate_limit::RateLimiter;

/// Shutdown flag and in-flight request counter
#[derive(Debug, Default)]
struct Lifecycle {
    inner: Mutex<LifecycleState>,
    idle: Condvar,
}

#[derive(Debug, Default)]
struct LifecycleState {
    shutting_down: bool,
    active: usize,
}

/// Held while a request is being processed
#[derive(Debug)]
pub(crate) struct ActiveRequest {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        let mut state = self.lifecycle.inner.lock();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && state.shutting_down {
            debug!("Last request completed, signaling shutdown condition");
            self.lifecycle.idle.notify_all();
        }
    }
}

/// State shared by the server and its dispatchers
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) catalog: Catalog,
    pub(crate) cache: ResourceCache,
    pub(crate) metrics: PerformanceMetrics,
    pub(crate) auth: Authenticator,
    pub(crate) rate_limiter: RateLimiter,
    gateway: RwLock<Option<Arc<Gateway>>>,
    lifecycle: Arc<Lifecycle>,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("name", &self.config.name)
            .field("auth", &self.auth.kind())
            .field("cache", &self.cache.len())
            .field("gateway", &self.gateway.read().is_some())
            .finish_non_exhaustive()
    }
}

impl ServerState {
    pub(crate) fn new(config: ServerConfig) -> Self {
        let gateway = if config.gateway.enabled {
            match Gateway::from_config(&config.gateway) {
                Ok(gateway) => {
                    info!(
                        "Gateway enabled with {} backend(s)",
                        gateway.backends().len()
                    );
                    Some(Arc::new(gateway))
                }
                Err(e) => {
                    error!("Invalid gateway routing configuration, gateway disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            cache: ResourceCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            metrics: PerformanceMetrics::new(),
            auth: Authenticator::new(config.api_key.as_deref(), config.access.clone()),
            rate_limiter: RateLimiter::new(&config.rate_limit),
            catalog: Catalog::default(),
            gateway: RwLock::new(gateway),
            lifecycle: Arc::new(Lifecycle::default()),
            config,
        }
    }

    pub(crate) fn gateway(&self) -> Option<Arc<Gateway>> {
        self.gateway.read().clone()
    }

    /// Count a request in, unless the server is shutting down
    pub(crate) fn begin_request(&self) -> Option<ActiveRequest> {
        let mut state = self.lifecycle.inner.lock();
        if state.shutting_down {
            return None;
        }
        state.active += 1;
        Some(ActiveRequest {
            lifecycle: Arc::clone(&self.lifecycle),
        })
    }

    pub(crate) fn begin_shutdown(&self) {
        self.lifecycle.inner.lock().shutting_down = true;
    }

    fn is_shutting_down(&self) -> bool {
        self.lifecycle.inner.lock().shutting_down
    }

    fn active_requests(&self) -> usize {
        self.lifecycle.inner.lock().active
    }

    /// Wait for in-flight requests to finish; `None` waits indefinitely
    fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lifecycle.inner.lock();
        while state.active > 0 {
            match deadline {
                Some(deadline) => {
                    if self
                        .lifecycle
                        .idle
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.active == 0;
                    }
                }
                None => self.lifecycle.idle.wait(&mut state),
            }
        }
        true
    }
}

/// Cloneable handle that can trigger shutdown from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<ServerState>,
}

impl ShutdownHandle {
    /// Reject new messages from now on
    pub fn begin_shutdown(&self) {
        self.state.begin_shutdown();
    }

    /// Whether shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.state.is_shutting_down()
    }
}

/// An MCP server
pub struct Server {
    state: Arc<ServerState>,
    dispatcher: Arc<Dispatcher>,
    pool: ThreadPool,
    transport: Mutex<Option<Arc<dyn Transport>>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state)
            .field("pool", &self.pool)
            .field("transport", &self.transport.lock().is_some())
            .finish()
    }
}

impl Server {
    /// Build a server from validated configuration
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidParams`] when the configuration is invalid, or an
    /// internal error when the worker pool cannot start.
    pub fn new(config: ServerConfig) -> McpResult<Self> {
        config
            .validate()
            .map_err(|e| McpError::invalid_params(e.to_string()))?;
        let pool = ThreadPool::new(config.thread_pool_size, config.task_queue_size)?;
        info!("Creating server '{}' v{}", config.name, config.version);
        let state = Arc::new(ServerState::new(config));
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&state))),
            state,
            pool,
            transport: Mutex::new(None),
        })
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Register a resource; an existing entry with the same URI is replaced
    pub fn add_resource(&self, resource: Resource) {
        self.state.catalog.add_resource(resource);
    }

    /// Register a resource template
    pub fn add_resource_template(&self, template: ResourceTemplate) {
        self.state.catalog.add_template(template);
    }

    /// Register a tool; an existing entry with the same name is replaced
    pub fn add_tool(&self, tool: Tool) {
        self.state.catalog.add_tool(tool);
    }

    /// Install the handler that reads resource content
    pub fn set_resource_handler(&self, handler: impl ResourceHandler + 'static) {
        self.state.catalog.set_resource_handler(Arc::new(handler));
    }

    /// Install the handler that executes tools
    pub fn set_tool_handler(&self, handler: impl ToolHandler + 'static) {
        self.state.catalog.set_tool_handler(Arc::new(handler));
    }

    /// Replace the gateway, or disable it with `None`
    pub fn set_gateway(&self, gateway: Option<Gateway>) {
        *self.state.gateway.write() = gateway.map(Arc::new);
    }

    /// The message handler to attach to a transport
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Handle that can begin shutdown from elsewhere
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Start serving on `transport`
    ///
    /// # Errors
    ///
    /// Fails when a transport is already attached or it fails to start.
    pub fn start(&self, transport: Arc<dyn Transport>) -> McpResult<()> {
        let mut slot = self.transport.lock();
        if slot.is_some() {
            return Err(McpError::invalid_request("Server already started"));
        }
        transport.start(self.dispatcher())?;
        info!(
            "Server '{}' started on {} transport",
            self.state.config.name,
            transport.kind()
        );
        *slot = Some(transport);
        Ok(())
    }

    /// Process one payload on the calling thread
    pub fn handle_message(&self, data: &[u8], ctx: &MessageContext) -> Option<String> {
        self.dispatcher.dispatch(data, ctx)
    }

    /// Process one payload on the worker pool
    ///
    /// `callback` receives the response text (`None` for notifications).
    /// When the server is shutting down or the queue is full it runs on
    /// the calling thread with the matching error response.
    pub fn dispatch_async<F>(&self, data: Vec<u8>, ctx: MessageContext, callback: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let Some(active) = self.state.begin_request() else {
            warn!("Server is shutting down, rejecting new request");
            let id = jsonrpc::extract_id(&data);
            callback(Some(jsonrpc::format_error(
                id,
                &McpError::from_code(ErrorCode::ServerShuttingDown),
            )));
            return;
        };

        let id = jsonrpc::extract_id(&data);
        let slot = Arc::new(Mutex::new(Some(callback)));
        let task_slot = Arc::clone(&slot);
        let dispatcher = self.dispatcher();
        let submitted = self.pool.submit(move || {
            let response = dispatcher.dispatch_active(&data, &ctx);
            drop(active);
            if let Some(callback) = task_slot.lock().take() {
                callback(response);
            }
        });

        if let Err(e) = submitted {
            warn!("Failed to queue message {}: {}", id, e);
            if let Some(callback) = slot.lock().take() {
                callback(Some(jsonrpc::format_error(id, &e)));
            }
        }
    }

    /// Performance counters as JSON
    pub fn metrics_json(&self) -> serde_json::Value {
        self.state.metrics.to_json()
    }

    /// The resource cache
    pub fn cache(&self) -> &ResourceCache {
        &self.state.cache
    }

    /// Requests currently being processed
    pub fn active_requests(&self) -> usize {
        self.state.active_requests()
    }

    /// Whether shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.state.is_shutting_down()
    }

    /// Reject new messages, drain in-flight ones, then stop the transport
    /// and the worker pool
    ///
    /// Returns `false` when requests were still active after `timeout`.
    pub fn shutdown(&self, timeout: Option<Duration>) -> bool {
        info!("Shutting down server '{}'", self.state.config.name);
        self.state.begin_shutdown();

        let active = self.state.active_requests();
        if active > 0 {
            info!("Waiting for {} active request(s) to complete", active);
        }
        let drained = self.state.wait_idle(timeout);
        if !drained {
            warn!(
                "Shutdown timed out with {} request(s) still active",
                self.state.active_requests()
            );
        }

        if let Some(transport) = self.transport.lock().take() {
            transport.stop();
        }
        self.pool.shutdown();
        info!("Server '{}' stopped", self.state.config.name);
        drained
    }
}
