//! Built-in method handlers
//!
//! Each handler receives the parsed request and the caller's auth context
//! and returns the `result` value; the dispatcher turns errors into
//! JSON-RPC error responses.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use relaymcp_core::jsonrpc::Request;
use relaymcp_core::{
    ContentItem, ErrorCode, McpError, McpResult, Resource, ResourceTemplate, StringMap, Tool,
    ToolOutput,
};

use crate::auth::AuthContext;
use crate::server::ServerState;

/// Application callback producing resource content
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`
    ///
    /// # Errors
    ///
    /// Errors are returned to the caller unchanged.
    fn read(&self, uri: &str) -> McpResult<Vec<ContentItem>>;
}

impl<F> ResourceHandler for F
where
    F: Fn(&str) -> McpResult<Vec<ContentItem>> + Send + Sync,
{
    fn read(&self, uri: &str) -> McpResult<Vec<ContentItem>> {
        self(uri)
    }
}

/// Application callback running tools
pub trait ToolHandler: Send + Sync {
    /// Invoke tool `name` with its `arguments` object
    ///
    /// # Errors
    ///
    /// Errors are returned to the caller unchanged. A tool that ran and
    /// failed should return [`ToolOutput::failure`] instead.
    fn call(&self, name: &str, arguments: &Value) -> McpResult<ToolOutput>;
}

impl<F> ToolHandler for F
where
    F: Fn(&str, &Value) -> McpResult<ToolOutput> + Send + Sync,
{
    fn call(&self, name: &str, arguments: &Value) -> McpResult<ToolOutput> {
        self(name, arguments)
    }
}

/// Registered resources, templates and tools plus their callbacks
#[derive(Default)]
pub(crate) struct Catalog {
    resources: RwLock<Vec<Resource>>,
    templates: RwLock<Vec<ResourceTemplate>>,
    tools: RwLock<Vec<Tool>>,
    resource_handler: RwLock<Option<Arc<dyn ResourceHandler>>>,
    tool_handler: RwLock<Option<Arc<dyn ToolHandler>>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("resources", &self.resources.read().len())
            .field("templates", &self.templates.read().len())
            .field("tools", &self.tools.read().len())
            .field("resource_handler", &self.resource_handler.read().is_some())
            .field("tool_handler", &self.tool_handler.read().is_some())
            .finish()
    }
}

impl Catalog {
    pub(crate) fn add_resource(&self, resource: Resource) {
        upsert(&mut self.resources.write(), resource, |r| r.uri.clone());
    }

    pub(crate) fn add_template(&self, template: ResourceTemplate) {
        upsert(&mut self.templates.write(), template, |t| t.uri_template.clone());
    }

    pub(crate) fn add_tool(&self, tool: Tool) {
        upsert(&mut self.tools.write(), tool, |t| t.name.clone());
    }

    pub(crate) fn set_resource_handler(&self, handler: Arc<dyn ResourceHandler>) {
        *self.resource_handler.write() = Some(handler);
    }

    pub(crate) fn set_tool_handler(&self, handler: Arc<dyn ToolHandler>) {
        *self.tool_handler.write() = Some(handler);
    }

    fn has_resource(&self, uri: &str) -> bool {
        self.resources.read().iter().any(|r| r.uri == uri)
    }
}

/// Replace the element with the same key or append
fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> String) {
    let k = key(&item);
    match items.iter_mut().find(|existing| key(existing) == k) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Signature shared by every built-in method
pub(crate) type MethodFn = fn(&ServerState, &Request, &AuthContext) -> McpResult<Value>;

/// Method name to handler table
pub(crate) fn method_table() -> StringMap<MethodFn> {
    let methods: [(&str, MethodFn); 8] = [
        ("ping", ping),
        ("list_resources", list_resources),
        ("list_resource_templates", list_resource_templates),
        ("read_resource", read_resource),
        ("list_tools", list_tools),
        ("call_tool", call_tool),
        ("get_performance_metrics", get_performance_metrics),
        ("reset_performance_metrics", reset_performance_metrics),
    ];
    let mut table = StringMap::new();
    let entries = methods.map(|(name, handler)| (name.to_string(), handler));
    if let Err(e) = table.put_batch(entries) {
        warn!("Method table is incomplete: {}", e);
    }
    table
}

fn ping(_state: &ServerState, _request: &Request, _auth: &AuthContext) -> McpResult<Value> {
    Ok(json!({ "message": "pong" }))
}

fn require_resources(state: &ServerState) -> McpResult<()> {
    if state.config.capabilities.resources {
        Ok(())
    } else {
        Err(McpError::method_not_found("Resources not supported"))
    }
}

fn require_tools(state: &ServerState) -> McpResult<()> {
    if state.config.capabilities.tools {
        Ok(())
    } else {
        Err(McpError::method_not_found("Tools not supported"))
    }
}

fn to_json_array<T: serde::Serialize>(items: &[T]) -> McpResult<Value> {
    serde_json::to_value(items).map_err(|e| McpError::internal(format!("Failed to serialize: {e}")))
}

fn list_resources(state: &ServerState, _request: &Request, _auth: &AuthContext) -> McpResult<Value> {
    require_resources(state)?;
    let resources = to_json_array(state.catalog.resources.read().as_slice())?;
    Ok(json!({ "resources": resources }))
}

fn list_resource_templates(
    state: &ServerState,
    _request: &Request,
    _auth: &AuthContext,
) -> McpResult<Value> {
    require_resources(state)?;
    let templates = to_json_array(state.catalog.templates.read().as_slice())?;
    Ok(json!({ "resourceTemplates": templates }))
}

fn list_tools(state: &ServerState, _request: &Request, _auth: &AuthContext) -> McpResult<Value> {
    require_tools(state)?;
    let tools = to_json_array(state.catalog.tools.read().as_slice())?;
    Ok(json!({ "tools": tools }))
}

/// `params` as an object, with the standard failure messages
fn params_object(request: &Request) -> McpResult<&Map<String, Value>> {
    request
        .params
        .as_ref()
        .ok_or_else(|| McpError::invalid_params("Missing parameters"))?
        .as_object()
        .ok_or_else(|| McpError::invalid_params("Invalid parameters JSON"))
}

fn read_resource(state: &ServerState, request: &Request, auth: &AuthContext) -> McpResult<Value> {
    require_resources(state)?;
    let params = params_object(request)?;
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params("Missing or invalid 'uri' parameter"))?;

    if !auth.check_resource_access(uri) {
        return Err(McpError::forbidden("Access denied to resource"));
    }

    let items = match state.cache.get(uri) {
        Some(items) => {
            debug!("Cache hit for URI: {}", uri);
            items
        }
        None => {
            debug!("Cache miss for URI: {}", uri);
            let items = fetch_resource(state, uri)?;
            state.cache.put(uri, items.clone(), 0);
            debug!(
                "Stored resource {} in cache with TTL={} seconds",
                uri, state.config.cache_ttl_secs
            );
            items
        }
    };

    let contents: Vec<Value> = items.iter().map(|item| item.to_resource_json(uri)).collect();
    Ok(json!({ "contents": contents }))
}

fn fetch_resource(state: &ServerState, uri: &str) -> McpResult<Vec<ContentItem>> {
    let handler = state.catalog.resource_handler.read().clone();
    let Some(handler) = handler else {
        return Err(if state.catalog.has_resource(uri) {
            McpError::internal("Resource found but no handler configured to read content")
        } else {
            McpError::new(
                ErrorCode::ResourceNotFound,
                "Resource not found and no handler configured",
            )
        });
    };

    let items = handler.read(uri).map_err(|e| {
        warn!("Resource handler failed for {}: {}", uri, e);
        e
    })?;
    if items.is_empty() {
        return Err(McpError::internal(
            "Resource handler returned success but no content",
        ));
    }
    Ok(items)
}

fn call_tool(state: &ServerState, request: &Request, auth: &AuthContext) -> McpResult<Value> {
    require_tools(state)?;
    let params = params_object(request)?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params("Missing or invalid 'name' parameter"))?;

    if !auth.check_tool_access(name) {
        return Err(McpError::forbidden("Access denied to tool"));
    }

    let handler = state
        .catalog
        .tool_handler
        .read()
        .clone()
        .ok_or_else(|| McpError::internal("Tool handler not configured"))?;

    let empty = Value::Object(Map::new());
    let arguments = params.get("arguments").unwrap_or(&empty);
    let output = handler.call(name, arguments).map_err(|e| {
        warn!("Tool handler failed for {}: {}", name, e);
        e
    })?;
    if output.content.is_empty() {
        return Err(McpError::internal("Tool handler failed or tool not found"));
    }
    Ok(output.to_json())
}

fn get_performance_metrics(
    state: &ServerState,
    _request: &Request,
    _auth: &AuthContext,
) -> McpResult<Value> {
    Ok(state.metrics.to_json())
}

fn reset_performance_metrics(
    state: &ServerState,
    _request: &Request,
    _auth: &AuthContext,
) -> McpResult<Value> {
    state.metrics.reset();
    Ok(json!({ "success": true }))
}
