//! Resource operations

use serde_json::{Value, json};

use relaymcp_core::{ContentItem, McpError, McpResult, Resource, ResourceTemplate};

use crate::client::core::Client;

impl Client {
    /// List the resources the server exposes
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the result is malformed.
    pub fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.request_field("list_resources", None, "resources")
    }

    /// List the server's resource templates
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the result is malformed.
    pub fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        self.request_field("list_resource_templates", None, "resourceTemplates")
    }

    /// Read one resource by URI
    ///
    /// # Errors
    ///
    /// - [`relaymcp_core::ErrorCode::InvalidParams`] for an empty URI
    /// - [`relaymcp_core::ErrorCode::Forbidden`] when access is denied
    /// - any transport or server error
    pub fn read_resource(&self, uri: &str) -> McpResult<Vec<ContentItem>> {
        if uri.is_empty() {
            return Err(McpError::invalid_params("Resource URI must not be empty"));
        }
        let contents: Vec<Value> =
            self.request_field("read_resource", Some(&json!({ "uri": uri })), "contents")?;
        Ok(contents.iter().filter_map(ContentItem::from_json).collect())
    }
}
