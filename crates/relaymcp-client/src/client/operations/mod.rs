//! Typed MCP operations built on [`Client::send_request`]

use serde::de::DeserializeOwned;
use serde_json::Value;

use relaymcp_core::{McpError, McpResult};

use super::core::Client;

pub(crate) mod connection;
pub(crate) mod resources;
pub(crate) mod tools;

impl Client {
    /// Send a request and parse its result as JSON
    pub(crate) fn request_value(&self, method: &str, params: Option<&Value>) -> McpResult<Value> {
        let result = self.send_request(method, params)?;
        serde_json::from_str(&result)
            .map_err(|e| McpError::parse(format!("Invalid {method} result: {e}")))
    }

    /// Deserialize `result[field]`
    pub(crate) fn request_field<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<&Value>,
        field: &str,
    ) -> McpResult<T> {
        let mut result = self.request_value(method, params)?;
        let value = result
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| McpError::parse(format!("{method} result has no '{field}'")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::parse(format!("Invalid {method} '{field}': {e}")))
    }
}
