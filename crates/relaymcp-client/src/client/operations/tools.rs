//! Tool operations

use serde_json::{Map, Value, json};

use relaymcp_core::{McpError, McpResult, Tool, ToolOutput};

use crate::client::core::Client;

impl Client {
    /// List the tools the server exposes
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the result is malformed.
    pub fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.request_field("list_tools", None, "tools")
    }

    /// Invoke a tool; absent arguments are sent as `{}`
    ///
    /// A tool that ran but reported failure comes back as `Ok` with
    /// [`ToolOutput::is_error`] set.
    ///
    /// # Errors
    ///
    /// - [`relaymcp_core::ErrorCode::Forbidden`] when access is denied
    /// - [`relaymcp_core::ErrorCode::ToolNotFound`] for unknown tools
    /// - any transport or server error
    pub fn call_tool(&self, name: &str, arguments: Option<&Value>) -> McpResult<ToolOutput> {
        let arguments = arguments
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let result = self.request_value(
            "call_tool",
            Some(&json!({ "name": name, "arguments": arguments })),
        )?;
        ToolOutput::from_json(&result)
            .ok_or_else(|| McpError::parse("call_tool result has no content array"))
    }
}
