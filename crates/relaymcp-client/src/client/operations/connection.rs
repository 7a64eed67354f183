//! Liveness and server metrics

use serde_json::Value;

use relaymcp_core::{McpError, McpResult};

use crate::client::core::Client;

impl Client {
    /// Round-trip a `ping`
    ///
    /// Returns the server's message (`"pong"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the result has no message.
    pub fn ping(&self) -> McpResult<String> {
        self.request_field("ping", None, "message")
    }

    /// Fetch the server's performance counters
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub fn get_performance_metrics(&self) -> McpResult<Value> {
        self.request_value("get_performance_metrics", None)
    }

    /// Reset the server's performance counters
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports no success.
    pub fn reset_performance_metrics(&self) -> McpResult<()> {
        let result = self.request_value("reset_performance_metrics", None)?;
        if result.get("success").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(McpError::internal("Server did not reset metrics"))
        }
    }
}
