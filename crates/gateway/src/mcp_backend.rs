//! Implements [`McpToolBackend`] on top of the envelope dispatcher, so the
//! same tool catalog serves both `POST /mcp` and `POST /tools/call`.

use std::sync::Arc;

use async_trait::async_trait;
use asya_mcp::{CallToolResult, McpError, McpToolBackend, ToolInfo};
use serde_json::{json, Value};

use crate::dispatch::dispatch_tool_call;
use crate::error::GatewayError;
use crate::state::AppState;

pub struct GatewayMcpBackend {
    state: Arc<AppState>,
}

impl GatewayMcpBackend {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl McpToolBackend for GatewayMcpBackend {
    async fn list_tools(&self) -> Vec<ToolInfo> {
        self.state.catalog.list()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        match dispatch_tool_call(&self.state, name, arguments).await {
            Ok(envelope) => Ok(CallToolResult::text(json!({"envelope_id": envelope.id}).to_string())),
            Err(GatewayError::Invalid(msg)) => Err(McpError::InvalidParams(msg)),
            Err(err) => Err(McpError::DispatchFailed(err.to_string())),
        }
    }
}
