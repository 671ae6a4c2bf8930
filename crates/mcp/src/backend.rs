//! The seam between MCP's wire protocol and whatever actually runs a tool.
//!
//! In the teacher's MCP crate, `tools/call` dispatched straight into a
//! local `ToolRegistry`. Here a tool name names an actor route instead of
//! executable code, so `tools/call` has to build an envelope, publish it,
//! and (depending on the call) wait for or return its outcome. The gateway
//! crate owns all of that; this crate only needs the seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;
use crate::types::{CallToolResult, ToolInfo};

/// Implemented by whatever fulfills `tools/list` and `tools/call` —
/// the gateway, in production; an in-memory stand-in, in tests.
#[async_trait]
pub trait McpToolBackend: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolInfo>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;
}
