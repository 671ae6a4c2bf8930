//! MCP server implementation.
//!
//! Wraps an [`McpToolBackend`] and exposes it over the MCP protocol,
//! handling JSON-RPC requests and dispatching them to the backend.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::McpToolBackend;
use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

pub struct McpServer {
    backend: Arc<dyn McpToolBackend>,
    server_name: String,
    server_version: String,
    initialized: bool,
}

impl McpServer {
    pub fn new(backend: Arc<dyn McpToolBackend>) -> Self {
        Self {
            backend,
            server_name: "asya-gateway".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            initialized: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Runs the server loop, reading from and writing to the transport
    /// until it closes.
    pub async fn run<T: McpTransport>(&mut self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, "MCP server starting");

        loop {
            let line = match transport.receive().await? {
                Some(line) => line,
                None => {
                    tracing::info!("transport closed, shutting down");
                    break;
                }
            };

            let raw: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    let resp = JsonRpcResponse::error(RpcId::Number(0), error_codes::PARSE_ERROR, e.to_string());
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            if raw.get("id").is_none() {
                if let Ok(notif) = serde_json::from_value::<JsonRpcNotification>(raw) {
                    self.handle_notification(&notif);
                }
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_value(raw) {
                Ok(req) => req,
                Err(e) => {
                    let resp = JsonRpcResponse::error(RpcId::Number(0), error_codes::PARSE_ERROR, e.to_string());
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            let response = self.handle_request(&request).await;
            transport.send(&serde_json::to_string(&response)?).await?;
        }

        Ok(())
    }

    /// Handles a single JSON-RPC request. Exposed directly so an HTTP
    /// transport (one request per connection, no persistent loop) can skip
    /// `run` entirely.
    pub async fn handle_request(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, &request.params),
            "tools/list" => self.handle_list_tools(id).await,
            "tools/call" => self.handle_call_tool(id, &request.params).await,
            method => {
                let err = McpError::MethodNotFound(method.to_string());
                JsonRpcResponse::error(id, err.to_rpc_error().code, err.to_string())
            }
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => tracing::info!("client confirmed initialization"),
            "notifications/cancelled" => tracing::debug!("client cancelled a request"),
            method => tracing::debug!(method = %method, "unknown notification, ignoring"),
        }
    }

    fn handle_initialize(&mut self, id: RpcId, _params: &Option<Value>) -> JsonRpcResponse {
        self.initialized = true;
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities { tools: Some(ToolsCapability { list_changed: false }) },
            server_info: ServerInfo { name: self.server_name.clone(), version: Some(self.server_version.clone()) },
        };
        JsonRpcResponse::success(id, serde_json::to_value(result).expect("InitializeResult always serializes"))
    }

    async fn handle_list_tools(&self, id: RpcId) -> JsonRpcResponse {
        let tools = self.backend.list_tools().await;
        let result = ListToolsResult { tools };
        JsonRpcResponse::success(id, serde_json::to_value(result).expect("ListToolsResult always serializes"))
    }

    async fn handle_call_tool(&self, id: RpcId, params: &Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => {
                let err = McpError::InvalidParams("missing params".to_string());
                return JsonRpcResponse::error(id, err.to_rpc_error().code, err.to_string());
            }
        };

        let call_params: CallToolParams = match serde_json::from_value(params.clone()) {
            Ok(p) => p,
            Err(e) => {
                let err = McpError::InvalidParams(e.to_string());
                return JsonRpcResponse::error(id, err.to_rpc_error().code, err.to_string());
            }
        };

        let result = match self.backend.call_tool(&call_params.name, call_params.arguments).await {
            Ok(result) => result,
            Err(e) => return JsonRpcResponse::error(id, e.to_rpc_error().code, e.to_string()),
        };

        JsonRpcResponse::success(id, serde_json::to_value(result).expect("CallToolResult always serializes"))
    }
}
