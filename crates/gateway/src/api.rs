//! The gateway's HTTP surface: MCP, the REST tool-call shortcut, envelope
//! lookups, the SSE stream, and the two write-backs actors/sidecars use to
//! report progress and end-actor-mode results.

use std::convert::Infallible;
use std::sync::Arc;

use asya_envelope::{Envelope, EnvelopeState, EnvelopeStatus};
use asya_mcp::{JsonRpcRequest, JsonRpcResponse, McpServer};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::dispatch_tool_call;
use crate::error::GatewayError;
use crate::mcp_backend::GatewayMcpBackend;
use crate::sse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    /// Included for parity with the wire shape the sidecar posts; the path
    /// parameter is authoritative.
    #[serde(default)]
    pub id: Option<String>,
    pub actor: String,
    #[serde(default)]
    pub current_actor_idx: Option<usize>,
    pub status: EnvelopeState,
    #[serde(default)]
    pub message: Option<String>,
    /// Advisory only — the store always recomputes the authoritative
    /// percent from the envelope's own route position.
    #[serde(default)]
    pub progress_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FinalRequest {
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_reachable: bool,
    pub transport_reachable: bool,
}

/// Dispatches a single MCP JSON-RPC request. Each call builds a fresh
/// [`McpServer`] around the tool backend: an HTTP request is a single
/// connection as far as MCP is concerned, so there's no `initialize`
/// handshake state worth keeping between requests.
#[utoipa::path(post, path = "/mcp", tag = "MCP", responses((status = 200)))]
pub async fn mcp(State(state): State<Arc<AppState>>, Json(request): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
    let backend = Arc::new(GatewayMcpBackend::new(state));
    let mut server = McpServer::new(backend).with_name("asya-gateway");
    Json(server.handle_request(&request).await)
}

/// REST shortcut for `tools/call`: returns the materialized envelope
/// directly rather than an MCP `CallToolResult` wrapper.
#[utoipa::path(post, path = "/tools/call", tag = "Tools", responses((status = 201)))]
pub async fn tools_call(State(state): State<Arc<AppState>>, Json(request): Json<ToolCallRequest>) -> Result<impl IntoResponse, GatewayError> {
    let envelope = dispatch_tool_call(&state, &request.name, request.arguments).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[utoipa::path(get, path = "/envelopes/{id}", tag = "Envelopes", responses((status = 200), (status = 404)))]
pub async fn get_envelope(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Envelope>, GatewayError> {
    let envelope = state.store.get(&state.shutdown, &id).await?.ok_or(GatewayError::NotFound(id))?;
    Ok(Json(envelope))
}

#[utoipa::path(get, path = "/envelopes/{id}/stream", tag = "Envelopes", responses((status = 200), (status = 404)))]
pub async fn stream_envelope(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    sse::bridge(state, id).await
}

/// Fire-and-forget progress write-back. Never fails the sidecar's own
/// pipeline — errors here are swallowed by the caller and only surface in
/// this process's logs — but still reports them over HTTP for visibility.
#[utoipa::path(post, path = "/envelopes/{id}/progress", tag = "Envelopes", responses((status = 202), (status = 404), (status = 409)))]
pub async fn post_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    state.store.update_progress(&state.shutdown, &id, &body.actor, body.status, body.message).await?;
    Ok(StatusCode::ACCEPTED)
}

/// End-actor mode: an actor that is itself the last hop posts its result
/// straight to the gateway instead of going through a sidecar's terminal
/// queue publish.
#[utoipa::path(post, path = "/envelopes/{id}/final", tag = "Envelopes", responses((status = 200), (status = 404), (status = 409)))]
pub async fn post_final(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FinalRequest>,
) -> Result<Json<Envelope>, GatewayError> {
    let envelope = state.store.complete(&state.shutdown, &id, body.status, body.result, body.error).await?;
    Ok(Json(envelope))
}

#[utoipa::path(get, path = "/health", tag = "Health", responses((status = 200), (status = 503)))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_reachable = state.store.get(&state.shutdown, "__gateway_health_check__").await.is_ok();
    let transport_reachable = state.transport.health_check(&state.config.step_happy_end).await.is_ok();
    let status = if store_reachable && transport_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if status == StatusCode::OK { "ok" } else { "degraded" },
            store_reachable,
            transport_reachable,
        }),
    )
}
