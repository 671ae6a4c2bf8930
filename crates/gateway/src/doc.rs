//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "asya-gateway", version = "0.1.0", description = "Envelope store, stream, and MCP tool surface for Asya workflows."),
    tags(
        (name = "MCP", description = "Model Context Protocol JSON-RPC endpoint"),
        (name = "Tools", description = "REST shortcut for tool invocation"),
        (name = "Envelopes", description = "Envelope lookup, SSE streaming, and sidecar/actor write-backs"),
        (name = "Health", description = "Store and transport connectivity"),
    ),
    paths(
        crate::api::mcp,
        crate::api::tools_call,
        crate::api::get_envelope,
        crate::api::stream_envelope,
        crate::api::post_progress,
        crate::api::post_final,
        crate::api::health,
    )
)]
pub struct ApiDoc;
