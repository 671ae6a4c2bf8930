//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::doc::ApiDoc;
use crate::state::AppState;

/// Builds the complete application router: the MCP/tool-call/envelope
/// surface, CORS, and the Scalar-served OpenAPI docs at `/docs`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.core.server.cors_origin == "*" {
        CorsLayer::permissive()
    } else {
        let origin: axum::http::HeaderValue =
            state.config.core.server.cors_origin.parse().expect("CORS_ORIGIN must be a valid header value");
        CorsLayer::new().allow_origin(origin)
    };

    let app = Router::new()
        .route("/mcp", post(api::mcp))
        .route("/tools/call", post(api::tools_call))
        .route("/envelopes/{id}", get(api::get_envelope))
        .route("/envelopes/{id}/stream", get(api::stream_envelope))
        .route("/envelopes/{id}/progress", post(api::post_progress))
        .route("/envelopes/{id}/final", post(api::post_final))
        .route("/health", get(api::health));

    app.layer(cors).with_state(state).merge(Scalar::with_url("/docs", ApiDoc::openapi()))
}
