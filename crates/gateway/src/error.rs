//! Gateway-wide error type, mapped to HTTP status codes at the API edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("store error: {0}")]
    Store(#[from] asya_store::StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] asya_transport::TransportError),

    #[error("envelope error: {0}")]
    Envelope(#[from] asya_envelope::EnvelopeError),

    #[error("envelope not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Invalid(_) => StatusCode::BAD_REQUEST,
            GatewayError::Store(asya_store::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Store(asya_store::StoreError::AlreadyTerminal(_)) => StatusCode::CONFLICT,
            GatewayError::Store(asya_store::StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
