//! `asya-gateway` — the envelope store & stream service.
//!
//! Exposes the MCP tool surface, materializes and dispatches tool calls as
//! envelopes, serves envelope state and SSE streams, accepts progress and
//! end-actor-mode write-backs, and folds terminal queue traffic back into
//! the store.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod doc;
pub mod error;
pub mod mcp_backend;
pub mod result_consumer;
pub mod router;
pub mod sse;
pub mod state;
pub mod tool_catalog;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use state::AppState;
pub use tool_catalog::ToolCatalog;
