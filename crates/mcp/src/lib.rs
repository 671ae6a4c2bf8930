//! MCP (Model Context Protocol) surface for the gateway.
//!
//! Implements JSON-RPC 2.0 framing and the `initialize` / `tools/list` /
//! `tools/call` methods. Tool execution itself is delegated to whatever
//! implements [`McpToolBackend`] — in production, the gateway's envelope
//! dispatcher; in tests, a stub.
//!
//! - **types**: JSON-RPC 2.0 and MCP wire types
//! - **transport**: pluggable message transport (stdio, channels)
//! - **backend**: the seam to envelope dispatch
//! - **server**: the JSON-RPC request/response handler
//! - **error**: unified error type

pub mod backend;
pub mod error;
pub mod server;
pub mod transport;
pub mod types;

pub use backend::McpToolBackend;
pub use error::McpError;
pub use server::McpServer;
pub use transport::{ChannelTransport, McpTransport, StdioTransport};
pub use types::*;
