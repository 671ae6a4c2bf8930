//! Client for invoking the actor runtime over its Unix domain socket, and
//! the pure classification logic that turns its response into a routing
//! decision.

pub mod classify;
pub mod client;
pub mod error;

pub use classify::{classify_response, ResponseClassification};
pub use client::RuntimeClient;
pub use error::RuntimeError;
