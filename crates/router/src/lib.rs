//! The per-actor sidecar: `asya-router`.
//!
//! One process serves exactly one actor. It pulls envelopes off that
//! actor's queue, drives the actor's handler over a local socket, classifies
//! the response, and publishes the result to the next hop or a terminal
//! queue (see [`pump`]).

pub mod config;
pub mod error;
pub mod progress;
pub mod pump;

pub use config::RouterConfig;
pub use error::RouterError;
pub use progress::ProgressReporter;
pub use pump::Pump;
