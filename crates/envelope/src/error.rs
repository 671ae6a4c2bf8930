use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("route rewrite rejected: {reason}")]
    RoutePrefixViolation { reason: String },

    #[error("envelope {id} is already in a terminal state ({status}); update rejected")]
    AlreadyTerminal { id: String, status: String },

    #[error("fan-out requires at least one child payload")]
    EmptyFanOut,

    #[error("invalid envelope: {0}")]
    Invalid(String),
}
