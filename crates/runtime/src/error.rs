use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to actor socket {path}: {source}")]
    Connect { path: String, #[source] source: std::io::Error },

    #[error("write to actor socket failed: {0}")]
    Write(std::io::Error),

    #[error("read from actor socket failed: {0}")]
    Read(std::io::Error),

    #[error("actor call timed out after {0}ms")]
    Timeout(u64),

    #[error("actor response was not valid JSON: {0}")]
    InvalidResponse(String),

    #[error("operation cancelled")]
    ContextCancelled,
}
