use thiserror::Error;

/// Error taxonomy shared across binaries for conditions that don't belong
/// to any single crate's own error enum (config loading, process wiring).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
