use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("envelope not found: {0}")]
    NotFound(String),

    #[error("envelope {0} is already terminal; update rejected")]
    AlreadyTerminal(String),

    #[error("invalid envelope state: {0}")]
    Invalid(String),

    #[error("operation cancelled")]
    ContextCancelled,
}
