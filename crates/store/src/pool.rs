//! Postgres connection pool setup and migration runner.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use asya_core::config::PostgresConfig;

use crate::error::StoreError;

/// Connects to Postgres and applies pending migrations.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let url = config.connection_string();
    info!(host = %config.host, database = %config.database, "connecting to PostgreSQL");

    let pool = PgPoolOptions::new().max_connections(config.max_connections).connect(&url).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("envelope store migrations applied");

    Ok(pool)
}
