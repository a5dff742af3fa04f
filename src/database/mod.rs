use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

pub mod scoped;

pub use scoped::ScopedConnection;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Build the shared connection pool for the single physical database.
///
/// The pool carries an `after_release` hook that resets `search_path` to a
/// neutral default whenever a connection returns to the pool. The request
/// finalizer already does this explicitly; the hook covers the case where a
/// connection is dropped without finalizing (e.g. a client disconnects
/// mid-request), so the next borrower always starts from a known schema.
pub async fn connect(config: &AppConfig) -> Result<PgPool, DatabaseError> {
    let url =
        std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

    let default_schema = config.tenancy.default_schema.clone();
    let reset = scoped::reset_search_path_sql(&default_schema);

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .after_release(move |conn, _meta| {
            let reset = reset.clone();
            Box::pin(async move {
                conn.execute(reset.as_str()).await?;
                Ok(true)
            })
        })
        .connect(&url)
        .await?;

    tracing::info!("Connected database pool ({} max connections)", config.database.max_connections);
    Ok(pool)
}

/// Pings the pool to ensure connectivity.
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
