use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, PgPool, Postgres};

use crate::tenant::{is_safe_schema_name, TenantError};

/// A connection checked out from the pool and scoped to one tenant's schema
/// for the lifetime of a single request.
///
/// Unqualified table references on this connection resolve inside the tenant
/// schema, falling back to the shared `public` schema for cross-tenant
/// lookups. The connection is exclusively owned by its request; it must
/// never be shared across requests or reused for another tenant without a
/// reset.
///
/// Release happens exactly once: `release()` resets `search_path` and hands
/// the connection back to the pool, and is a no-op on any later call. If the
/// request future is dropped before release (client disconnect), the
/// connection still returns to the pool via `Drop`, and the pool's
/// `after_release` hook performs the schema reset instead.
pub struct ScopedConnection {
    conn: Option<PoolConnection<Postgres>>,
    schema: String,
}

/// `search_path` statement for a tenant schema. The schema name must have
/// passed `is_safe_schema_name`; quoting is kept as a second layer.
pub(crate) fn scope_search_path_sql(schema: &str) -> String {
    format!("SET search_path TO {}, public", quote_identifier(schema))
}

pub(crate) fn reset_search_path_sql(default_schema: &str) -> String {
    format!("SET search_path TO {}", quote_identifier(default_schema))
}

/// Quote a SQL identifier to prevent injection.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ScopedConnection {
    /// Check out a connection and point its session at `schema`.
    ///
    /// Fails closed before touching the pool when the schema name is unsafe.
    pub async fn scope(pool: &PgPool, schema: &str) -> Result<Self, TenantError> {
        if !is_safe_schema_name(schema) {
            return Err(TenantError::UnsafeSchemaName(schema.to_string()));
        }

        let mut conn = pool.acquire().await?;
        conn.execute(scope_search_path_sql(schema).as_str()).await?;

        Ok(Self {
            conn: Some(conn),
            schema: schema.to_string(),
        })
    }

    /// Construct an already-released placeholder scoped to `schema`.
    ///
    /// Used by tests that need tenant context present without a live
    /// database; `handle()` returns `ConnectionReleased` until a real
    /// connection is scoped.
    pub fn released(schema: impl Into<String>) -> Self {
        Self {
            conn: None,
            schema: schema.into(),
        }
    }

    /// The schema this connection is scoped to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Borrow the underlying connection for queries.
    pub fn handle(&mut self) -> Result<&mut PgConnection, TenantError> {
        self.conn.as_deref_mut().ok_or(TenantError::ConnectionReleased)
    }

    /// Reset the session schema and return the connection to the pool.
    ///
    /// Idempotent: the first call performs the reset, every later call is a
    /// no-op, so the finalizer can run unconditionally on any terminal
    /// request event without double-releasing.
    pub async fn release(&mut self) -> Result<(), TenantError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        conn.execute(reset_search_path_sql("public").as_str()).await?;
        // Dropping the PoolConnection returns it to the pool.
        Ok(())
    }
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("schema", &self.schema)
            .field("released", &self.conn.is_none())
            .finish()
    }
}
