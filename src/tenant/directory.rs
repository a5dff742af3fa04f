use async_trait::async_trait;
use sqlx::PgPool;

use super::{Tenant, TenantError};

/// Resolves an opaque tenant identifier (id, subdomain, or header value) to
/// a tenant record from the shared/global schema.
///
/// A trait so the resolution middleware can be exercised in tests without a
/// database. Lookup failures propagate; tenant lookup is assumed fast and
/// reliable, and retrying here would mask real misconfiguration.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find(&self, identifier: &str) -> Result<Option<Tenant>, TenantError>;
}

/// Directory backed by the `tenants` table in the shared schema.
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find(&self, identifier: &str) -> Result<Option<Tenant>, TenantError> {
        let query = r#"
            SELECT id, schema_name, name
            FROM public.tenants
            WHERE (id = $1 OR subdomain = $1)
            AND is_active = true
            AND deleted_at IS NULL
        "#;

        let tenant = sqlx::query_as::<_, Tenant>(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tenant)
    }
}

/// Fixed in-memory directory for tests. Matches on tenant id only.
#[derive(Default)]
pub struct StaticTenantDirectory {
    tenants: Vec<Tenant>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self { tenants }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn find(&self, identifier: &str) -> Result<Option<Tenant>, TenantError> {
        Ok(self.tenants.iter().find(|t| t.id == identifier).cloned())
    }
}
