use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::config::AppConfig;
use crate::tenant::TenantDirectory;

/// Explicitly constructed application services, passed to the router and
/// middleware instead of living in module-level singletons. One instance per
/// process in production; tests build their own with in-memory doubles.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub directory: Arc<dyn TenantDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        directory: Arc<dyn TenantDirectory>,
        audit: Arc<dyn AuditSink>,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            directory,
            audit,
            config: Arc::new(config),
        }
    }
}
