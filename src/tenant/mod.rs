use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::middleware::authenticate::AuthUser;

pub mod directory;

pub use directory::{PgTenantDirectory, StaticTenantDirectory, TenantDirectory};

/// A tenant (school/organization) whose data lives in its own Postgres
/// schema. Read on every request that needs tenant context; never mutated
/// by the resolution layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub schema_name: String,
    pub name: String,
}

/// Errors from tenant resolution and the scoped-connection lifecycle.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Unsafe schema name: {0}")]
    UnsafeSchemaName(String),

    #[error("Scoped connection already released")]
    ConnectionReleased,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Validate a schema name before it is ever interpolated into SQL.
///
/// This is a security boundary, not a formatting concern: an unsafe name
/// aborts the request instead of being sanitized. Alphanumeric and
/// underscore only, within the Postgres identifier length limit.
pub fn is_safe_schema_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Determine the tenant hint for a request. First non-empty source wins:
///
/// 1. tenant id embedded in the authenticated identity's credential
/// 2. explicit tenant-id header
/// 3. leftmost host label, when the host has at least three dot-separated
///    labels (subdomain convention)
pub fn tenant_hint(
    auth: Option<&AuthUser>,
    headers: &HeaderMap,
    tenant_header: &str,
) -> Option<String> {
    if let Some(tenant_id) = auth.and_then(|u| u.tenant_id.as_deref()) {
        if !tenant_id.is_empty() {
            return Some(tenant_id.to_string());
        }
    }

    if let Some(value) = headers.get(tenant_header).and_then(|v| v.to_str().ok()) {
        if !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }

    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(subdomain_hint)
}

/// Extract a tenant identifier from a host name's leftmost label.
/// A bare domain ("school.test") or single-label host yields no hint.
fn subdomain_hint(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return None;
    }
    let first = labels[0].trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
