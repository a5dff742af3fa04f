use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::database::ScopedConnection;
use crate::error::ApiError;
use crate::middleware::authenticate::AuthUser;
use crate::state::AppState;
use crate::tenant::{is_safe_schema_name, tenant_hint, Tenant};

/// Per-request tenant context: the resolved tenant record plus the pooled
/// connection scoped to its schema. Constructed once by the resolution
/// middleware and treated as immutable downstream.
///
/// Only the resolution middleware may populate this; the re-entrancy guard
/// relies on any pre-existing context having been validated by this same
/// logic.
#[derive(Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub conn: Arc<Mutex<ScopedConnection>>,
}

/// Tenant resolution middleware. Establishes `TenantContext` before any
/// handler or authorization gate runs, and guarantees the scoped connection
/// is reset and released when the request finishes.
///
/// Missing or unresolvable tenant context is fatal for non-superusers.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    resolve(state, request, next, false).await
}

/// Variant that tolerates missing tenant context: the request proceeds
/// without a `TenantContext` instead of being rejected. For routes that can
/// serve both tenant-scoped and platform-level callers.
pub async fn resolve_tenant_optional(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    resolve(state, request, next, true).await
}

async fn resolve(
    state: AppState,
    mut request: Request,
    next: Next,
    optional: bool,
) -> Result<Response, ApiError> {
    // Re-entrancy guard: context already established earlier in the chain
    if request.extensions().get::<TenantContext>().is_some() {
        return Ok(next.run(request).await);
    }

    let auth = request.extensions().get::<AuthUser>().cloned();
    let is_superuser = auth.as_ref().map(|u| u.role.is_superuser()).unwrap_or(false);

    let hint = tenant_hint(
        auth.as_ref(),
        request.headers(),
        &state.config.tenancy.tenant_header,
    );

    let Some(hint) = hint else {
        if is_superuser || optional {
            // Platform-level caller with no tenant binding: proceed without
            // tenant context and without holding a connection.
            return Ok(next.run(request).await);
        }
        return Err(ApiError::tenant_context_required(
            "Tenant context is required for this request",
        ));
    };

    let tenant = match state.directory.find(&hint).await.map_err(ApiError::from)? {
        Some(tenant) => tenant,
        None => {
            if is_superuser || optional {
                tracing::debug!(hint = %hint, "tenant hint did not resolve; continuing without tenant context");
                return Ok(next.run(request).await);
            }
            return Err(ApiError::not_found(format!("Tenant '{}' not found", hint)));
        }
    };

    // Security boundary: abort before any SQL if the stored schema name is
    // not a safe identifier. Never sanitize.
    if !is_safe_schema_name(&tenant.schema_name) {
        return Err(ApiError::from(crate::tenant::TenantError::UnsafeSchemaName(
            tenant.schema_name.clone(),
        )));
    }

    let scoped = ScopedConnection::scope(&state.pool, &tenant.schema_name)
        .await
        .map_err(ApiError::from)?;
    let conn = Arc::new(Mutex::new(scoped));

    tracing::debug!(tenant_id = %tenant.id, schema = %tenant.schema_name, "tenant resolved");

    request.extensions_mut().insert(TenantContext {
        tenant: tenant.clone(),
        conn: Arc::clone(&conn),
    });

    let response = next.run(request).await;

    // Finalize on every terminal path that reaches here: normal completion
    // and handler errors (both produce a response). If the client
    // disconnects and this future is dropped instead, the connection
    // returns to the pool via Drop and the pool's after_release hook
    // resets its schema. release() itself is idempotent, so at most one
    // reset ever runs.
    {
        let mut scoped = conn.lock().await;
        if let Err(e) = scoped.release().await {
            tracing::error!(tenant_id = %tenant.id, error = %e, "failed to release scoped connection");
        }
    }

    Ok(response)
}
