use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::audit::UnauthorizedAttempt;
use crate::error::ApiError;
use crate::middleware::authenticate::AuthUser;
use crate::middleware::tenant_resolver::TenantContext;
use crate::state::AppState;

/// Defense-in-depth tenant isolation guard.
///
/// Runs after the resolution middleware and independently validates that the
/// resolved tenant matches the authenticated identity's own tenant binding.
/// This guard never resolves tenant context itself; a non-superuser reaching
/// it without context is rejected outright.
pub async fn tenant_isolation_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let ctx = request.extensions().get::<TenantContext>().cloned();

    if auth.role.is_superuser() {
        // Superusers bypass the match check, but when they did target a
        // tenant we opportunistically verify the session really points at
        // that tenant's schema. A mismatch here is a bug in the resolution
        // layer, not a malicious request, so it is logged and never fatal.
        if let Some(ctx) = &ctx {
            search_path_probe(ctx).await;
        }
        return Ok(next.run(request).await);
    }

    let Some(ctx) = ctx else {
        return Err(ApiError::tenant_context_required(
            "Tenant context is required for this request",
        ));
    };

    if let Err(err) = verify_tenant_match(&auth, &ctx.tenant.id) {
        state
            .audit
            .log_unauthorized_attempt(UnauthorizedAttempt {
                user_id: Some(auth.id),
                path: request.uri().path().to_string(),
                method: request.method().to_string(),
                reason: "tenant mismatch".to_string(),
                details: json!({
                    "identity_tenant": auth.tenant_id,
                    "request_tenant": ctx.tenant.id,
                }),
            })
            .await;
        return Err(err);
    }

    // Idempotent pass-through: context stays attached unchanged.
    Ok(next.run(request).await)
}

/// Reject when the identity's own tenant binding differs from the resolved
/// tenant. Identities without a binding (none yet issued) pass; the
/// resolution layer already constrained what they can reach.
fn verify_tenant_match(auth: &AuthUser, resolved_tenant_id: &str) -> Result<(), ApiError> {
    if let Some(claimed) = auth.tenant_id.as_deref() {
        if claimed != resolved_tenant_id {
            tracing::warn!(
                user_id = %auth.id,
                identity_tenant = %claimed,
                request_tenant = %resolved_tenant_id,
                "tenant mismatch"
            );
            return Err(ApiError::tenant_mismatch(
                "Authenticated tenant does not match the requested tenant",
            ));
        }
    }
    Ok(())
}

/// Consistency probe: compare the scoped connection's live `search_path`
/// against the resolved tenant's schema. Log-only by design; no data has
/// been exposed by the probe itself.
async fn search_path_probe(ctx: &TenantContext) {
    let mut scoped = ctx.conn.lock().await;
    let conn = match scoped.handle() {
        Ok(conn) => conn,
        Err(_) => {
            tracing::debug!("search_path probe skipped: connection already released");
            return;
        }
    };

    match sqlx::query_scalar::<_, String>("SHOW search_path")
        .fetch_one(conn)
        .await
    {
        Ok(path) if path.contains(ctx.tenant.schema_name.as_str()) => {}
        Ok(path) => {
            tracing::warn!(
                expected = %ctx.tenant.schema_name,
                actual = %path,
                "scoped connection search_path does not match resolved tenant"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "search_path consistency probe failed");
        }
    }
}
