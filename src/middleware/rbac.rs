use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, RawPathParams, Request, State},
    middleware::Next,
    response::Response,
};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::UnauthorizedAttempt;
use crate::auth::{role_has_permission, Role};
use crate::error::ApiError;
use crate::middleware::authenticate::AuthUser;
use crate::middleware::tenant_resolver::TenantContext;
use crate::state::AppState;

/// Gates buffer at most this much body when extracting a target field.
const MAX_EXTRACT_BODY_BYTES: usize = 256 * 1024;

type GateFuture = BoxFuture<'static, Result<Response, ApiError>>;

/// Role gate: passes when the primary role is in the allowed set, or when
/// the set admits `admin` and the caller is admin or the platform superuser
/// (superadmin implicitly satisfies any admin-gated route).
///
/// Unauthenticated callers get 401, not 403. Every denial is audited.
pub fn require_role(
    allowed: &'static [Role],
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(async move {
            let user = authenticated(&request)?;

            if role_allows(user.role, allowed) {
                return Ok(next.run(request).await);
            }

            let allowed_names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
            audit_denial(
                &state,
                &user,
                request.uri().path().to_string(),
                request.method().to_string(),
                "role not permitted".to_string(),
                json!({ "role": user.role, "allowed": allowed_names }),
            )
            .await;

            Err(ApiError::forbidden(
                "You do not have permission to perform this action",
            ))
        })
    }
}

/// Fine-grained permission gate over the static role table.
pub fn require_permission(
    permission: &'static str,
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(async move {
            let user = authenticated(&request)?;

            if role_has_permission(user.role, permission) {
                return Ok(next.run(request).await);
            }

            audit_denial(
                &state,
                &user,
                request.uri().path().to_string(),
                request.method().to_string(),
                format!("missing permission {}", permission),
                json!({ "role": user.role, "permission": permission }),
            )
            .await;

            Err(ApiError::forbidden(
                "You do not have permission to perform this action",
            ))
        })
    }
}

/// Logical OR over permission lookups.
pub fn require_any_permission(
    permissions: &'static [&'static str],
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    permission_gate(permissions, PermissionMode::Any)
}

/// Logical AND over permission lookups.
pub fn require_all_permissions(
    permissions: &'static [&'static str],
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    permission_gate(permissions, PermissionMode::All)
}

#[derive(Clone, Copy)]
enum PermissionMode {
    Any,
    All,
}

fn permission_gate(
    permissions: &'static [&'static str],
    mode: PermissionMode,
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(async move {
            let user = authenticated(&request)?;

            let granted = match mode {
                PermissionMode::Any => permissions
                    .iter()
                    .any(|p| role_has_permission(user.role, p)),
                PermissionMode::All => permissions
                    .iter()
                    .all(|p| role_has_permission(user.role, p)),
            };
            if granted {
                return Ok(next.run(request).await);
            }

            audit_denial(
                &state,
                &user,
                request.uri().path().to_string(),
                request.method().to_string(),
                format!("missing permission(s): {}", permissions.join(", ")),
                json!({ "role": user.role, "permissions": permissions }),
            )
            .await;

            Err(ApiError::forbidden(
                "You do not have permission to perform this action",
            ))
        })
    }
}

/// Self-or-permission gate: the resource owner always passes; anyone else
/// needs the stated permission.
///
/// The target identifier is extracted under `id_param` with explicit
/// precedence: route params, then JSON body, then query string. A request
/// with no target id in any source fails fast with 400 before any
/// permission is evaluated.
pub fn require_self_or_permission(
    permission: Option<&'static str>,
    id_param: &'static str,
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(async move {
            let user = authenticated(&request)?;

            if user.role.is_superuser() {
                return Ok(next.run(request).await);
            }

            let has_tenant_context = request.extensions().get::<TenantContext>().is_some();
            let path = request.uri().path().to_string();
            let method = request.method().to_string();

            let (request, target) = extract_target_field(request, id_param).await?;
            let Some(target) = target else {
                return Err(ApiError::missing_target_id(format!(
                    "Missing target id '{}' in request",
                    id_param
                )));
            };

            if is_self(&user, &target) {
                return Ok(next.run(request).await);
            }

            if let Some(permission) = permission {
                if role_has_permission(user.role, permission) {
                    return Ok(next.run(request).await);
                }
            }

            // The check cannot complete meaningfully without tenant context;
            // report that as its own error kind rather than a generic deny.
            if !has_tenant_context {
                return Err(ApiError::tenant_context_missing(
                    "Tenant context is missing for this request",
                ));
            }

            let reason = match permission {
                Some(p) => format!("not resource owner and missing permission {}", p),
                None => "not resource owner".to_string(),
            };
            state
                .audit
                .log_unauthorized_attempt(UnauthorizedAttempt {
                    user_id: Some(user.id),
                    path,
                    method,
                    reason,
                    details: json!({ "role": user.role, "target_id": target }),
                })
                .await;

            Err(ApiError::forbidden(
                "You do not have permission to access this resource",
            ))
        })
    }
}

/// Passes iff the caller is exactly the platform superuser.
pub async fn require_superuser(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticated(&request)?;

    if user.role == Role::Superadmin {
        return Ok(next.run(request).await);
    }

    audit_denial(
        &state,
        &user,
        request.uri().path().to_string(),
        request.method().to_string(),
        "superadmin role required".to_string(),
        json!({ "role": user.role }),
    )
    .await;

    Err(ApiError::forbidden("Superadmin role required"))
}

/// Role-hierarchy gate for endpoints that assign a role to another user.
///
/// Extracts the target role under `role_field` (params, then body, then
/// query). Absent field: no-op. The actor may only assign a role whose
/// level is strictly below their own; superadmin bypasses entirely.
pub fn enforce_role_hierarchy(
    role_field: &'static str,
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + 'static {
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(async move {
            let user = authenticated(&request)?;

            if user.role.is_superuser() {
                return Ok(next.run(request).await);
            }

            let path = request.uri().path().to_string();
            let method = request.method().to_string();

            let (request, target) = extract_target_field(request, role_field).await?;
            let Some(raw) = target else {
                // Nothing being assigned; nothing to enforce
                return Ok(next.run(request).await);
            };

            let target_role: Role = raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Unknown role '{}'", raw)))?;

            if !user.role.can_assign(target_role) {
                state
                    .audit
                    .log_unauthorized_attempt(UnauthorizedAttempt {
                        user_id: Some(user.id),
                        path,
                        method,
                        reason: "role hierarchy violation".to_string(),
                        details: json!({
                            "role": user.role,
                            "attempted_role": target_role,
                            "user_level": user.role.level(),
                            "target_level": target_role.level(),
                        }),
                    })
                    .await;

                return Err(ApiError::forbidden(
                    "Cannot assign role equal to or higher than your own",
                ));
            }

            Ok(next.run(request).await)
        })
    }
}

fn authenticated(request: &Request) -> Result<AuthUser, ApiError> {
    request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

fn role_allows(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
        || (allowed.contains(&Role::Admin) && matches!(role, Role::Admin | Role::Superadmin))
}

fn is_self(user: &AuthUser, target: &str) -> bool {
    match Uuid::parse_str(target) {
        Ok(target_id) => target_id == user.id,
        Err(_) => false,
    }
}

async fn audit_denial(
    state: &AppState,
    user: &AuthUser,
    path: String,
    method: String,
    reason: String,
    details: Value,
) {
    state
        .audit
        .log_unauthorized_attempt(UnauthorizedAttempt {
            user_id: Some(user.id),
            path,
            method,
            reason,
            details,
        })
        .await;
}

/// Extract a field value with explicit precedence: route params, then JSON
/// body, then query string. The body is buffered and reattached so the
/// downstream extractors still see it.
async fn extract_target_field(
    request: Request,
    field: &str,
) -> Result<(Request, Option<String>), ApiError> {
    let (mut parts, body) = request.into_parts();

    let mut found = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(params) => params
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.to_string()),
        Err(_) => None,
    };

    let bytes = to_bytes(body, MAX_EXTRACT_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Request body too large"))?;

    if found.is_none() && !bytes.is_empty() {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            found = json_field_string(&value, field);
        }
    }

    if found.is_none() {
        if let Some(query) = parts.uri.query() {
            found = url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == field)
                .map(|(_, value)| value.into_owned());
        }
    }

    Ok((Request::from_parts(parts, Body::from(bytes)), found))
}

fn json_field_string(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
