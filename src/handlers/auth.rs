use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::{effective_permissions, generate_token, AdditionalRoleGrant, Claims, Role};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, TenantContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Value,
    pub expires_in: u64,
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: Uuid,
    tenant_id: Option<String>,
    role: String,
    email: String,
    password_hash: String,
}

/// POST /auth/login - verify credentials against the shared-schema users
/// table and issue a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, tenant_id, role, email, password_hash
        FROM public.users
        WHERE email = $1
        AND deleted_at IS NULL
        "#,
    )
    .bind(&req.email)
    .fetch_optional(&state.pool)
    .await
    .map_err(ApiError::from)?;

    let row = row.ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if hash_password(&req.password) != row.password_hash {
        tracing::warn!(email = %req.email, "login failed: bad credentials");
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let role = Role::from_str(&row.role).map_err(|_| {
        tracing::error!(user_id = %row.id, role = %row.role, "user row carries unknown role");
        ApiError::internal_server_error("An error occurred while processing your request")
    })?;

    let expiry_hours = state.config.security.jwt_expiry_hours;
    let claims = Claims::new(row.id, row.tenant_id.clone(), role, row.email.clone(), expiry_hours);
    let token = generate_token(&claims, &state.config.security.jwt_secret).map_err(|e| {
        tracing::error!("token generation failed: {}", e);
        ApiError::internal_server_error("An error occurred while processing your request")
    })?;

    Ok(ApiResponse::success(LoginResponse {
        token,
        user: json!({
            "id": row.id,
            "email": row.email,
            "role": role,
            "tenant_id": row.tenant_id,
        }),
        expires_in: expiry_hours * 3600,
    }))
}

/// GET /api/auth/whoami - identity and tenant context for the current
/// request.
pub async fn whoami(
    Extension(user): Extension<AuthUser>,
    tenant: Option<Extension<TenantContext>>,
) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "user": user,
        "tenant": tenant.map(|Extension(ctx)| ctx.tenant),
    }))
}

#[derive(Debug, FromRow)]
struct GrantRow {
    role: String,
    granted_at: chrono::DateTime<chrono::Utc>,
    granted_by: Option<Uuid>,
    metadata: Option<Value>,
}

/// GET /api/auth/permissions - the caller's effective permission set:
/// primary role plus any additional role grants recorded in the tenant
/// schema.
pub async fn my_permissions(
    Extension(user): Extension<AuthUser>,
    tenant: Option<Extension<TenantContext>>,
) -> ApiResult<Value> {
    let grants = match &tenant {
        Some(Extension(ctx)) => load_grants(ctx, user.id).await?,
        None => Vec::new(),
    };

    let mut permissions: Vec<&str> = effective_permissions(user.role, &grants).into_iter().collect();
    permissions.sort_unstable();

    Ok(ApiResponse::success(json!({
        "role": user.role,
        "additional_roles": grants,
        "permissions": permissions,
    })))
}

async fn load_grants(
    ctx: &TenantContext,
    user_id: Uuid,
) -> Result<Vec<AdditionalRoleGrant>, ApiError> {
    let mut scoped = ctx.conn.lock().await;
    let conn = scoped.handle()?;

    let rows = sqlx::query_as::<_, GrantRow>(
        r#"
        SELECT role, granted_at, granted_by, metadata
        FROM user_roles
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    let mut grants = Vec::with_capacity(rows.len());
    for row in rows {
        match Role::from_str(&row.role) {
            Ok(role) => grants.push(AdditionalRoleGrant {
                role,
                granted_at: row.granted_at,
                granted_by: row.granted_by,
                metadata: row.metadata,
            }),
            Err(_) => {
                tracing::warn!(user_id = %user_id, role = %row.role, "skipping grant with unknown role");
            }
        }
    }
    Ok(grants)
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
