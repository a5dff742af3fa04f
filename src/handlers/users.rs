use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Role;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, TenantContext};

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: Role,
}

/// POST /api/users/:id/role - assign a primary role to a tenant user.
///
/// Gated upstream by `require_role(admin)` and `enforce_role_hierarchy`, so
/// by the time this runs the actor is allowed to hand out the target role.
pub async fn assign_role(
    Path(id): Path<Uuid>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<AssignRoleRequest>,
) -> ApiResult<Value> {
    let mut scoped = ctx.conn.lock().await;
    let conn = scoped.handle()?;

    let result = sqlx::query(
        r#"
        UPDATE users
        SET role = $1, updated_at = now()
        WHERE id = $2
        AND deleted_at IS NULL
        "#,
    )
    .bind(req.role.as_str())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("User '{}' not found", id)));
    }

    tracing::info!(user_id = %id, role = %req.role, tenant_id = %ctx.tenant.id, "role assigned");

    Ok(ApiResponse::success(json!({
        "id": id,
        "role": req.role,
    })))
}
