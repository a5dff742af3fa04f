use axum::extract::{Extension, Path};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, TenantContext};

/// Student record from the tenant schema. Unqualified table references
/// resolve inside the request's scoped connection.
#[derive(Debug, Serialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// GET /api/students
pub async fn list_students(Extension(ctx): Extension<TenantContext>) -> ApiResult<Vec<Student>> {
    let mut scoped = ctx.conn.lock().await;
    let conn = scoped.handle()?;

    let students = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, email
        FROM students
        WHERE deleted_at IS NULL
        ORDER BY name
        LIMIT 200
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    Ok(ApiResponse::success(students))
}

/// GET /api/students/:id
pub async fn get_student(
    Path(id): Path<Uuid>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Student> {
    let mut scoped = ctx.conn.lock().await;
    let conn = scoped.handle()?;

    let student = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, email
        FROM students
        WHERE id = $1
        AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    let student = student.ok_or_else(|| ApiError::not_found(format!("Student '{}' not found", id)))?;
    Ok(ApiResponse::success(student))
}
