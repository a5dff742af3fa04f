// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseError;
use crate::tenant::TenantError;

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Every security-relevant denial carries a stable machine-readable code so
/// clients (and security review) can distinguish "you are not allowed" from
/// "we could not even establish who/where you are".
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    MissingTargetId(String),
    TenantContextMissing(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),
    TenantContextRequired(String),
    TenantMismatch(String),

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::MissingTargetId(_) => 400,
            ApiError::TenantContextMissing(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::TenantContextRequired(_) => 403,
            ApiError::TenantMismatch(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::MissingTargetId(msg) => msg,
            ApiError::TenantContextMissing(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::TenantContextRequired(msg) => msg,
            ApiError::TenantMismatch(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::MissingTargetId(_) => "MISSING_TARGET_ID",
            ApiError::TenantContextMissing(_) => "TENANT_CONTEXT_MISSING",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::TenantContextRequired(_) => "TENANT_CONTEXT_REQUIRED",
            ApiError::TenantMismatch(_) => "TENANT_MISMATCH",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn missing_target_id(message: impl Into<String>) -> Self {
        ApiError::MissingTargetId(message.into())
    }

    pub fn tenant_context_missing(message: impl Into<String>) -> Self {
        ApiError::TenantContextMissing(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn tenant_context_required(message: impl Into<String>) -> Self {
        ApiError::TenantContextRequired(message.into())
    }

    pub fn tenant_mismatch(message: impl Into<String>) -> Self {
        ApiError::TenantMismatch(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                tracing::error!("Connection pool exhausted or closed: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                // Never expose internal SQL errors to clients
                tracing::error!("SQLx error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::UnsafeSchemaName(name) => {
                // Schema name details stay in the logs, not the response
                tracing::error!("Unsafe tenant schema name rejected: {}", name);
                ApiError::internal_server_error("Tenant configuration error")
            }
            TenantError::ConnectionReleased => {
                tracing::error!("Scoped connection used after release");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            TenantError::Sqlx(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConfigMissing(var) => {
                tracing::error!("Missing configuration: {}", var);
                ApiError::service_unavailable("Service is not configured")
            }
            DatabaseError::Sqlx(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
