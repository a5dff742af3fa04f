use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{validate_token, Claims, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated user context extracted from a verified bearer token.
///
/// Immutable for the duration of the request: role and tenant binding can
/// only change by issuing a new credential.
#[derive(Clone, Debug, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub role: Role,
    pub email: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            // An empty claim means "no tenant binding" (platform superuser)
            tenant_id: claims.tenant_id.filter(|t| !t.is_empty()),
            role: claims.role,
            email: claims.email,
        }
    }
}

/// Bearer-token authentication middleware. Validates the token and injects
/// `AuthUser` into the request extensions for everything downstream.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).map_err(ApiError::unauthorized)?;

    let claims = validate_token(&token, &state.config.security.jwt_secret)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    request.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty bearer token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
