use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod permissions;
pub mod roles;

pub use permissions::{
    effective_permissions, role_has_all_permissions, role_has_any_permission,
    role_has_permission, user_has_permission,
};
pub use roles::{AdditionalRoleGrant, Role};

/// JWT claims for an authenticated principal.
///
/// `tenant_id` is the tenant the credential was issued for. It is empty for
/// platform superusers, who are not bound to any single tenant. Role and
/// tenant are immutable for the token's lifetime; changing either requires
/// issuing a new token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Option<String>,
    pub role: Role,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        tenant_id: Option<String>,
        role: Role,
        email: String,
        expiry_hours: u64,
    ) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            tenant_id,
            role,
            email,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
}

pub fn generate_token(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let claims = Claims::new(
            Uuid::new_v4(),
            Some("t-alpha".to_string()),
            Role::Teacher,
            "teacher@school.test".to_string(),
            1,
        );
        let token = generate_token(&claims, "test-secret").unwrap();
        let decoded = validate_token(&token, "test-secret").unwrap();

        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.tenant_id.as_deref(), Some("t-alpha"));
        assert_eq!(decoded.role, Role::Teacher);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), None, Role::Superadmin, "root@platform".into(), 1);
        let token = generate_token(&claims, "secret-a").unwrap();
        assert!(matches!(
            validate_token(&token, "secret-b"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let claims = Claims::new(Uuid::new_v4(), None, Role::Student, "s@school".into(), 1);
        assert!(matches!(
            generate_token(&claims, ""),
            Err(AuthError::MissingSecret)
        ));
        assert!(matches!(
            validate_token("whatever", ""),
            Err(AuthError::MissingSecret)
        ));
    }
}
