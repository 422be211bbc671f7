use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::types::{Claims, Role};
use crate::shared::AppError;

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
}

impl TokenConfig {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Issues a token for the given user; the identity provider normally does this
    #[instrument(skip(self))]
    pub fn create_token(
        &self,
        user_id: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = (now + ttl).timestamp() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Validates a JWT token and returns the claims if valid
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| {
            debug!(user_id = %data.claims.sub, role = %data.claims.role, "JWT token decoded successfully");
            data.claims
        })
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::Unauthorized(format!("Invalid token: {}", e))
        })
    }
}
