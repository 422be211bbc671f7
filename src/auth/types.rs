use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::shared::AppError;

/// Privilege level carried in the identity token
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

/// JWT claims issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String, // Stable user id
    pub role: Role,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// Authenticated caller, inserted into request extensions by `jwt_auth`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn require_moderator(&self) -> Result<(), AppError> {
        if self.role >= Role::Moderator {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Moderator privileges required".to_string(),
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin privileges required".to_string()))
        }
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_ordering_grants_admin_moderator_rights() {
        assert!(Identity::new("a", Role::Admin).require_moderator().is_ok());
        assert!(Identity::new("m", Role::Moderator).require_moderator().is_ok());
        assert!(Identity::new("m", Role::Moderator).require_admin().is_err());
        assert!(matches!(
            Identity::new("u", Role::User).require_moderator(),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            sub: "user-1".to_string(),
            role: Role::Moderator,
            exp: 1234567890,
            iat: 1234567800,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"role\":\"moderator\""));

        let deserialized: Claims = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, claims);
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
    }
}
