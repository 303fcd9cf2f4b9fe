//! Authentication: JWT access tokens for panel owners
//!
//! Owners are managed by an external identity service; the worker only
//! verifies tokens and reads the owner id from the `sub` claim.

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Request;

/// Token lifetime: one working day
const TOKEN_TTL_SECONDS: usize = 8 * 60 * 60;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (owner ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issued at (unix timestamp)
    pub iat: usize,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

/// Authentication result from extract_auth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthInfo {
    pub user_id: Uuid,
}

/// Generate a JWT access token
pub fn generate_token(user_id: Uuid, email: Option<&str>, secret: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        iat: now,
        exp: now + TOKEN_TTL_SECONDS,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// Extract the owner from a NATS request envelope. A missing or invalid
/// token is an error (UNAUTHORIZED).
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo> {
    let token = request
        .token
        .as_deref()
        .ok_or_else(|| anyhow!("No authentication provided, JWT token is required"))?;

    let claims = validate_token(token, jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|e| anyhow!("Invalid user_id in token: {}", e))?;

    Ok(AuthInfo { user_id })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Request;
    use chrono::Utc;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    fn make_request_with_token(token: Option<String>) -> Request<serde_json::Value> {
        Request {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, Some("ana@example.com"), TEST_SECRET).unwrap();

        let claims = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECONDS);
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let token = generate_token(Uuid::new_v4(), None, TEST_SECRET).unwrap();
        assert!(validate_token(&token, "another-secret-that-is-long-enough-32b").is_err());
    }

    #[test]
    fn test_validate_token_malformed() {
        assert!(validate_token("not.a.valid.token", TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_with_valid_token() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, None, TEST_SECRET).unwrap();

        let auth = extract_auth(&make_request_with_token(Some(token)), TEST_SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
    }

    #[test]
    fn test_extract_auth_no_token_fails() {
        assert!(extract_auth(&make_request_with_token(None), TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_invalid_token_fails() {
        let request = make_request_with_token(Some("bad-token".to_string()));
        assert!(extract_auth(&request, TEST_SECRET).is_err());
    }
}
