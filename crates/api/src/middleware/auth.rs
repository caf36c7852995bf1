//! JWT authentication middleware and helpers.
//!
//! Tokens are issued after a SIWE login and carry the wallet address as
//! their subject. `AuthUser` authenticates any wallet; `OperatorUser`
//! additionally requires the configured operator account.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use lien_common::error::{AppError, LendingError};
use lien_common::types::AccountId;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the wallet address
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated wallet extracted from the JWT.
///
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.account is the caller for every engine operation
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account: AccountId,
    pub claims: Claims,
}

/// Authenticated caller that is also the configured operator.
#[derive(Debug, Clone)]
pub struct OperatorUser(pub AuthUser);

/// Encode a JWT token for a wallet.
pub fn encode_jwt(account: &AccountId, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: account.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))?;

    Ok(token)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Validate the `Authorization: Bearer <token>` header of a request.
fn authenticate(parts: &Parts, secret: &str) -> Result<AuthUser, AppError> {
    let token = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Auth("Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string())
        })?;

    let claims = decode_jwt(token, secret)?;
    let account = AccountId::new(claims.sub.as_str());
    if account.as_str().is_empty() {
        return Err(AppError::Auth("Token has an empty subject".to_string()));
    }
    Ok(AuthUser { account, claims })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = authenticate(parts, &state.config.jwt_secret);
        async move { result }
    }
}

impl FromRequestParts<AppState> for OperatorUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let operator = state.config.operator_address.clone();
        let result = authenticate(parts, &state.config.jwt_secret).and_then(|user| {
            if user.account != operator {
                tracing::warn!(caller = %user.account, "Rejected operator request");
                return Err(LendingError::Unauthorized(format!(
                    "{} is not the operator",
                    user.account
                ))
                .into());
            }
            Ok(OperatorUser(user))
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn test_encode_decode_jwt() {
        let account = AccountId::new("0xAbC123");
        let token = encode_jwt(&account, TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, "0xabc123");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let token = encode_jwt(&AccountId::new("0xabc"), TEST_SECRET, 24).unwrap();
        let result = decode_jwt(&token, "wrong-secret");
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_jwt_rejected() {
        // Create a token that expired 1 hour ago
        let now = Utc::now();
        let exp = now - Duration::hours(1);
        let claims = Claims {
            sub: "0xabc".to_string(),
            exp: exp.timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let result = decode_jwt(&token, TEST_SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = decode_jwt("not.a.valid.jwt", TEST_SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        let (parts, _) = axum::http::Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        assert!(matches!(
            authenticate(&parts, TEST_SECRET),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_bearer_header_accepted() {
        let token = encode_jwt(&AccountId::new("0xBorrower"), TEST_SECRET, 1).unwrap();
        let (parts, _) = axum::http::Request::builder()
            .uri("/")
            .header("authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();
        let user = authenticate(&parts, TEST_SECRET).unwrap();
        assert_eq!(user.account, AccountId::new("0xborrower"));
    }
}
