//! Authentication routes: SIWE verification.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lien_common::error::AppError;
use lien_common::types::AccountId;

use crate::middleware::auth::encode_jwt;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/auth/siwe", post(siwe_login))
}

/// Request body for SIWE login.
#[derive(Debug, Deserialize)]
pub struct SiweLoginRequest {
    /// The SIWE message string
    pub message: String,
    /// The wallet's signature of the message
    pub signature: String,
}

/// Response for successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub wallet_address: AccountId,
}

/// POST /api/auth/siwe: verify SIWE message + signature, return a JWT for the wallet.
async fn siwe_login(
    State(state): State<AppState>,
    Json(req): Json<SiweLoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let message: siwe::Message = req
        .message
        .parse()
        .map_err(|e| AppError::Validation(format!("Invalid SIWE message: {}", e)))?;

    ensure_domain(message.domain.as_str(), &state.config.siwe_domain)?;

    let sig_bytes = hex_decode(&req.signature)?;

    let opts = siwe::VerificationOpts::default();
    message
        .verify(&sig_bytes, &opts)
        .await
        .map_err(|e| AppError::Auth(format!("Signature verification failed: {}", e)))?;

    let wallet_address = AccountId::new(format!(
        "0x{}",
        message
            .address
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    ));

    let token = encode_jwt(
        &wallet_address,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )?;

    tracing::info!(wallet = %wallet_address, "Wallet authenticated via SIWE");

    Ok(Json(LoginResponse {
        token,
        wallet_address,
    }))
}

/// Reject messages signed for another site.
fn ensure_domain(message_domain: &str, expected: &str) -> Result<(), AppError> {
    if !message_domain.eq_ignore_ascii_case(expected.trim()) {
        tracing::warn!(domain = message_domain, expected, "SIWE message for foreign domain");
        return Err(AppError::Auth(format!(
            "SIWE message domain {} does not match {}",
            message_domain, expected
        )));
    }
    Ok(())
}

/// Decode a hex-encoded string (with or without 0x prefix) into bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, AppError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if !hex.is_ascii() {
        return Err(AppError::Validation(
            "Invalid hex signature: non-ASCII input".to_string(),
        ));
    }
    if !hex.len().is_multiple_of(2) {
        return Err(AppError::Validation(
            "Hex string must have even length".to_string(),
        ));
    }
    let bytes: Result<Vec<u8>, _> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect();
    bytes.map_err(|e| AppError::Validation(format!("Invalid hex signature: {}", e)))
}
