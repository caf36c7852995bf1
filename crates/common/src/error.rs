use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::types::{AccountId, Amount, AssetRef, LoanStatus};

/// Errors raised by the lending core.
///
/// Every variant aborts the enclosing operation with no partial effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        required: Amount,
        available: Amount,
    },

    #[error("{caller} does not control asset {asset}")]
    NotAssetOwner { asset: AssetRef, caller: AccountId },

    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    #[error("Asset {0} is not in custody")]
    NotInCustody(AssetRef),

    #[error("Asset {0} is not supported by the price source")]
    UnsupportedAsset(AssetRef),

    #[error("Offer {0} has already been accepted")]
    AlreadyAccepted(u64),

    #[error("Offer {0} has expired")]
    OfferExpired(u64),

    #[error("Loan {id} is already {status}")]
    AlreadyTerminal { id: u64, status: LoanStatus },

    #[error("Token transfer failed: {0}")]
    TokenTransfer(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl LendingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LendingError::Validation(_) => StatusCode::BAD_REQUEST,
            LendingError::Unauthorized(_) => StatusCode::FORBIDDEN,
            LendingError::InsufficientBalance { .. }
            | LendingError::NotAssetOwner { .. }
            | LendingError::TransferRejected(_)
            | LendingError::AlreadyAccepted(_)
            | LendingError::OfferExpired(_)
            | LendingError::AlreadyTerminal { .. }
            | LendingError::TokenTransfer(_) => StatusCode::CONFLICT,
            LendingError::UnsupportedAsset(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LendingError::NotFound(_) => StatusCode::NOT_FOUND,
            LendingError::NotInCustody(_) | LendingError::Overflow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            LendingError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Lending(#[from] LendingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Lending(err) => (err.status_code(), err.to_string()),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
