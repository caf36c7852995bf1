//! Balance ledger routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lien_common::error::AppError;
use lien_common::types::{AccountId, Amount, LedgerAudit};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ledger/deposit", post(deposit))
        .route("/api/ledger/withdraw", post(withdraw))
        .route("/api/ledger/balances/{account}", get(balance))
        .route("/api/ledger/audit", get(audit))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account: AccountId,
    pub balance: Amount,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub audit: LedgerAudit,
    pub conserved: bool,
}

/// POST /api/ledger/deposit: pull tokens from the caller's wallet into the pool.
async fn deposit(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.market.deposit(auth.account.clone(), req.amount).await?;
    Ok(Json(BalanceResponse {
        account: auth.account,
        balance,
    }))
}

/// POST /api/ledger/withdraw: send tokens from the pool back to the caller.
async fn withdraw(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state
        .market
        .withdraw(auth.account.clone(), req.amount)
        .await?;
    Ok(Json(BalanceResponse {
        account: auth.account,
        balance,
    }))
}

async fn balance(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account = AccountId::new(account);
    let balance = state.market.balance_of(account.clone()).await?;
    Ok(Json(BalanceResponse { account, balance }))
}

async fn audit(State(state): State<AppState>) -> Result<Json<AuditResponse>, AppError> {
    let audit = state.market.audit().await?;
    if !audit.is_conserved() {
        tracing::error!(?audit, "Ledger audit failed conservation check");
    }
    Ok(Json(AuditResponse {
        conserved: audit.is_conserved(),
        audit,
    }))
}
