//! Loan routes: records, repayment and the public default checks.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lien_common::error::{AppError, LendingError};
use lien_common::types::{Counters, Loan, LoanStatus};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/loans", get(list_loans))
        .route("/api/loans/{id}", get(get_loan))
        .route("/api/loans/{id}/repay", post(repay))
        .route("/api/loans/{id}/check-default", post(check_default))
        .route("/api/loans/{id}/check-ltv", post(check_ltv))
        .route("/api/counters", get(counters))
}

#[derive(Debug, Deserialize)]
pub struct LoansQuery {
    pub status: Option<LoanStatus>,
}

/// A loan together with its deadline and the LTV at read time.
#[derive(Debug, Serialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub due_at: DateTime<Utc>,
    /// `None` when the collateral cannot currently be priced.
    pub ltv_bps: Option<u128>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub loan_id: u64,
    pub status: LoanStatus,
}

/// GET /api/loans?status=active
async fn list_loans(
    State(state): State<AppState>,
    Query(query): Query<LoansQuery>,
) -> Result<Json<Vec<Loan>>, AppError> {
    Ok(Json(state.market.loans(query.status).await?))
}

async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LoanDetail>, AppError> {
    let loan = state.market.loan(id).await?;
    let ltv_bps = match state.market.current_ltv(id).await {
        Ok(ltv) => Some(ltv),
        Err(LendingError::UnsupportedAsset(_)) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(Json(LoanDetail {
        due_at: loan.due_at(),
        loan,
        ltv_bps,
    }))
}

/// POST /api/loans/:id/repay: borrower pays back and reclaims the collateral.
async fn repay(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<u64>,
) -> Result<Json<Loan>, AppError> {
    Ok(Json(state.market.repay(auth.account, id).await?))
}

/// POST /api/loans/:id/check-default: open to anyone.
async fn check_default(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CheckResponse>, AppError> {
    let status = state.market.check_for_default(id).await?;
    Ok(Json(CheckResponse {
        loan_id: id,
        status,
    }))
}

/// POST /api/loans/:id/check-ltv: open to anyone.
async fn check_ltv(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CheckResponse>, AppError> {
    let status = state.market.check_for_ltv(id).await?;
    Ok(Json(CheckResponse {
        loan_id: id,
        status,
    }))
}

async fn counters(State(state): State<AppState>) -> Result<Json<Counters>, AppError> {
    Ok(Json(state.market.counters().await?))
}
