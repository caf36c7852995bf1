//! Collaborator approval and ownership routes.
//!
//! Approvals are what let the pool pull payment tokens on deposit and the
//! escrow take collateral on acceptance.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lien_common::error::AppError;
use lien_common::types::{AccountId, Amount, AssetRef};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tokens/approve", post(approve_payment))
        .route("/api/assets/approve", post(approve_collateral))
        .route("/api/assets/{contract}/{token_id}/owner", get(owner_of))
}

#[derive(Debug, Deserialize)]
pub struct ApprovePaymentRequest {
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct PaymentApproval {
    pub owner: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveCollateralRequest {
    pub contract: AccountId,
    pub token_id: u64,
}

#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    pub asset: AssetRef,
    pub owner: AccountId,
}

async fn approve_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ApprovePaymentRequest>,
) -> Result<Json<PaymentApproval>, AppError> {
    state
        .market
        .approve_payment(auth.account.clone(), req.amount)
        .await?;
    Ok(Json(PaymentApproval {
        owner: auth.account,
        amount: req.amount,
    }))
}

async fn approve_collateral(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ApproveCollateralRequest>,
) -> Result<Json<AssetRef>, AppError> {
    let asset = AssetRef::new(req.contract, req.token_id);
    state
        .market
        .approve_collateral(auth.account, asset.clone())
        .await?;
    Ok(Json(asset))
}

/// GET /api/assets/:contract/:token_id/owner
async fn owner_of(
    State(state): State<AppState>,
    Path((contract, token_id)): Path<(String, u64)>,
) -> Result<Json<OwnerResponse>, AppError> {
    let asset = AssetRef::new(contract, token_id);
    let owner = state.market.owner_of(asset.clone()).await?;
    Ok(Json(OwnerResponse { asset, owner }))
}
