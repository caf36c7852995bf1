//! Operator routes: bootstrap issuance and price oracle administration.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lien_common::error::AppError;
use lien_common::types::{AccountId, Amount, AssetRef};

use crate::middleware::auth::OperatorUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/mint-tokens", post(mint_tokens))
        .route("/api/admin/mint-asset", post(mint_asset))
        .route("/api/admin/oracle/supported", post(update_supported))
        .route("/api/admin/oracle/price", post(set_price))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MintTokensRequest {
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MintAssetRequest {
    pub to: AccountId,
    pub contract: AccountId,
    pub token_id: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SupportedRequest {
    pub contract: AccountId,
    pub supported: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PriceRequest {
    pub contract: AccountId,
    pub price: Amount,
}

async fn mint_tokens(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Json(req): Json<MintTokensRequest>,
) -> Result<Json<MintTokensRequest>, AppError> {
    state.market.mint_tokens(req.to.clone(), req.amount).await?;
    tracing::info!(to = %req.to, amount = req.amount, "Payment tokens minted");
    Ok(Json(req))
}

async fn mint_asset(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Json(req): Json<MintAssetRequest>,
) -> Result<Json<MintAssetRequest>, AppError> {
    let asset = AssetRef::new(req.contract.clone(), req.token_id);
    state.market.mint_asset(req.to.clone(), asset.clone()).await?;
    tracing::info!(to = %req.to, asset = %asset, "Collateral asset minted");
    Ok(Json(req))
}

/// POST /api/admin/oracle/supported
async fn update_supported(
    State(state): State<AppState>,
    OperatorUser(operator): OperatorUser,
    Json(req): Json<SupportedRequest>,
) -> Result<Json<SupportedRequest>, AppError> {
    state
        .market
        .update_supported_asset(operator.account, req.contract.clone(), req.supported)
        .await?;
    Ok(Json(req))
}

/// POST /api/admin/oracle/price
async fn set_price(
    State(state): State<AppState>,
    OperatorUser(operator): OperatorUser,
    Json(req): Json<PriceRequest>,
) -> Result<Json<PriceRequest>, AppError> {
    state
        .market
        .set_asset_price(operator.account, req.contract.clone(), req.price)
        .await?;
    Ok(Json(req))
}
