//! Listing routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use lien_common::error::AppError;
use lien_common::types::{Listing, ListingTerms};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/listings", post(create_listing))
        .route("/api/listings/{id}", get(get_listing))
}

/// POST /api/listings: publish loan terms for an asset the caller owns.
async fn create_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(terms): Json<ListingTerms>,
) -> Result<Json<Listing>, AppError> {
    let listing = state.market.create_listing(auth.account, terms).await?;
    Ok(Json(listing))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.market.listing(id).await?))
}
