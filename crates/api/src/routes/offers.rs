//! Offer routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use lien_common::error::AppError;
use lien_common::types::{Loan, Offer, OfferRequest, OfferTerms};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/offers", post(make_offer))
        .route("/api/offers/{id}", get(get_offer))
        .route("/api/offers/{id}/accept", post(accept_offer))
}

/// POST /api/offers: lender offers to fund a listing on its exact terms.
async fn make_offer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<OfferRequest>,
) -> Result<Json<Offer>, AppError> {
    let offer = state.market.make_offer(auth.account, request).await?;
    Ok(Json(offer))
}

async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Offer>, AppError> {
    Ok(Json(state.market.offer(id).await?))
}

/// POST /api/offers/:id/accept: borrower accepts, starting the loan.
///
/// The body repeats the offer terms the borrower agreed to; any drift from
/// the stored offer is rejected.
async fn accept_offer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<u64>,
    Json(terms): Json<OfferTerms>,
) -> Result<Json<Loan>, AppError> {
    let loan = state.market.accept_offer(auth.account, id, terms).await?;
    Ok(Json(loan))
}
