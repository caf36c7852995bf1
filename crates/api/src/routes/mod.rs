pub mod admin;
pub mod assets;
pub mod auth;
pub mod health;
pub mod ledger;
pub mod listings;
pub mod loans;
pub mod offers;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(ledger::router())
        .merge(assets::router())
        .merge(listings::router())
        .merge(offers::router())
        .merge(loans::router())
        .merge(admin::router())
        .with_state(state)
}
