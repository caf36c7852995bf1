//! Shared application state for the Axum API server.

use lien_common::config::AppConfig;
use lien_engine::actor::MemoryMarketHandle;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub market: MemoryMarketHandle,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(market: MemoryMarketHandle, config: AppConfig) -> Self {
        Self { market, config }
    }
}
