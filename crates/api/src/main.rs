//! Lien API server binary entrypoint.

use std::future::IntoFuture;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lien_common::config::AppConfig;
use lien_engine::actor::spawn_market;
use lien_engine::clock::SystemClock;
use lien_engine::collection::MemoryCollections;
use lien_engine::keeper::LoanKeeper;
use lien_engine::marketplace::{MarketAddresses, Marketplace};
use lien_engine::oracle::SimplePriceOracle;
use lien_engine::token::MemoryToken;

use lien_api::routes::create_router;
use lien_api::state::AppState;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("lien_api=debug,lien_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Lien API server...");

    let config = AppConfig::from_env()?;

    let token = MemoryToken::new("PAY");
    tracing::info!(
        token = token.symbol(),
        pool = %config.pool_address,
        escrow = %config.escrow_address,
        "Payment token ledger initialised"
    );

    let market = Marketplace::new(
        MarketAddresses {
            pool: config.pool_address.clone(),
            escrow: config.escrow_address.clone(),
        },
        token,
        MemoryCollections::new(),
        SimplePriceOracle::new(config.operator_address.clone()),
        Arc::new(SystemClock),
    );
    let (handle, market_task) = spawn_market(market, config.command_queue_depth);
    tracing::info!(
        operator = %config.operator_address,
        queue_depth = config.command_queue_depth,
        "Market engine running"
    );

    let keeper = (config.keeper_interval_ms > 0)
        .then(|| LoanKeeper::new(handle.clone(), config.keeper_interval_ms));
    if keeper.is_none() {
        tracing::info!("Loan keeper disabled (KEEPER_INTERVAL_MS=0)");
    }

    let state = AppState::new(handle, config.clone());
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("API server listening on {}", listener.local_addr()?);

    let keeper_loop = async {
        match &keeper {
            Some(keeper) => keeper.run().await,
            None => std::future::pending::<anyhow::Result<()>>().await,
        }
    };

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server exited with error");
                return Err(e.into());
            }
        }
        result = keeper_loop => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Loan keeper exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    market_task.abort();
    tracing::info!("Lien API server stopped.");
    Ok(())
}
