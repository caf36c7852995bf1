//! Liquidation keeper: periodically sweeps active loans for default.
//!
//! `checkForDefault` and `checkForLTV` are open to anyone; the keeper is simply
//! a caller that never gets tired. It goes through the actor handle like any
//! other client, so its checks serialize with user requests.

use std::time::Duration;

use lien_common::error::LendingError;

use crate::actor::MarketHandle;
use crate::collection::AssetRegistry;
use crate::marketplace::SweepReport;
use crate::oracle::PriceSource;
use crate::token::FungibleToken;

pub struct LoanKeeper<T, A, P> {
    handle: MarketHandle<T, A, P>,
    interval: Duration,
}

impl<T, A, P> LoanKeeper<T, A, P>
where
    T: FungibleToken,
    A: AssetRegistry,
    P: PriceSource,
{
    pub fn new(handle: MarketHandle<T, A, P>, interval_ms: u64) -> Self {
        Self {
            handle,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    /// One sweep over all active loans.
    pub async fn tick(&self) -> Result<SweepReport, LendingError> {
        let report = self.handle.sweep().await?;

        for loan_id in &report.expired {
            tracing::info!(loan_id, "Keeper defaulted expired loan");
        }
        for loan_id in &report.ltv_breached {
            tracing::info!(loan_id, "Keeper defaulted under-collateralised loan");
        }
        if !report.unpriced.is_empty() {
            tracing::warn!(
                loans = ?report.unpriced,
                "Collateral could not be priced, LTV check skipped"
            );
        }
        for (loan_id, error) in &report.failed {
            tracing::error!(loan_id, error = %error, "Keeper check failed");
        }

        Ok(report)
    }

    /// Sweep on every interval until the market actor goes away.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Loan keeper started"
        );

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(report) => {
                    tracing::debug!(
                        examined = report.examined,
                        defaulted = report.defaulted(),
                        "Keeper sweep complete"
                    );
                }
                Err(LendingError::EngineUnavailable(reason)) => {
                    return Err(anyhow::anyhow!("market actor unavailable: {}", reason));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Keeper sweep failed, retrying next interval");
                }
            }
        }
    }
}
