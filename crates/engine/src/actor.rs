//! Single-writer actor around the marketplace.
//!
//! The marketplace is moved into one tokio task and only touched from there.
//! Callers submit jobs over a bounded channel and wait for the reply, so every
//! operation runs to completion before the next one starts, regardless of how
//! many handles or tasks issue requests.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use lien_common::error::LendingError;
use lien_common::types::{
    AccountId, Amount, AssetRef, Counters, LedgerAudit, Listing, ListingTerms, Loan, LoanStatus,
    MarketEvent, Offer, OfferRequest, OfferTerms,
};

use crate::collection::{AssetRegistry, MemoryCollections};
use crate::marketplace::{Marketplace, SweepReport};
use crate::oracle::{PriceSource, SimplePriceOracle};
use crate::token::{FungibleToken, MemoryToken};

/// Capacity of the event broadcast; slow subscribers lag rather than block.
const EVENT_BUFFER: usize = 1024;

type Job<T, A, P> = Box<dyn FnOnce(&mut Marketplace<T, A, P>) + Send>;

/// Cloneable handle to a running market actor.
pub struct MarketHandle<T, A, P> {
    jobs: mpsc::Sender<Job<T, A, P>>,
    events: broadcast::Sender<MarketEvent>,
}

impl<T, A, P> Clone for MarketHandle<T, A, P> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            events: self.events.clone(),
        }
    }
}

pub type MemoryMarketHandle = MarketHandle<MemoryToken, MemoryCollections, SimplePriceOracle>;

/// Move `market` into its own task. The task ends once every handle is dropped.
pub fn spawn_market<T, A, P>(
    market: Marketplace<T, A, P>,
    queue_depth: usize,
) -> (MarketHandle<T, A, P>, JoinHandle<()>)
where
    T: FungibleToken,
    A: AssetRegistry,
    P: PriceSource,
{
    let (jobs, mut rx) = mpsc::channel::<Job<T, A, P>>(queue_depth.max(1));
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let publisher = events.clone();

    let task = tokio::spawn(async move {
        let mut market = market;
        tracing::info!(
            pool = %market.pool_address(),
            escrow = %market.escrow_address(),
            "Market actor started"
        );

        while let Some(job) = rx.recv().await {
            job(&mut market);
            for event in market.take_events() {
                // Having no subscribers is fine.
                let _ = publisher.send(event);
            }
        }

        tracing::info!("Market actor stopped");
    });

    (MarketHandle { jobs, events }, task)
}

impl<T, A, P> MarketHandle<T, A, P>
where
    T: FungibleToken,
    A: AssetRegistry,
    P: PriceSource,
{
    /// Run `f` against the marketplace and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, LendingError>
    where
        F: FnOnce(&mut Marketplace<T, A, P>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<T, A, P> = Box::new(move |market: &mut Marketplace<T, A, P>| {
            let _ = reply_tx.send(f(market));
        });

        self.jobs
            .send(job)
            .await
            .map_err(|_| LendingError::EngineUnavailable("market actor has stopped".to_string()))?;

        reply_rx.await.map_err(|_| {
            LendingError::EngineUnavailable("market actor dropped the request".to_string())
        })
    }

    async fn try_call<R, F>(&self, f: F) -> Result<R, LendingError>
    where
        F: FnOnce(&mut Marketplace<T, A, P>) -> Result<R, LendingError> + Send + 'static,
        R: Send + 'static,
    {
        self.call(f).await?
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }

    pub async fn deposit(&self, caller: AccountId, amount: Amount) -> Result<Amount, LendingError> {
        self.try_call(move |m| m.deposit(&caller, amount)).await
    }

    pub async fn withdraw(&self, caller: AccountId, amount: Amount) -> Result<Amount, LendingError> {
        self.try_call(move |m| m.withdraw(&caller, amount)).await
    }

    pub async fn balance_of(&self, account: AccountId) -> Result<Amount, LendingError> {
        self.call(move |m| m.balance_of(&account)).await
    }

    pub async fn approve_payment(&self, owner: AccountId, amount: Amount) -> Result<(), LendingError> {
        self.call(move |m| m.approve_payment(&owner, amount)).await
    }

    pub async fn approve_collateral(
        &self,
        owner: AccountId,
        asset: AssetRef,
    ) -> Result<(), LendingError> {
        self.try_call(move |m| m.approve_collateral(&owner, &asset))
            .await
    }

    pub async fn owner_of(&self, asset: AssetRef) -> Result<AccountId, LendingError> {
        self.try_call(move |m| m.assets().owner_of(&asset)).await
    }

    pub async fn create_listing(
        &self,
        caller: AccountId,
        terms: ListingTerms,
    ) -> Result<Listing, LendingError> {
        self.try_call(move |m| m.create_listing(&caller, terms))
            .await
    }

    pub async fn make_offer(
        &self,
        caller: AccountId,
        request: OfferRequest,
    ) -> Result<Offer, LendingError> {
        self.try_call(move |m| m.make_offer(&caller, request)).await
    }

    pub async fn accept_offer(
        &self,
        caller: AccountId,
        offer_id: u64,
        terms: OfferTerms,
    ) -> Result<Loan, LendingError> {
        self.try_call(move |m| m.accept_offer(&caller, offer_id, &terms))
            .await
    }

    pub async fn repay(&self, caller: AccountId, loan_id: u64) -> Result<Loan, LendingError> {
        self.try_call(move |m| m.repay(&caller, loan_id)).await
    }

    pub async fn check_for_default(&self, loan_id: u64) -> Result<LoanStatus, LendingError> {
        self.try_call(move |m| m.check_for_default(loan_id)).await
    }

    pub async fn check_for_ltv(&self, loan_id: u64) -> Result<LoanStatus, LendingError> {
        self.try_call(move |m| m.check_for_ltv(loan_id)).await
    }

    pub async fn current_ltv(&self, loan_id: u64) -> Result<u128, LendingError> {
        self.try_call(move |m| m.current_ltv(loan_id)).await
    }

    pub async fn sweep(&self) -> Result<SweepReport, LendingError> {
        self.call(|m| m.sweep_active_loans()).await
    }

    pub async fn listing(&self, id: u64) -> Result<Listing, LendingError> {
        self.try_call(move |m| m.listing(id).cloned()).await
    }

    pub async fn offer(&self, id: u64) -> Result<Offer, LendingError> {
        self.try_call(move |m| m.offer(id).cloned()).await
    }

    pub async fn loan(&self, id: u64) -> Result<Loan, LendingError> {
        self.try_call(move |m| m.loan(id).cloned()).await
    }

    pub async fn loans(&self, status: Option<LoanStatus>) -> Result<Vec<Loan>, LendingError> {
        self.call(move |m| m.loans(status)).await
    }

    pub async fn counters(&self) -> Result<Counters, LendingError> {
        self.call(|m| m.counters()).await
    }

    pub async fn audit(&self) -> Result<LedgerAudit, LendingError> {
        self.call(|m| m.audit()).await
    }

    /// Bootstrap issuance of payment tokens.
    pub async fn mint_tokens(&self, to: AccountId, amount: Amount) -> Result<(), LendingError> {
        self.try_call(move |m| m.token_mut().mint(&to, amount)).await
    }

    /// Bootstrap issuance of a collateral asset.
    pub async fn mint_asset(&self, to: AccountId, asset: AssetRef) -> Result<(), LendingError> {
        self.try_call(move |m| m.assets_mut().mint(&to, &asset))
            .await
    }
}

impl<T, A> MarketHandle<T, A, SimplePriceOracle>
where
    T: FungibleToken,
    A: AssetRegistry,
{
    pub async fn update_supported_asset(
        &self,
        caller: AccountId,
        contract: AccountId,
        supported: bool,
    ) -> Result<(), LendingError> {
        self.try_call(move |m| {
            m.price_source_mut()
                .update_supported_asset(&caller, &contract, supported)
        })
        .await
    }

    pub async fn set_asset_price(
        &self,
        caller: AccountId,
        contract: AccountId,
        price: Amount,
    ) -> Result<(), LendingError> {
        self.try_call(move |m| {
            m.price_source_mut()
                .set_asset_price(&caller, &contract, price)
        })
        .await
    }
}
