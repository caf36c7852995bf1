//! End-to-end loan lifecycle tests against the in-process collaborators.
//!
//! Every scenario starts from the same deployment: one collection priced at
//! 200 PAY, a borrower holding token #1 and a lender with 1000 PAY minted.
//!
//! ```bash
//! cargo test -p lien-engine --test integration -- --nocapture
//! ```

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use lien_common::error::LendingError;
use lien_common::types::{
    AccountId, AssetRef, ListingTerms, Loan, LoanStatus, MarketEvent, OfferRequest,
};
use lien_engine::actor::{MemoryMarketHandle, spawn_market};
use lien_engine::clock::ManualClock;
use lien_engine::collection::{AssetRegistry, MemoryCollections};
use lien_engine::keeper::LoanKeeper;
use lien_engine::marketplace::{MarketAddresses, Marketplace};
use lien_engine::oracle::SimplePriceOracle;
use lien_engine::token::{FungibleToken, MemoryToken};

const ETHER: u128 = 1_000_000_000_000_000_000;
const THIRTY_DAYS: u64 = 60 * 60 * 24 * 30;

// ============================================================
// Shared helpers
// ============================================================

struct Deployment {
    handle: MemoryMarketHandle,
    clock: ManualClock,
    operator: AccountId,
    borrower: AccountId,
    lender: AccountId,
    collection: AccountId,
    asset: AssetRef,
}

/// Spin up a market actor with the collection supported and priced.
async fn deploy() -> Deployment {
    let clock = ManualClock::new(Utc::now());
    let operator = AccountId::new("0xOperator");
    let market = Marketplace::new(
        MarketAddresses {
            pool: AccountId::new("0xpool"),
            escrow: AccountId::new("0xescrow"),
        },
        MemoryToken::new("PAY"),
        MemoryCollections::new(),
        SimplePriceOracle::new(operator.clone()),
        Arc::new(clock.clone()),
    );
    let (handle, _task) = spawn_market(market, 64);

    let collection = AccountId::new("0xnft1");
    let borrower = AccountId::new("0xborrower1");
    let lender = AccountId::new("0xlender1");
    let asset = AssetRef::new(collection.as_str(), 1);

    handle
        .update_supported_asset(operator.clone(), collection.clone(), true)
        .await
        .unwrap();
    handle
        .set_asset_price(operator.clone(), collection.clone(), 200 * ETHER)
        .await
        .unwrap();
    handle.mint_asset(borrower.clone(), asset.clone()).await.unwrap();
    handle.mint_tokens(lender.clone(), 1_000 * ETHER).await.unwrap();

    Deployment {
        handle,
        clock,
        operator,
        borrower,
        lender,
        collection,
        asset,
    }
}

fn listing_terms(d: &Deployment) -> ListingTerms {
    ListingTerms {
        borrower: d.borrower.clone(),
        asset: d.asset.clone(),
        loan_amount: 100 * ETHER,
        repay_amount: 110 * ETHER,
        loan_duration: THIRTY_DAYS,
        max_ltv: 7_000,
    }
}

/// Lender deposits 100, borrower lists, lender offers, borrower accepts.
async fn start_loan(d: &Deployment) -> Loan {
    let h = &d.handle;
    h.approve_payment(d.lender.clone(), 100 * ETHER).await.unwrap();
    h.deposit(d.lender.clone(), 100 * ETHER).await.unwrap();
    h.approve_collateral(d.borrower.clone(), d.asset.clone())
        .await
        .unwrap();

    let terms = listing_terms(d);
    let listing = h
        .create_listing(d.borrower.clone(), terms.clone())
        .await
        .unwrap();
    let offer = h
        .make_offer(
            d.lender.clone(),
            OfferRequest {
                lender: d.lender.clone(),
                borrower: d.borrower.clone(),
                listing_id: listing.id,
                loan_amount: terms.loan_amount,
                repay_amount: terms.repay_amount,
                loan_duration: terms.loan_duration,
                max_ltv: terms.max_ltv,
                listing: terms,
                expires_at: None,
            },
        )
        .await
        .unwrap();
    h.accept_offer(d.borrower.clone(), offer.id, offer.terms.clone())
        .await
        .unwrap()
}

async fn assert_conserved(d: &Deployment) {
    let audit = d.handle.audit().await.unwrap();
    assert!(audit.is_conserved(), "ledger out of balance: {:?}", audit);
}

// ============================================================
// Lifecycle scenarios
// ============================================================

#[tokio::test]
async fn test_accept_funds_borrower_and_escrows_collateral() {
    let d = deploy().await;
    let loan = start_loan(&d).await;

    assert_eq!(loan.id, 1);
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(d.handle.balance_of(d.borrower.clone()).await.unwrap(), 100 * ETHER);
    assert_eq!(d.handle.balance_of(d.lender.clone()).await.unwrap(), 0);
    assert_eq!(
        d.handle.owner_of(d.asset.clone()).await.unwrap(),
        AccountId::new("0xescrow")
    );
    assert_eq!(d.handle.current_ltv(loan.id).await.unwrap(), 5_000);
    assert_conserved(&d).await;
}

#[tokio::test]
async fn test_repay_returns_collateral_and_pays_lender() {
    let d = deploy().await;
    let loan = start_loan(&d).await;

    // Borrower tops up the 10 PAY of interest.
    d.handle
        .mint_tokens(d.borrower.clone(), 10 * ETHER)
        .await
        .unwrap();
    d.handle
        .approve_payment(d.borrower.clone(), 10 * ETHER)
        .await
        .unwrap();
    d.handle
        .deposit(d.borrower.clone(), 10 * ETHER)
        .await
        .unwrap();

    let repaid = d.handle.repay(d.borrower.clone(), loan.id).await.unwrap();
    assert_eq!(repaid.status, LoanStatus::Repaid);
    assert!(repaid.settled_at.is_some());
    assert_eq!(d.handle.balance_of(d.lender.clone()).await.unwrap(), 110 * ETHER);
    assert_eq!(d.handle.balance_of(d.borrower.clone()).await.unwrap(), 0);
    assert_eq!(
        d.handle.owner_of(d.asset.clone()).await.unwrap(),
        d.borrower
    );

    // Lender can take the proceeds out to their wallet.
    d.handle
        .withdraw(d.lender.clone(), 110 * ETHER)
        .await
        .unwrap();
    assert_conserved(&d).await;
}

#[tokio::test]
async fn test_expired_loan_defaults_to_lender() {
    let d = deploy().await;
    let loan = start_loan(&d).await;

    d.clock.advance(TimeDelta::seconds(THIRTY_DAYS as i64 + 1));
    let status = d.handle.check_for_default(loan.id).await.unwrap();
    assert_eq!(status, LoanStatus::Defaulted);

    assert_eq!(d.handle.owner_of(d.asset.clone()).await.unwrap(), d.lender);
    // No principal clawback: the borrower keeps what was lent.
    assert_eq!(d.handle.balance_of(d.borrower.clone()).await.unwrap(), 100 * ETHER);
    assert_conserved(&d).await;
}

#[tokio::test]
async fn test_price_drop_defaults_on_ltv() {
    let d = deploy().await;
    let loan = start_loan(&d).await;

    d.handle
        .set_asset_price(d.operator.clone(), d.collection.clone(), 100 * ETHER)
        .await
        .unwrap();
    assert_eq!(d.handle.current_ltv(loan.id).await.unwrap(), 10_000);

    let status = d.handle.check_for_ltv(loan.id).await.unwrap();
    assert_eq!(status, LoanStatus::Defaulted);
    assert_eq!(d.handle.owner_of(d.asset.clone()).await.unwrap(), d.lender);
    assert_eq!(
        d.handle.loan(loan.id).await.unwrap().status,
        LoanStatus::Defaulted
    );
}

// ============================================================
// Cross-cutting properties
// ============================================================

#[tokio::test]
async fn test_failed_operations_leave_state_untouched() {
    let d = deploy().await;
    let h = &d.handle;

    // Lender never deposited, so acceptance fails on the balance check.
    h.approve_collateral(d.borrower.clone(), d.asset.clone())
        .await
        .unwrap();
    let terms = listing_terms(&d);
    let listing = h
        .create_listing(d.borrower.clone(), terms.clone())
        .await
        .unwrap();
    let offer = h
        .make_offer(
            d.lender.clone(),
            OfferRequest {
                lender: d.lender.clone(),
                borrower: d.borrower.clone(),
                listing_id: listing.id,
                loan_amount: terms.loan_amount,
                repay_amount: terms.repay_amount,
                loan_duration: terms.loan_duration,
                max_ltv: terms.max_ltv,
                listing: terms,
                expires_at: None,
            },
        )
        .await
        .unwrap();

    let before = h.counters().await.unwrap();
    let err = h
        .accept_offer(d.borrower.clone(), offer.id, offer.terms.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::InsufficientBalance { .. }));

    assert_eq!(h.counters().await.unwrap(), before);
    assert_eq!(h.owner_of(d.asset.clone()).await.unwrap(), d.borrower);
    assert!(h.loans(None).await.unwrap().is_empty());
    assert!(h.offer(offer.id).await.unwrap().loan_id.is_none());
    assert_conserved(&d).await;
}

#[tokio::test]
async fn test_withdraw_after_offer_fails_acceptance() {
    let d = deploy().await;
    let h = &d.handle;

    h.approve_payment(d.lender.clone(), 100 * ETHER).await.unwrap();
    h.deposit(d.lender.clone(), 100 * ETHER).await.unwrap();
    h.approve_collateral(d.borrower.clone(), d.asset.clone())
        .await
        .unwrap();
    let terms = listing_terms(&d);
    let listing = h
        .create_listing(d.borrower.clone(), terms.clone())
        .await
        .unwrap();
    let offer = h
        .make_offer(
            d.lender.clone(),
            OfferRequest {
                lender: d.lender.clone(),
                borrower: d.borrower.clone(),
                listing_id: listing.id,
                loan_amount: terms.loan_amount,
                repay_amount: terms.repay_amount,
                loan_duration: terms.loan_duration,
                max_ltv: terms.max_ltv,
                listing: terms,
                expires_at: None,
            },
        )
        .await
        .unwrap();

    // Offers lock nothing, so the lender can drain the balance in between.
    let remaining = h.withdraw(d.lender.clone(), 50 * ETHER).await.unwrap();
    assert_eq!(remaining, 50 * ETHER);

    let before = h.counters().await.unwrap();
    let err = h
        .accept_offer(d.borrower.clone(), offer.id, offer.terms.clone())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LendingError::InsufficientBalance {
            account: d.lender.clone(),
            required: 100 * ETHER,
            available: 50 * ETHER,
        }
    );

    assert_eq!(h.owner_of(d.asset.clone()).await.unwrap(), d.borrower);
    assert!(h.loans(None).await.unwrap().is_empty());
    assert!(h.offer(offer.id).await.unwrap().loan_id.is_none());
    assert_eq!(h.counters().await.unwrap(), before);
    assert_eq!(h.balance_of(d.lender.clone()).await.unwrap(), 50 * ETHER);
    assert_eq!(h.balance_of(d.borrower.clone()).await.unwrap(), 0);
    assert_conserved(&d).await;

    // Topping the balance back up makes the same offer acceptable.
    h.approve_payment(d.lender.clone(), 50 * ETHER).await.unwrap();
    h.deposit(d.lender.clone(), 50 * ETHER).await.unwrap();
    let loan = h
        .accept_offer(d.borrower.clone(), offer.id, offer.terms.clone())
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_conserved(&d).await;
}

#[tokio::test]
async fn test_concurrent_checks_settle_once() {
    let d = deploy().await;
    let loan = start_loan(&d).await;
    let mut events = d.handle.subscribe();

    d.clock.advance(TimeDelta::seconds(THIRTY_DAYS as i64 + 1));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handle = d.handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.check_for_default(loan.id).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), LoanStatus::Defaulted);
    }

    // Exactly one default event despite eight callers.
    let mut defaults = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, MarketEvent::LoanDefaulted { .. }) {
            defaults += 1;
        }
    }
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn test_terminal_loan_rejects_repay() {
    let d = deploy().await;
    let loan = start_loan(&d).await;

    d.handle
        .set_asset_price(d.operator.clone(), d.collection.clone(), 0)
        .await
        .unwrap();
    d.handle.check_for_ltv(loan.id).await.unwrap();

    let err = d
        .handle
        .repay(d.borrower.clone(), loan.id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LendingError::AlreadyTerminal {
            id: loan.id,
            status: LoanStatus::Defaulted,
        }
    );
}

#[tokio::test]
async fn test_keeper_sweeps_breached_loans() {
    let d = deploy().await;
    let loan = start_loan(&d).await;
    let keeper = LoanKeeper::new(d.handle.clone(), 1_000);

    let report = keeper.tick().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.defaulted(), 0);

    d.handle
        .set_asset_price(d.operator.clone(), d.collection.clone(), 140 * ETHER)
        .await
        .unwrap();
    // 100 / 140 floors to 7142 bps, above the 7000 limit.
    let report = keeper.tick().await.unwrap();
    assert_eq!(report.ltv_breached, vec![loan.id]);
    assert_eq!(d.handle.owner_of(d.asset.clone()).await.unwrap(), d.lender);
}

#[test]
fn test_collaborators_without_marketplace() {
    let mut token = MemoryToken::new("PAY");
    let alice = AccountId::new("0xalice");
    token.mint(&alice, 5).unwrap();
    assert_eq!(token.total_supply(), 5);

    let mut assets = MemoryCollections::new();
    let asset = AssetRef::new("0xnft", 7);
    assets.mint(&alice, &asset).unwrap();
    assert_eq!(assets.owner_of(&asset).unwrap(), alice);
}
