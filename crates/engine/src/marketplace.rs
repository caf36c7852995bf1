//! Marketplace engine: listing, offer and loan lifecycle.
//!
//! Owns the ledger, the custodian and the listing/offer/loan records, and is
//! the only component that moves balances between accounts or releases
//! collateral. Each public operation either applies all of its effects or
//! returns an error with none applied:
//!
//! 1. Validation and authorization happen before any mutation.
//! 2. Steps that can still fail (external transfers) run first; if a later
//!    step fails the earlier ones are undone before the error is returned.
//! 3. Records and counters are only written after every transfer succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use lien_common::error::LendingError;
use lien_common::types::{
    AccountId, Amount, AssetRef, Counters, DefaultReason, LedgerAudit, Listing, ListingTerms,
    Loan, LoanStatus, MarketEvent, Offer, OfferRequest, OfferTerms,
};

use crate::clock::Clock;
use crate::collection::{AssetRegistry, MemoryCollections};
use crate::custodian::Custodian;
use crate::ledger::Ledger;
use crate::oracle::{PriceSource, SimplePriceOracle};
use crate::price_gate::PriceGate;
use crate::token::{FungibleToken, MemoryToken};

/// Accounts the marketplace operates under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketAddresses {
    /// Ledger vault; spender for deposits.
    pub pool: AccountId,
    /// Custodian; approved operator for collateral.
    pub escrow: AccountId,
}

/// Outcome of one pass over all active loans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: Vec<u64>,
    pub ltv_breached: Vec<u64>,
    /// Loans whose collateral could not be priced this pass.
    pub unpriced: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

impl SweepReport {
    pub fn defaulted(&self) -> usize {
        self.expired.len() + self.ltv_breached.len()
    }
}

pub struct Marketplace<T, A, P> {
    token: T,
    assets: A,
    prices: PriceGate<P>,
    clock: Arc<dyn Clock>,
    ledger: Ledger,
    custodian: Custodian,
    listings: BTreeMap<u64, Listing>,
    offers: BTreeMap<u64, Offer>,
    loans: BTreeMap<u64, Loan>,
    counters: Counters,
    events: Vec<MarketEvent>,
}

/// Marketplace wired to the in-process collaborators.
pub type MemoryMarketplace = Marketplace<MemoryToken, MemoryCollections, SimplePriceOracle>;

impl<T, A, P> Marketplace<T, A, P>
where
    T: FungibleToken,
    A: AssetRegistry,
    P: PriceSource,
{
    pub fn new(
        addresses: MarketAddresses,
        token: T,
        assets: A,
        prices: P,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token,
            assets,
            prices: PriceGate::new(prices),
            clock,
            ledger: Ledger::new(addresses.pool),
            custodian: Custodian::new(addresses.escrow),
            listings: BTreeMap::new(),
            offers: BTreeMap::new(),
            loans: BTreeMap::new(),
            counters: Counters::default(),
            events: Vec::new(),
        }
    }

    pub fn pool_address(&self) -> &AccountId {
        self.ledger.vault()
    }

    pub fn escrow_address(&self) -> &AccountId {
        self.custodian.address()
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    pub fn price_source_mut(&mut self) -> &mut P {
        self.prices.source_mut()
    }

    // ------------------------------------------------------------
    // Collaborator approvals
    // ------------------------------------------------------------

    /// Let the ledger vault pull up to `amount` of `owner`'s payment tokens.
    pub fn approve_payment(&mut self, owner: &AccountId, amount: Amount) {
        let pool = self.ledger.vault().clone();
        self.token.approve(owner, &pool, amount);
    }

    /// Let the custodian take `asset` from `owner` on acceptance.
    pub fn approve_collateral(
        &mut self,
        owner: &AccountId,
        asset: &AssetRef,
    ) -> Result<(), LendingError> {
        let escrow = self.custodian.address().clone();
        self.assets.approve(owner, &escrow, asset)
    }

    // ------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------

    pub fn deposit(&mut self, caller: &AccountId, amount: Amount) -> Result<Amount, LendingError> {
        let balance = self.ledger.deposit(&mut self.token, caller, amount)?;
        self.events.push(MarketEvent::Deposited {
            account: caller.clone(),
            amount,
        });
        Ok(balance)
    }

    pub fn withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<Amount, LendingError> {
        let balance = self.ledger.withdraw(&mut self.token, caller, amount)?;
        self.events.push(MarketEvent::Withdrawn {
            account: caller.clone(),
            amount,
        });
        Ok(balance)
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.ledger.balance_of(account)
    }

    // ------------------------------------------------------------
    // Listings and offers
    // ------------------------------------------------------------

    /// Publish a listing for an asset the caller owns.
    pub fn create_listing(
        &mut self,
        caller: &AccountId,
        terms: ListingTerms,
    ) -> Result<Listing, LendingError> {
        if caller != &terms.borrower {
            return Err(LendingError::Unauthorized(format!(
                "{} cannot list on behalf of {}",
                caller, terms.borrower
            )));
        }
        terms.validate()?;
        self.ensure_controls(caller, &terms.asset)?;

        let id = next_id(self.counters.last_listing_id, "listing id")?;
        let listing = Listing {
            id,
            terms,
            created_at: self.clock.now(),
        };

        self.listings.insert(id, listing.clone());
        self.counters.last_listing_id = id;
        self.events.push(MarketEvent::ListingCreated {
            listing_id: id,
            borrower: listing.terms.borrower.clone(),
            asset: listing.terms.asset.clone(),
        });

        tracing::info!(
            listing_id = id,
            borrower = %listing.terms.borrower,
            asset = %listing.terms.asset,
            loan_amount = listing.terms.loan_amount,
            "Listing created"
        );
        Ok(listing)
    }

    /// Record a lender's offer against an existing listing.
    ///
    /// Terms must echo the listing exactly. No funds are locked; the lender's
    /// balance is only checked on acceptance.
    pub fn make_offer(
        &mut self,
        caller: &AccountId,
        request: OfferRequest,
    ) -> Result<Offer, LendingError> {
        if caller != &request.lender {
            return Err(LendingError::Unauthorized(format!(
                "{} cannot make an offer on behalf of {}",
                caller, request.lender
            )));
        }

        let listing = self.listing(request.listing_id)?;
        let terms = &listing.terms;

        if request.borrower != terms.borrower {
            return Err(LendingError::Validation(format!(
                "Offer borrower {} does not match listing borrower {}",
                request.borrower, terms.borrower
            )));
        }
        if &request.listing != terms {
            return Err(LendingError::Validation(format!(
                "Listing snapshot does not match listing {}",
                listing.id
            )));
        }
        if request.loan_amount != terms.loan_amount
            || request.repay_amount != terms.repay_amount
            || request.loan_duration != terms.loan_duration
            || request.max_ltv != terms.max_ltv
        {
            return Err(LendingError::Validation(format!(
                "Offer terms must match listing {}",
                listing.id
            )));
        }

        let now = self.clock.now();
        if let Some(expires_at) = request.expires_at
            && expires_at <= now
        {
            return Err(LendingError::Validation(
                "Offer expiry must be in the future".to_string(),
            ));
        }

        let id = next_id(self.counters.last_offer_id, "offer id")?;
        let offer = Offer {
            id,
            listing_id: listing.id,
            terms: OfferTerms {
                lender: request.lender,
                borrower: request.borrower,
                asset: terms.asset.clone(),
                loan_amount: request.loan_amount,
                repay_amount: request.repay_amount,
                loan_duration: request.loan_duration,
                max_ltv: request.max_ltv,
            },
            expires_at: request.expires_at,
            created_at: now,
            loan_id: None,
        };

        self.offers.insert(id, offer.clone());
        self.counters.last_offer_id = id;
        self.events.push(MarketEvent::OfferMade {
            offer_id: id,
            listing_id: offer.listing_id,
            lender: offer.terms.lender.clone(),
        });

        tracing::info!(
            offer_id = id,
            listing_id = offer.listing_id,
            lender = %offer.terms.lender,
            "Offer made"
        );
        Ok(offer)
    }

    // ------------------------------------------------------------
    // Loan lifecycle
    // ------------------------------------------------------------

    /// Accept an offer: collateral into custody, principal from lender to
    /// borrower, loan recorded as `Active`.
    pub fn accept_offer(
        &mut self,
        caller: &AccountId,
        offer_id: u64,
        terms: &OfferTerms,
    ) -> Result<Loan, LendingError> {
        let offer = self.offer(offer_id)?.clone();
        if offer.is_accepted() {
            return Err(LendingError::AlreadyAccepted(offer_id));
        }
        let borrower = self.listing(offer.listing_id)?.terms.borrower.clone();
        if caller != &borrower {
            return Err(LendingError::Unauthorized(format!(
                "Only borrower {} may accept offer {}",
                borrower, offer_id
            )));
        }
        if &offer.terms != terms {
            return Err(LendingError::Validation(format!(
                "Presented terms do not match offer {}",
                offer_id
            )));
        }
        let now = self.clock.now();
        if offer.is_expired(now) {
            return Err(LendingError::OfferExpired(offer_id));
        }

        let OfferTerms {
            lender,
            asset,
            loan_amount,
            ..
        } = &offer.terms;

        self.ensure_controls(caller, asset)?;
        self.ledger.ensure_covers(lender, *loan_amount)?;
        let loan_id = next_id(self.counters.last_loan_id, "loan id")?;

        self.custodian
            .receive(&mut self.assets, asset, caller, loan_id)?;

        if let Err(e) = self.ledger.transfer(lender, caller, *loan_amount) {
            tracing::warn!(offer_id, error = %e, "Principal transfer failed, returning collateral");
            if let Err(rollback) = self.custodian.return_to_depositor(&mut self.assets, asset) {
                tracing::error!(offer_id, error = %rollback, "Collateral rollback failed");
            }
            return Err(e);
        }

        let loan = Loan {
            id: loan_id,
            offer_id,
            listing_id: offer.listing_id,
            borrower: caller.clone(),
            lender: lender.clone(),
            asset: asset.clone(),
            loan_amount: *loan_amount,
            repay_amount: offer.terms.repay_amount,
            loan_duration: offer.terms.loan_duration,
            max_ltv: offer.terms.max_ltv,
            start_time: now,
            status: LoanStatus::Active,
            settled_at: None,
        };

        self.loans.insert(loan_id, loan.clone());
        self.counters.last_loan_id = loan_id;
        if let Some(stored) = self.offers.get_mut(&offer_id) {
            stored.loan_id = Some(loan_id);
        }
        self.events.push(MarketEvent::LoanStarted {
            loan_id,
            offer_id,
            borrower: loan.borrower.clone(),
            lender: loan.lender.clone(),
            loan_amount: loan.loan_amount,
        });

        tracing::info!(
            loan_id,
            offer_id,
            borrower = %loan.borrower,
            lender = %loan.lender,
            asset = %loan.asset,
            loan_amount = loan.loan_amount,
            due_at = %loan.due_at(),
            "Loan started"
        );
        Ok(loan)
    }

    /// Borrower pays `repay_amount` to the lender and gets the collateral back.
    pub fn repay(&mut self, caller: &AccountId, loan_id: u64) -> Result<Loan, LendingError> {
        let now = self.clock.now();
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| LendingError::NotFound(format!("Loan {} not found", loan_id)))?;

        if caller != &loan.borrower {
            return Err(LendingError::Unauthorized(format!(
                "Only borrower {} may repay loan {}",
                loan.borrower, loan_id
            )));
        }
        if loan.status.is_terminal() {
            return Err(LendingError::AlreadyTerminal {
                id: loan_id,
                status: loan.status,
            });
        }

        self.ledger
            .transfer(&loan.borrower, &loan.lender, loan.repay_amount)?;

        if let Err(e) = self
            .custodian
            .release(&mut self.assets, &loan.asset, &loan.borrower)
        {
            tracing::warn!(loan_id, error = %e, "Collateral release failed, refunding repayment");
            if let Err(refund) =
                self.ledger
                    .transfer(&loan.lender, &loan.borrower, loan.repay_amount)
            {
                tracing::error!(loan_id, error = %refund, "Repayment refund failed");
            }
            return Err(e);
        }

        loan.status = LoanStatus::Repaid;
        loan.settled_at = Some(now);
        let loan = loan.clone();

        self.events.push(MarketEvent::LoanRepaid {
            loan_id,
            repay_amount: loan.repay_amount,
        });
        tracing::info!(
            loan_id,
            borrower = %loan.borrower,
            lender = %loan.lender,
            repay_amount = loan.repay_amount,
            "Loan repaid"
        );
        Ok(loan)
    }

    /// Default the loan if its deadline has passed. Anyone may call this;
    /// a terminal loan is left as is.
    pub fn check_for_default(&mut self, loan_id: u64) -> Result<LoanStatus, LendingError> {
        let now = self.clock.now();
        let loan = self.loan(loan_id)?;
        if loan.status.is_terminal() {
            tracing::debug!(loan_id, status = %loan.status, "Default check on settled loan");
            return Ok(loan.status);
        }
        if !loan.is_expired(now) {
            return Ok(LoanStatus::Active);
        }
        self.settle_default(loan_id, DefaultReason::Expired)
    }

    /// Default the loan if its current LTV exceeds `max_ltv`. Anyone may call
    /// this; a terminal loan is left as is. A pricing failure leaves the loan
    /// untouched.
    pub fn check_for_ltv(&mut self, loan_id: u64) -> Result<LoanStatus, LendingError> {
        let loan = self.loan(loan_id)?;
        if loan.status.is_terminal() {
            tracing::debug!(loan_id, status = %loan.status, "LTV check on settled loan");
            return Ok(loan.status);
        }

        let ltv = self.prices.ltv(loan.loan_amount, &loan.asset)?;
        if ltv <= u128::from(loan.max_ltv) {
            tracing::debug!(loan_id, ltv, max_ltv = loan.max_ltv, "LTV within bounds");
            return Ok(LoanStatus::Active);
        }

        let ltv = u64::try_from(ltv).unwrap_or(u64::MAX);
        self.settle_default(loan_id, DefaultReason::LtvBreach { ltv })
    }

    /// Current LTV of a loan in basis points.
    pub fn current_ltv(&self, loan_id: u64) -> Result<u128, LendingError> {
        let loan = self.loan(loan_id)?;
        self.prices.ltv(loan.loan_amount, &loan.asset)
    }

    fn settle_default(
        &mut self,
        loan_id: u64,
        reason: DefaultReason,
    ) -> Result<LoanStatus, LendingError> {
        let now = self.clock.now();
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| LendingError::NotFound(format!("Loan {} not found", loan_id)))?;

        match loan.status {
            LoanStatus::Active => {}
            LoanStatus::Repaid | LoanStatus::Defaulted => return Ok(loan.status),
        }

        self.custodian
            .release(&mut self.assets, &loan.asset, &loan.lender)?;

        loan.status = LoanStatus::Defaulted;
        loan.settled_at = Some(now);

        self.events
            .push(MarketEvent::LoanDefaulted { loan_id, reason });
        tracing::info!(
            loan_id,
            lender = %loan.lender,
            asset = %loan.asset,
            reason = %reason,
            "Loan defaulted, collateral seized"
        );
        Ok(LoanStatus::Defaulted)
    }

    /// Run the time check, then the value check, over every active loan.
    pub fn sweep_active_loans(&mut self) -> SweepReport {
        let active: Vec<u64> = self
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Active)
            .map(|l| l.id)
            .collect();

        let mut report = SweepReport {
            examined: active.len(),
            ..SweepReport::default()
        };

        for id in active {
            match self.check_for_default(id) {
                Ok(LoanStatus::Defaulted) => {
                    report.expired.push(id);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    report.failed.push((id, e.to_string()));
                    continue;
                }
            }

            match self.check_for_ltv(id) {
                Ok(LoanStatus::Defaulted) => report.ltv_breached.push(id),
                Ok(_) => {}
                Err(LendingError::UnsupportedAsset(_)) => report.unpriced.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        report
    }

    // ------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------

    pub fn listing(&self, id: u64) -> Result<&Listing, LendingError> {
        self.listings
            .get(&id)
            .ok_or_else(|| LendingError::NotFound(format!("Listing {} not found", id)))
    }

    pub fn offer(&self, id: u64) -> Result<&Offer, LendingError> {
        self.offers
            .get(&id)
            .ok_or_else(|| LendingError::NotFound(format!("Offer {} not found", id)))
    }

    pub fn loan(&self, id: u64) -> Result<&Loan, LendingError> {
        self.loans
            .get(&id)
            .ok_or_else(|| LendingError::NotFound(format!("Loan {} not found", id)))
    }

    /// All loans, optionally restricted to one status, in id order.
    pub fn loans(&self, status: Option<LoanStatus>) -> Vec<Loan> {
        self.loans
            .values()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .cloned()
            .collect()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn audit(&self) -> LedgerAudit {
        LedgerAudit {
            total_deposited: self.ledger.total_deposited(),
            total_withdrawn: self.ledger.total_withdrawn(),
            total_balances: self.ledger.total_balances(),
            // Principal is credited to the borrower at acceptance, so the
            // protocol never holds it on a loan's behalf.
            escrowed_principal: 0,
            vault_holdings: self.token.balance_of(self.ledger.vault()),
        }
    }

    /// Drain events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }

    fn ensure_controls(&self, caller: &AccountId, asset: &AssetRef) -> Result<(), LendingError> {
        let owner = self.assets.owner_of(asset)?;
        if &owner != caller {
            return Err(LendingError::NotAssetOwner {
                asset: asset.clone(),
                caller: caller.clone(),
            });
        }
        Ok(())
    }
}

fn next_id(last: u64, what: &str) -> Result<u64, LendingError> {
    last.checked_add(1)
        .ok_or_else(|| LendingError::Overflow(what.to_string()))
}
