use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LendingError;

/// Fungible amount in the payment token's smallest unit.
pub type Amount = u128;

/// Basis-point denominator for loan-to-value ratios (100%).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// An account or contract address.
///
/// Addresses are compared case-insensitively, so they are normalised to
/// lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A specific non-fungible asset: collection contract plus token id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef {
    pub contract: AccountId,
    pub token_id: u64,
}

impl AssetRef {
    pub fn new(contract: impl Into<AccountId>, token_id: u64) -> Self {
        Self {
            contract: contract.into(),
            token_id,
        }
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.contract, self.token_id)
    }
}

/// Terms a borrower publishes when listing an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTerms {
    pub borrower: AccountId,
    pub asset: AssetRef,
    pub loan_amount: Amount,
    pub repay_amount: Amount,
    /// Loan duration in seconds.
    pub loan_duration: u64,
    /// Maximum loan-to-value before forced default, in basis points.
    pub max_ltv: u32,
}

impl ListingTerms {
    /// Reject malformed terms before anything is recorded.
    pub fn validate(&self) -> Result<(), LendingError> {
        if self.loan_amount == 0 {
            return Err(LendingError::Validation(
                "loan_amount must be positive".to_string(),
            ));
        }
        if self.repay_amount <= self.loan_amount {
            return Err(LendingError::Validation(format!(
                "repay_amount ({}) must exceed loan_amount ({})",
                self.repay_amount, self.loan_amount
            )));
        }
        if self.loan_duration == 0 {
            return Err(LendingError::Validation(
                "loan_duration must be positive".to_string(),
            ));
        }
        if loan_duration_delta(self.loan_duration).is_none() {
            return Err(LendingError::Validation(format!(
                "loan_duration {} is out of range",
                self.loan_duration
            )));
        }
        if self.max_ltv == 0 || self.max_ltv > BPS_DENOMINATOR {
            return Err(LendingError::Validation(format!(
                "max_ltv must be within 1..={}, got {}",
                BPS_DENOMINATOR, self.max_ltv
            )));
        }
        Ok(())
    }
}

/// A published listing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: u64,
    pub terms: ListingTerms,
    pub created_at: DateTime<Utc>,
}

/// A lender's request to fund a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub lender: AccountId,
    pub borrower: AccountId,
    pub listing_id: u64,
    pub loan_amount: Amount,
    pub repay_amount: Amount,
    pub loan_duration: u64,
    pub max_ltv: u32,
    /// Snapshot of the listing the lender saw when making the offer.
    pub listing: ListingTerms,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The terms of an offer as presented by the borrower on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub lender: AccountId,
    pub borrower: AccountId,
    pub asset: AssetRef,
    pub loan_amount: Amount,
    pub repay_amount: Amount,
    pub loan_duration: u64,
    pub max_ltv: u32,
}

/// A recorded offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: u64,
    pub listing_id: u64,
    pub terms: OfferTerms,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Loan produced by accepting this offer, if any.
    pub loan_id: Option<u64>,
}

impl Offer {
    pub fn is_accepted(&self) -> bool {
        self.loan_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Loan lifecycle state. `Repaid` and `Defaulted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Repaid,
    Defaulted,
}

impl LoanStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            LoanStatus::Active => false,
            LoanStatus::Repaid | LoanStatus::Defaulted => true,
        }
    }

    /// Numeric status code exposed to external readers.
    pub fn code(self) -> u8 {
        match self {
            LoanStatus::Active => 0,
            LoanStatus::Repaid => 1,
            LoanStatus::Defaulted => 2,
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Active => write!(f, "active"),
            LoanStatus::Repaid => write!(f, "repaid"),
            LoanStatus::Defaulted => write!(f, "defaulted"),
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(LoanStatus::Active),
            "repaid" => Ok(LoanStatus::Repaid),
            "defaulted" => Ok(LoanStatus::Defaulted),
            other => Err(LendingError::Validation(format!(
                "Unknown loan status '{}'",
                other
            ))),
        }
    }
}

/// Why a loan was forced into default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultReason {
    Expired,
    LtvBreach { ltv: u64 },
}

impl std::fmt::Display for DefaultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultReason::Expired => write!(f, "expired"),
            DefaultReason::LtvBreach { ltv } => write!(f, "ltv_breach({}bps)", ltv),
        }
    }
}

/// A funded loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: u64,
    pub offer_id: u64,
    pub listing_id: u64,
    pub borrower: AccountId,
    pub lender: AccountId,
    pub asset: AssetRef,
    pub loan_amount: Amount,
    pub repay_amount: Amount,
    pub loan_duration: u64,
    pub max_ltv: u32,
    pub start_time: DateTime<Utc>,
    pub status: LoanStatus,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// The instant after which the loan is past due.
    pub fn due_at(&self) -> DateTime<Utc> {
        loan_duration_delta(self.loan_duration)
            .and_then(|d| self.start_time.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A loan is expired strictly after `start_time + loan_duration`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.due_at()
    }
}

/// Convert a duration in seconds to a `TimeDelta`, if representable.
pub fn loan_duration_delta(seconds: u64) -> Option<TimeDelta> {
    i64::try_from(seconds).ok().and_then(TimeDelta::try_seconds)
}

/// Last-assigned identifiers. Zero means nothing has been created yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub last_listing_id: u64,
    pub last_offer_id: u64,
    pub last_loan_id: u64,
}

/// Notable state changes emitted by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketEvent {
    Deposited {
        account: AccountId,
        amount: Amount,
    },
    Withdrawn {
        account: AccountId,
        amount: Amount,
    },
    ListingCreated {
        listing_id: u64,
        borrower: AccountId,
        asset: AssetRef,
    },
    OfferMade {
        offer_id: u64,
        listing_id: u64,
        lender: AccountId,
    },
    LoanStarted {
        loan_id: u64,
        offer_id: u64,
        borrower: AccountId,
        lender: AccountId,
        loan_amount: Amount,
    },
    LoanRepaid {
        loan_id: u64,
        repay_amount: Amount,
    },
    LoanDefaulted {
        loan_id: u64,
        reason: DefaultReason,
    },
}

/// Snapshot of the value-conservation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub total_deposited: Amount,
    pub total_withdrawn: Amount,
    pub total_balances: Amount,
    /// Principal held by the protocol on behalf of active loans.
    pub escrowed_principal: Amount,
    /// External token balance held by the ledger vault.
    pub vault_holdings: Amount,
}

impl LedgerAudit {
    pub fn is_conserved(&self) -> bool {
        let Some(net) = self.total_deposited.checked_sub(self.total_withdrawn) else {
            return false;
        };
        self.total_balances.checked_add(self.escrowed_principal) == Some(net)
            && self.vault_holdings == net
    }
}
