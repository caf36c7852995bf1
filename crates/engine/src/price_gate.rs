//! Price gate: read-through adapter from the price source to loan-to-value.
//!
//! Every call goes to the source; nothing is cached between calls, and a
//! value may be stale or move in either direction between two reads.

use lien_common::error::LendingError;
use lien_common::types::{Amount, AssetRef, BPS_DENOMINATOR};

use crate::oracle::PriceSource;

pub struct PriceGate<P> {
    source: P,
}

impl<P: PriceSource> PriceGate<P> {
    pub fn new(source: P) -> Self {
        Self { source }
    }

    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }

    pub fn is_supported(&self, asset: &AssetRef) -> bool {
        self.source.is_supported(&asset.contract)
    }

    /// Current value of one unit of `asset`.
    pub fn value_of(&self, asset: &AssetRef) -> Result<Amount, LendingError> {
        if !self.is_supported(asset) {
            return Err(LendingError::UnsupportedAsset(asset.clone()));
        }
        self.source
            .price_of(&asset.contract)
            .ok_or_else(|| LendingError::UnsupportedAsset(asset.clone()))
    }

    /// Loan-to-value of `loan_amount` against `asset`, in basis points.
    pub fn ltv(&self, loan_amount: Amount, asset: &AssetRef) -> Result<u128, LendingError> {
        let value = self.value_of(asset)?;
        Ok(ltv_bps(loan_amount, value))
    }
}

/// `loan_amount * 10000 / value`, rounded down. A worthless collateral has
/// unbounded LTV.
pub fn ltv_bps(loan_amount: Amount, value: Amount) -> u128 {
    if value == 0 {
        return u128::MAX;
    }
    let bps = u128::from(BPS_DENOMINATOR);
    if let Some(scaled) = loan_amount.checked_mul(bps) {
        return scaled / value;
    }
    // loan * bps / value = q * bps + r * bps / value, with r < value.
    let whole = (loan_amount / value).saturating_mul(bps);
    whole.saturating_add(mul_div_below(loan_amount % value, BPS_DENOMINATOR, value))
}

/// `floor(r * factor / value)` for `r < value`, without a wide intermediate.
///
/// Walks the bits of `factor` keeping `r * prefix = q * value + rem` with
/// `rem < value`, so every step stays inside u128.
fn mul_div_below(r: u128, factor: u32, value: u128) -> u128 {
    debug_assert!(r < value);
    let add_mod = |q: &mut u128, rem: u128, addend: u128| -> u128 {
        // rem + addend may not fit; compare against the headroom instead.
        if rem >= value - addend {
            *q += 1;
            rem - (value - addend)
        } else {
            rem + addend
        }
    };

    let mut q: u128 = 0;
    let mut rem: u128 = 0;
    for bit in (0..u32::BITS - factor.leading_zeros()).rev() {
        q <<= 1;
        rem = add_mod(&mut q, rem, rem);
        if factor >> bit & 1 == 1 {
            rem = add_mod(&mut q, rem, r);
        }
    }
    q
}
