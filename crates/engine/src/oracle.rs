//! Price source collaborator.
//!
//! Prices are quoted per collection contract, as the amount of payment token
//! (smallest unit) one whole token of the collection is worth. Nothing here
//! promises freshness.

use std::collections::{HashMap, HashSet};

use lien_common::error::LendingError;
use lien_common::types::{AccountId, Amount};

pub trait PriceSource: Send + 'static {
    fn is_supported(&self, contract: &AccountId) -> bool;

    /// Latest quoted price, or `None` if no price was ever set.
    fn price_of(&self, contract: &AccountId) -> Option<Amount>;
}

/// Operator-administered price table.
#[derive(Debug)]
pub struct SimplePriceOracle {
    operator: AccountId,
    supported: HashSet<AccountId>,
    prices: HashMap<AccountId, Amount>,
}

impl SimplePriceOracle {
    pub fn new(operator: AccountId) -> Self {
        Self {
            operator,
            supported: HashSet::new(),
            prices: HashMap::new(),
        }
    }

    pub fn operator(&self) -> &AccountId {
        &self.operator
    }

    fn ensure_operator(&self, caller: &AccountId) -> Result<(), LendingError> {
        if caller != &self.operator {
            return Err(LendingError::Unauthorized(format!(
                "{} is not the oracle operator",
                caller
            )));
        }
        Ok(())
    }

    pub fn update_supported_asset(
        &mut self,
        caller: &AccountId,
        contract: &AccountId,
        supported: bool,
    ) -> Result<(), LendingError> {
        self.ensure_operator(caller)?;
        if supported {
            self.supported.insert(contract.clone());
        } else {
            self.supported.remove(contract);
        }
        tracing::info!(contract = %contract, supported, "Oracle support updated");
        Ok(())
    }

    pub fn set_asset_price(
        &mut self,
        caller: &AccountId,
        contract: &AccountId,
        price: Amount,
    ) -> Result<(), LendingError> {
        self.ensure_operator(caller)?;
        self.prices.insert(contract.clone(), price);
        tracing::info!(contract = %contract, price, "Oracle price updated");
        Ok(())
    }
}

impl PriceSource for SimplePriceOracle {
    fn is_supported(&self, contract: &AccountId) -> bool {
        self.supported.contains(contract)
    }

    fn price_of(&self, contract: &AccountId) -> Option<Amount> {
        self.prices.get(contract).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_gated_updates() {
        let operator = AccountId::new("0xop");
        let nft = AccountId::new("0xnft");
        let mut oracle = SimplePriceOracle::new(operator.clone());

        let err = oracle
            .set_asset_price(&AccountId::new("0xmallory"), &nft, 1)
            .unwrap_err();
        assert!(matches!(err, LendingError::Unauthorized(_)));
        assert_eq!(oracle.price_of(&nft), None);

        oracle.update_supported_asset(&operator, &nft, true).unwrap();
        oracle.set_asset_price(&operator, &nft, 200).unwrap();
        assert!(oracle.is_supported(&nft));
        assert_eq!(oracle.price_of(&nft), Some(200));

        oracle.update_supported_asset(&operator, &nft, false).unwrap();
        assert!(!oracle.is_supported(&nft));
    }
}
