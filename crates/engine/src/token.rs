//! Payment token collaborator.
//!
//! The ledger moves external value only through [`FungibleToken`]. The
//! in-memory implementation follows the usual allowance-then-transfer rules.

use std::collections::HashMap;

use lien_common::error::LendingError;
use lien_common::types::{AccountId, Amount};

/// Standard fungible-token surface consumed by the ledger.
pub trait FungibleToken: Send + 'static {
    fn balance_of(&self, owner: &AccountId) -> Amount;

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount);

    /// Move `amount` from `from` to `to` on `from`'s own authority.
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount)
    -> Result<(), LendingError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LendingError>;

    /// Bootstrap-only issuance.
    fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), LendingError>;

    fn total_supply(&self) -> Amount;
}

/// In-memory payment token.
#[derive(Debug, Default)]
pub struct MemoryToken {
    symbol: String,
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    total_supply: Amount,
}

impl MemoryToken {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn move_balance(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(LendingError::TokenTransfer(format!(
                "{} holds {} {}, cannot send {}",
                from, available, self.symbol, amount
            )));
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow(format!("{} balance of {}", self.symbol, to)))?;

        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

impl FungibleToken for MemoryToken {
    fn balance_of(&self, owner: &AccountId) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        if spender == from {
            return self.move_balance(from, to, amount);
        }

        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(LendingError::TokenTransfer(format!(
                "{} is approved for {} {} of {}, cannot pull {}",
                spender, allowed, self.symbol, from, amount
            )));
        }

        self.move_balance(from, to, amount)?;
        self.approve(from, spender, allowed - amount);
        Ok(())
    }

    fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), LendingError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow(format!("{} total supply", self.symbol)))?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow(format!("{} balance of {}", self.symbol, to)))?;

        self.total_supply = supply;
        self.balances.insert(to.clone(), balance);
        Ok(())
    }

    fn total_supply(&self) -> Amount {
        self.total_supply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut token = MemoryToken::new("PAY");
        token.mint(&acct("0xa"), 100).unwrap();
        token.transfer(&acct("0xa"), &acct("0xb"), 40).unwrap();
        assert_eq!(token.balance_of(&acct("0xa")), 60);
        assert_eq!(token.balance_of(&acct("0xb")), 40);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_transfer_from_requires_allowance() {
        let mut token = MemoryToken::new("PAY");
        token.mint(&acct("0xa"), 100).unwrap();

        let err = token
            .transfer_from(&acct("0xpool"), &acct("0xa"), &acct("0xpool"), 10)
            .unwrap_err();
        assert!(matches!(err, LendingError::TokenTransfer(_)));

        token.approve(&acct("0xa"), &acct("0xpool"), 25);
        token
            .transfer_from(&acct("0xpool"), &acct("0xa"), &acct("0xpool"), 10)
            .unwrap();
        assert_eq!(token.allowance(&acct("0xa"), &acct("0xpool")), 15);
        assert_eq!(token.balance_of(&acct("0xpool")), 10);
    }

    #[test]
    fn test_failed_transfer_changes_nothing() {
        let mut token = MemoryToken::new("PAY");
        token.mint(&acct("0xa"), 5).unwrap();
        token.approve(&acct("0xa"), &acct("0xpool"), 50);

        assert!(
            token
                .transfer_from(&acct("0xpool"), &acct("0xa"), &acct("0xpool"), 6)
                .is_err()
        );
        assert_eq!(token.balance_of(&acct("0xa")), 5);
        assert_eq!(token.allowance(&acct("0xa"), &acct("0xpool")), 50);
    }

    #[test]
    fn test_mint_overflow_rejected() {
        let mut token = MemoryToken::new("PAY");
        token.mint(&acct("0xa"), Amount::MAX).unwrap();
        assert!(matches!(
            token.mint(&acct("0xb"), 1),
            Err(LendingError::Overflow(_))
        ));
        assert_eq!(token.balance_of(&acct("0xb")), 0);
    }
}
