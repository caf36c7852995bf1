//! Balance ledger: per-account fungible balances backed by a token vault.
//!
//! `deposit` pulls tokens into the vault and credits the caller, `withdraw`
//! debits and pays out. `transfer` only moves internal balances and is only
//! reachable from the marketplace. Every operation either applies fully or
//! leaves both the ledger and the token untouched.

use std::collections::HashMap;

use lien_common::error::LendingError;
use lien_common::types::{AccountId, Amount};

use crate::token::FungibleToken;

#[derive(Debug)]
pub struct Ledger {
    vault: AccountId,
    balances: HashMap<AccountId, Amount>,
    total_deposited: Amount,
    total_withdrawn: Amount,
}

impl Ledger {
    pub fn new(vault: AccountId) -> Self {
        Self {
            vault,
            balances: HashMap::new(),
            total_deposited: 0,
            total_withdrawn: 0,
        }
    }

    /// The account holding all deposited tokens.
    pub fn vault(&self) -> &AccountId {
        &self.vault
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Sum of all internal balances.
    pub fn total_balances(&self) -> Amount {
        self.balances.values().copied().sum()
    }

    pub fn total_deposited(&self) -> Amount {
        self.total_deposited
    }

    pub fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }

    /// Pull `amount` tokens from `account` into the vault and credit it.
    ///
    /// The vault must already be approved as a spender for at least `amount`.
    /// Returns the new balance.
    pub fn deposit(
        &mut self,
        token: &mut impl FungibleToken,
        account: &AccountId,
        amount: Amount,
    ) -> Result<Amount, LendingError> {
        if amount == 0 {
            return Err(LendingError::Validation(
                "deposit amount must be positive".to_string(),
            ));
        }
        if account == &self.vault {
            return Err(LendingError::Unauthorized(
                "the vault cannot deposit into itself".to_string(),
            ));
        }

        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow(format!("ledger balance of {}", account)))?;
        let total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow("total deposited".to_string()))?;

        token.transfer_from(&self.vault, account, &self.vault, amount)?;

        self.balances.insert(account.clone(), balance);
        self.total_deposited = total_deposited;

        tracing::info!(account = %account, amount, balance, "Deposit credited");
        Ok(balance)
    }

    /// Debit `amount` from `account` and pay it out from the vault.
    ///
    /// Returns the new balance.
    pub fn withdraw(
        &mut self,
        token: &mut impl FungibleToken,
        account: &AccountId,
        amount: Amount,
    ) -> Result<Amount, LendingError> {
        if amount == 0 {
            return Err(LendingError::Validation(
                "withdraw amount must be positive".to_string(),
            ));
        }
        let available = self.balance_of(account);
        if available < amount {
            return Err(LendingError::InsufficientBalance {
                account: account.clone(),
                required: amount,
                available,
            });
        }
        let total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow("total withdrawn".to_string()))?;

        token.transfer(&self.vault, account, amount)?;

        let balance = available - amount;
        self.balances.insert(account.clone(), balance);
        self.total_withdrawn = total_withdrawn;

        tracing::info!(account = %account, amount, balance, "Withdrawal paid out");
        Ok(balance)
    }

    /// Move `amount` between two internal balances. Total balance is unchanged.
    pub(crate) fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        self.ensure_covers(from, amount)?;
        if from == to || amount == 0 {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| LendingError::Overflow(format!("ledger balance of {}", to)))?;

        let available = self.balance_of(from);
        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);

        tracing::debug!(from = %from, to = %to, amount, "Ledger transfer");
        Ok(())
    }

    /// Check that `account` could pay `amount` right now.
    pub fn ensure_covers(&self, account: &AccountId, amount: Amount) -> Result<(), LendingError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LendingError::InsufficientBalance {
                account: account.clone(),
                required: amount,
                available,
            });
        }
        Ok(())
    }
}
