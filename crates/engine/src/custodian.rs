//! Collateral custodian: holds one asset per active loan.
//!
//! Custody bookkeeping only: receive an asset from its owner, release it to
//! exactly one recipient. No loan logic lives here.

use std::collections::HashMap;

use lien_common::error::LendingError;
use lien_common::types::{AccountId, AssetRef};

use crate::collection::AssetRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodyRecord {
    pub depositor: AccountId,
    pub loan_id: u64,
}

#[derive(Debug)]
pub struct Custodian {
    address: AccountId,
    holdings: HashMap<AssetRef, CustodyRecord>,
}

impl Custodian {
    pub fn new(address: AccountId) -> Self {
        Self {
            address,
            holdings: HashMap::new(),
        }
    }

    /// The account assets are approved to and held by.
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    pub fn is_held(&self, asset: &AssetRef) -> bool {
        self.holdings.contains_key(asset)
    }

    pub fn record(&self, asset: &AssetRef) -> Option<&CustodyRecord> {
        self.holdings.get(asset)
    }

    pub fn held_count(&self) -> usize {
        self.holdings.len()
    }

    /// Take custody of `asset` from `from` for `loan_id`.
    ///
    /// The custodian must be the approved operator for the asset.
    pub fn receive(
        &mut self,
        assets: &mut impl AssetRegistry,
        asset: &AssetRef,
        from: &AccountId,
        loan_id: u64,
    ) -> Result<(), LendingError> {
        if let Some(existing) = self.holdings.get(asset) {
            return Err(LendingError::TransferRejected(format!(
                "Asset {} is already in custody for loan {}",
                asset, existing.loan_id
            )));
        }

        assets
            .transfer_from(&self.address, from, &self.address, asset)
            .map_err(|e| {
                if matches!(e, LendingError::TransferRejected(_)) {
                    e
                } else {
                    LendingError::TransferRejected(e.to_string())
                }
            })?;

        self.holdings.insert(
            asset.clone(),
            CustodyRecord {
                depositor: from.clone(),
                loan_id,
            },
        );

        tracing::info!(asset = %asset, from = %from, loan_id, "Collateral taken into custody");
        Ok(())
    }

    /// Hand `asset` to `to` and clear its custody record.
    pub fn release(
        &mut self,
        assets: &mut impl AssetRegistry,
        asset: &AssetRef,
        to: &AccountId,
    ) -> Result<CustodyRecord, LendingError> {
        if !self.holdings.contains_key(asset) {
            return Err(LendingError::NotInCustody(asset.clone()));
        }

        assets.transfer_from(&self.address, &self.address, to, asset)?;

        let record = self
            .holdings
            .remove(asset)
            .ok_or_else(|| LendingError::NotInCustody(asset.clone()))?;

        tracing::info!(asset = %asset, to = %to, loan_id = record.loan_id, "Collateral released");
        Ok(record)
    }

    /// Undo a `receive`: give `asset` back to its depositor and restore the
    /// depositor's approval of the custodian, which the transfer cleared.
    pub fn return_to_depositor(
        &mut self,
        assets: &mut impl AssetRegistry,
        asset: &AssetRef,
    ) -> Result<CustodyRecord, LendingError> {
        let depositor = self
            .holdings
            .get(asset)
            .map(|r| r.depositor.clone())
            .ok_or_else(|| LendingError::NotInCustody(asset.clone()))?;

        let record = self.release(assets, asset, &depositor)?;
        assets.approve(&depositor, &self.address, asset)?;
        Ok(record)
    }
}
