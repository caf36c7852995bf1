//! Non-fungible collateral collaborator.
//!
//! One owner per token, at most one approved operator, approval cleared on
//! every transfer.

use std::collections::HashMap;

use lien_common::error::LendingError;
use lien_common::types::{AccountId, AssetRef};

pub trait AssetRegistry: Send + 'static {
    fn owner_of(&self, asset: &AssetRef) -> Result<AccountId, LendingError>;

    fn get_approved(&self, asset: &AssetRef) -> Option<AccountId>;

    /// Approve `operator` to move `asset`. Only the current owner may approve.
    fn approve(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        asset: &AssetRef,
    ) -> Result<(), LendingError>;

    /// Move `asset` from `from` to `to`. `operator` must be the owner or the
    /// approved operator, and `from` must be the current owner.
    fn transfer_from(
        &mut self,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetRef,
    ) -> Result<(), LendingError>;

    /// Bootstrap-only issuance.
    fn mint(&mut self, to: &AccountId, asset: &AssetRef) -> Result<(), LendingError>;
}

#[derive(Debug, Clone)]
struct TokenRecord {
    owner: AccountId,
    approved: Option<AccountId>,
}

/// In-memory registry spanning any number of collection contracts.
#[derive(Debug, Default)]
pub struct MemoryCollections {
    tokens: HashMap<AssetRef, TokenRecord>,
}

impl MemoryCollections {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, asset: &AssetRef) -> Result<&TokenRecord, LendingError> {
        self.tokens
            .get(asset)
            .ok_or_else(|| LendingError::NotFound(format!("Asset {} does not exist", asset)))
    }
}

impl AssetRegistry for MemoryCollections {
    fn owner_of(&self, asset: &AssetRef) -> Result<AccountId, LendingError> {
        self.record(asset).map(|r| r.owner.clone())
    }

    fn get_approved(&self, asset: &AssetRef) -> Option<AccountId> {
        self.tokens.get(asset).and_then(|r| r.approved.clone())
    }

    fn approve(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        asset: &AssetRef,
    ) -> Result<(), LendingError> {
        let owner = self.owner_of(asset)?;
        if &owner != caller {
            return Err(LendingError::NotAssetOwner {
                asset: asset.clone(),
                caller: caller.clone(),
            });
        }
        if let Some(record) = self.tokens.get_mut(asset) {
            record.approved = Some(operator.clone());
        }
        Ok(())
    }

    fn transfer_from(
        &mut self,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetRef,
    ) -> Result<(), LendingError> {
        let record = self.record(asset)?;
        if &record.owner != from {
            return Err(LendingError::TransferRejected(format!(
                "{} is not the owner of {}",
                from, asset
            )));
        }
        if operator != from && record.approved.as_ref() != Some(operator) {
            return Err(LendingError::TransferRejected(format!(
                "{} is not approved to move {}",
                operator, asset
            )));
        }

        self.tokens.insert(
            asset.clone(),
            TokenRecord {
                owner: to.clone(),
                approved: None,
            },
        );
        Ok(())
    }

    fn mint(&mut self, to: &AccountId, asset: &AssetRef) -> Result<(), LendingError> {
        if self.tokens.contains_key(asset) {
            return Err(LendingError::Validation(format!(
                "Asset {} already minted",
                asset
            )));
        }
        self.tokens.insert(
            asset.clone(),
            TokenRecord {
                owner: to.clone(),
                approved: None,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn test_mint_and_owner() {
        let mut nfts = MemoryCollections::new();
        let asset = AssetRef::new("0xnft1", 1);
        nfts.mint(&acct("0xalice"), &asset).unwrap();
        assert_eq!(nfts.owner_of(&asset).unwrap(), acct("0xalice"));
        assert!(nfts.mint(&acct("0xbob"), &asset).is_err());
    }

    #[test]
    fn test_same_token_id_in_different_collections() {
        let mut nfts = MemoryCollections::new();
        nfts.mint(&acct("0xalice"), &AssetRef::new("0xnft1", 1))
            .unwrap();
        nfts.mint(&acct("0xbob"), &AssetRef::new("0xnft2", 1))
            .unwrap();
        assert_eq!(
            nfts.owner_of(&AssetRef::new("0xnft2", 1)).unwrap(),
            acct("0xbob")
        );
    }

    #[test]
    fn test_only_owner_can_approve() {
        let mut nfts = MemoryCollections::new();
        let asset = AssetRef::new("0xnft1", 7);
        nfts.mint(&acct("0xalice"), &asset).unwrap();
        let err = nfts
            .approve(&acct("0xmallory"), &acct("0xescrow"), &asset)
            .unwrap_err();
        assert!(matches!(err, LendingError::NotAssetOwner { .. }));
    }

    #[test]
    fn test_approved_operator_transfer_clears_approval() {
        let mut nfts = MemoryCollections::new();
        let asset = AssetRef::new("0xnft1", 7);
        nfts.mint(&acct("0xalice"), &asset).unwrap();
        nfts.approve(&acct("0xalice"), &acct("0xescrow"), &asset)
            .unwrap();

        nfts.transfer_from(&acct("0xescrow"), &acct("0xalice"), &acct("0xescrow"), &asset)
            .unwrap();
        assert_eq!(nfts.owner_of(&asset).unwrap(), acct("0xescrow"));
        assert_eq!(nfts.get_approved(&asset), None);
    }

    #[test]
    fn test_unapproved_operator_rejected() {
        let mut nfts = MemoryCollections::new();
        let asset = AssetRef::new("0xnft1", 7);
        nfts.mint(&acct("0xalice"), &asset).unwrap();
        let err = nfts
            .transfer_from(&acct("0xescrow"), &acct("0xalice"), &acct("0xescrow"), &asset)
            .unwrap_err();
        assert!(matches!(err, LendingError::TransferRejected(_)));
        assert_eq!(nfts.owner_of(&asset).unwrap(), acct("0xalice"));
    }
}
