//! Lending core: balance ledger, collateral custody, price gate and the
//! marketplace that orchestrates them, plus the actor and keeper that run it.

pub mod actor;
pub mod clock;
pub mod collection;
pub mod custodian;
pub mod keeper;
pub mod ledger;
pub mod marketplace;
pub mod oracle;
pub mod price_gate;
pub mod token;
