//! Manager collateral (mortgage) boundary.
//!
//! The deposit a manager must post to operate a fund. Posted exactly at
//! `finalize()`; released at a clean `close()` or at the liquidation
//! ownership transfer, where the vault implementation decides the forfeit
//! destination.

use crate::core::error::FundError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

pub trait CollateralVault: Send + Sync {
    fn post_collateral(&self, manager: &str, tier: u8) -> Result<(), FundError>;
    fn return_collateral(&self, manager: &str) -> Result<(), FundError>;
}

impl<T: CollateralVault + ?Sized> CollateralVault for std::sync::Arc<T> {
    fn post_collateral(&self, manager: &str, tier: u8) -> Result<(), FundError> {
        (**self).post_collateral(manager, tier)
    }

    fn return_collateral(&self, manager: &str) -> Result<(), FundError> {
        (**self).return_collateral(manager)
    }
}

/// In-memory vault with a fixed deposit schedule per tier.
#[derive(Debug, Default)]
pub struct MemoryVault {
    posted: Mutex<HashMap<String, Decimal>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_amount(tier: u8) -> Decimal {
        Decimal::from(1000u32) * Decimal::from(u32::from(tier).max(1))
    }

    pub fn posted_amount(&self, manager: &str) -> Decimal {
        self.posted
            .lock()
            .unwrap()
            .get(manager)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

impl CollateralVault for MemoryVault {
    fn post_collateral(&self, manager: &str, tier: u8) -> Result<(), FundError> {
        let amount = Self::tier_amount(tier);
        self.posted
            .lock()
            .unwrap()
            .insert(manager.to_string(), amount);
        debug!(%manager, tier, %amount, "collateral posted");
        Ok(())
    }

    fn return_collateral(&self, manager: &str) -> Result<(), FundError> {
        self.posted.lock().unwrap().remove(manager);
        debug!(%manager, "collateral returned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn post_and_return_round_trip() {
        let vault = MemoryVault::new();
        vault.post_collateral("mgr", 3).unwrap();
        assert_eq!(vault.posted_amount("mgr"), dec!(3000));
        vault.return_collateral("mgr").unwrap();
        assert_eq!(vault.posted_amount("mgr"), Decimal::ZERO);
    }
}
