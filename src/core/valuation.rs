//! Asset holdings and the valuation boundary.
//!
//! The engine keeps its own book of held assets; valuing them in the
//! denomination asset is delegated to an [`AssetValuator`]. Staleness or
//! failure of an underlying feed must surface as [`FundError::StalePrice`],
//! never as a stale zero.

use crate::core::error::FundError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Assets currently held by a fund. Value earmarked for pending redemption
/// rounds lives in the queue's pool, outside these holdings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holdings {
    denomination: String,
    reserve: Decimal,
    foreign: HashMap<String, Decimal>,
}

impl Holdings {
    pub fn new(denomination: impl Into<String>) -> Self {
        Self {
            denomination: denomination.into(),
            reserve: Decimal::ZERO,
            foreign: HashMap::new(),
        }
    }

    pub fn denomination(&self) -> &str {
        &self.denomination
    }

    /// Free denomination balance, the only asset redemptions pay out in.
    pub fn reserve(&self) -> Decimal {
        self.reserve
    }

    pub fn foreign_assets(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.foreign.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn deposit_reserve(&mut self, amount: Decimal) {
        self.reserve += amount;
    }

    pub fn withdraw_reserve(&mut self, amount: Decimal) -> Result<(), FundError> {
        if amount > self.reserve {
            return Err(FundError::InsufficientBalance);
        }
        self.reserve -= amount;
        Ok(())
    }

    /// Overwrite the balance of one asset. Used by strategy execution results
    /// and by tests simulating donations or market moves.
    pub fn set_asset(&mut self, asset: &str, amount: Decimal) {
        if asset == self.denomination {
            self.reserve = amount;
        } else if amount.is_zero() {
            self.foreign.remove(asset);
        } else {
            self.foreign.insert(asset.to_string(), amount);
        }
    }

    pub fn asset_balance(&self, asset: &str) -> Decimal {
        if asset == self.denomination {
            self.reserve
        } else {
            self.foreign.get(asset).copied().unwrap_or(Decimal::ZERO)
        }
    }

    /// Largest non-denomination balance, for the close-time dust check.
    pub fn max_foreign_balance(&self) -> Decimal {
        self.foreign
            .values()
            .copied()
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Converts arbitrary held assets to a total value in the denomination asset.
pub trait AssetValuator: Send + Sync {
    fn total_value(&self, holdings: &Holdings) -> Result<Decimal, FundError>;
}

impl<T: AssetValuator + ?Sized> AssetValuator for std::sync::Arc<T> {
    fn total_value(&self, holdings: &Holdings) -> Result<Decimal, FundError> {
        (**self).total_value(holdings)
    }
}

#[derive(Debug, Clone)]
struct Quote {
    price: Decimal,
    as_of: DateTime<Utc>,
}

/// Offline valuator backed by a quote table with a freshness window.
/// The denomination asset always values at par.
#[derive(Debug, Clone)]
pub struct PriceTableValuator {
    quotes: HashMap<String, Quote>,
    max_age: Duration,
    now: DateTime<Utc>,
}

impl PriceTableValuator {
    pub fn new(max_age: Duration, now: DateTime<Utc>) -> Self {
        Self {
            quotes: HashMap::new(),
            max_age,
            now,
        }
    }

    pub fn insert(&mut self, asset: &str, price: Decimal, as_of: DateTime<Utc>) {
        self.quotes.insert(asset.to_string(), Quote { price, as_of });
    }

    /// Advance the valuator's view of time; older quotes go stale.
    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }
}

impl AssetValuator for PriceTableValuator {
    fn total_value(&self, holdings: &Holdings) -> Result<Decimal, FundError> {
        let mut total = holdings.reserve();
        for (asset, amount) in holdings.foreign_assets() {
            let quote = self
                .quotes
                .get(asset)
                .ok_or_else(|| FundError::StalePrice(asset.to_string()))?;
            if self.now - quote.as_of > self.max_age {
                return Err(FundError::StalePrice(asset.to_string()));
            }
            total += amount * quote.price;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn reserve_moves_in_and_out() {
        let mut holdings = Holdings::new("USDC");
        holdings.deposit_reserve(dec!(100));
        assert_eq!(
            holdings.withdraw_reserve(dec!(150)),
            Err(FundError::InsufficientBalance)
        );
        holdings.withdraw_reserve(dec!(40)).unwrap();
        assert_eq!(holdings.reserve(), dec!(60));
    }

    #[test]
    fn set_asset_routes_denomination_to_reserve() {
        let mut holdings = Holdings::new("USDC");
        holdings.set_asset("USDC", dec!(10));
        holdings.set_asset("WETH", dec!(2));
        assert_eq!(holdings.reserve(), dec!(10));
        assert_eq!(holdings.asset_balance("WETH"), dec!(2));
        assert_eq!(holdings.max_foreign_balance(), dec!(2));
        holdings.set_asset("WETH", Decimal::ZERO);
        assert_eq!(holdings.max_foreign_balance(), Decimal::ZERO);
    }

    #[test]
    fn table_valuator_sums_priced_assets() {
        let mut holdings = Holdings::new("USDC");
        holdings.deposit_reserve(dec!(100));
        holdings.set_asset("WETH", dec!(2));

        let mut valuator = PriceTableValuator::new(Duration::minutes(10), t0());
        valuator.insert("WETH", dec!(2500), t0());
        assert_eq!(valuator.total_value(&holdings).unwrap(), dec!(5100));
    }

    #[test]
    fn stale_or_missing_quote_propagates_not_zero() {
        let mut holdings = Holdings::new("USDC");
        holdings.set_asset("WETH", dec!(1));

        let mut valuator = PriceTableValuator::new(Duration::minutes(10), t0());
        assert_eq!(
            valuator.total_value(&holdings),
            Err(FundError::StalePrice("WETH".to_string()))
        );

        valuator.insert("WETH", dec!(2500), t0());
        valuator.set_now(t0() + Duration::hours(1));
        assert_eq!(
            valuator.total_value(&holdings),
            Err(FundError::StalePrice("WETH".to_string()))
        );
    }
}
