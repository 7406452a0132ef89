//! Management-fee accrual and high-water-mark performance crystallization.
//!
//! Both accruals run against the asset value and share supply as they stood
//! immediately before the operation that triggered them; the fund aggregate
//! guarantees that ordering. Management fee is a pure time dilution of the
//! net supply. Performance fee is charged only on wealth above the high-water
//! mark, which ratchets upward and never down, and is converted to shares
//! with `fee * gross / (value - fee)` so the post-mint share price stays
//! exact for remaining holders.

use crate::core::error::FundError;
use crate::core::ledger::ShareLedger;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// Where crystallized performance-fee shares land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSettlement {
    /// Mint straight to the manager (fund is Executing).
    Direct,
    /// Park in the outstanding sub-account; vests at the next purchase
    /// (fund is Pending, settlement deferred).
    Deferred,
}

#[derive(Debug, Clone)]
pub struct FeeAccountant {
    management_rate_per_second: Decimal,
    performance_rate: Decimal,
    crystallization_period: Duration,
    last_fee_claim: DateTime<Utc>,
    last_crystallized: DateTime<Utc>,
    high_water_mark: Decimal,
}

impl FeeAccountant {
    pub fn new(
        management_rate_per_second: Decimal,
        performance_rate: Decimal,
        crystallization_period: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            management_rate_per_second,
            performance_rate,
            crystallization_period,
            last_fee_claim: started_at,
            last_crystallized: started_at,
            high_water_mark: Decimal::ZERO,
        }
    }

    pub fn high_water_mark(&self) -> Decimal {
        self.high_water_mark
    }

    pub fn last_fee_claim(&self) -> DateTime<Utc> {
        self.last_fee_claim
    }

    /// Accrue the management fee for the time elapsed since the last accrual
    /// and mint the dilution shares to the manager. The accrual clock resets
    /// on every call, not only on explicit claims. Returns the shares minted.
    pub fn accrue_management(
        &mut self,
        now: DateTime<Utc>,
        ledger: &mut ShareLedger,
        manager: &str,
    ) -> Result<Decimal, FundError> {
        let elapsed = (now - self.last_fee_claim).num_seconds();
        self.last_fee_claim = now;
        if elapsed <= 0 {
            return Ok(Decimal::ZERO);
        }
        let shares =
            ledger.net_total() * self.management_rate_per_second * Decimal::from(elapsed);
        if shares > Decimal::ZERO {
            ledger.mint(manager, shares)?;
            debug!(%shares, elapsed, "accrued management fee");
        }
        Ok(shares)
    }

    /// Crystallize the performance fee. Fails with `CrystallizationNotDue`
    /// when the crystallization period has not elapsed; implicit
    /// pre-operation accrual should use [`FeeAccountant::crystallize_if_due`]
    /// instead. Returns the fee shares minted.
    pub fn crystallize(
        &mut self,
        now: DateTime<Utc>,
        ledger: &mut ShareLedger,
        total_asset_value: Decimal,
        settlement: FeeSettlement,
        manager: &str,
    ) -> Result<Decimal, FundError> {
        if now - self.last_crystallized < self.crystallization_period {
            return Err(FundError::CrystallizationNotDue);
        }
        self.crystallize_unchecked(now, ledger, total_asset_value, settlement, manager)
    }

    /// Crystallize if the period has elapsed, otherwise do nothing. Used on
    /// every purchase/redeem/liquidate/close ahead of the operation's own
    /// mint or burn.
    pub fn crystallize_if_due(
        &mut self,
        now: DateTime<Utc>,
        ledger: &mut ShareLedger,
        total_asset_value: Decimal,
        settlement: FeeSettlement,
        manager: &str,
    ) -> Result<Decimal, FundError> {
        if now - self.last_crystallized < self.crystallization_period {
            return Ok(Decimal::ZERO);
        }
        self.crystallize_unchecked(now, ledger, total_asset_value, settlement, manager)
    }

    fn crystallize_unchecked(
        &mut self,
        now: DateTime<Utc>,
        ledger: &mut ShareLedger,
        total_asset_value: Decimal,
        settlement: FeeSettlement,
        manager: &str,
    ) -> Result<Decimal, FundError> {
        if ledger.gross_total().is_zero() {
            // Empty fund, nothing to charge against.
            self.last_crystallized = now;
            return Ok(Decimal::ZERO);
        }
        if total_asset_value.is_zero() {
            // Shares outstanding against a zero valuation is a degenerate
            // collapse; fail loudly instead of inventing a zero-fee outcome.
            return Err(FundError::DivisionByZero);
        }

        // The reference unit price is 1, so wealth is value above net supply.
        let wealth = total_asset_value - ledger.net_total();
        if wealth <= self.high_water_mark {
            self.last_crystallized = now;
            return Ok(Decimal::ZERO);
        }

        let fee = self.performance_rate * (wealth - self.high_water_mark);
        let mut shares = Decimal::ZERO;
        if fee > Decimal::ZERO {
            let remainder = total_asset_value - fee;
            if remainder <= Decimal::ZERO {
                return Err(FundError::DivisionByZero);
            }
            shares = fee * ledger.gross_total() / remainder;
            match settlement {
                FeeSettlement::Direct => ledger.mint(manager, shares)?,
                FeeSettlement::Deferred => ledger.mint_outstanding(shares)?,
            }
            debug!(%fee, %shares, ?settlement, "crystallized performance fee");
        }
        self.high_water_mark = wealth;
        self.last_crystallized = now;
        Ok(shares)
    }
}
