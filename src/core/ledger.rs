//! Share mint/burn/transfer accounting.
//!
//! The ledger tracks two supply totals. `gross_total` counts every share the
//! fund has ever considered outstanding, including performance-fee shares
//! parked in the outstanding sub-account before they vest to the manager.
//! `net_total` counts only liquid, circulating shares. Share price is always
//! derived from `gross_total`, never stored, to avoid staleness.

use crate::core::error::FundError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

pub type AccountId = String;

#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    balances: HashMap<AccountId, Decimal>,
    allowances: HashMap<(AccountId, AccountId), Decimal>,
    outstanding_fee_shares: Decimal,
    gross_total: Decimal,
    net_total: Decimal,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &str) -> Decimal {
        self.balances.get(account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> Decimal {
        self.allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn gross_total(&self) -> Decimal {
        self.gross_total
    }

    pub fn net_total(&self) -> Decimal {
        self.net_total
    }

    /// Performance-fee shares minted but not yet vested to the manager.
    pub fn outstanding_fee_shares(&self) -> Decimal {
        self.outstanding_fee_shares
    }

    /// Mint circulating shares to a beneficiary.
    pub fn mint(&mut self, beneficiary: &str, amount: Decimal) -> Result<(), FundError> {
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        *self
            .balances
            .entry(beneficiary.to_string())
            .or_insert(Decimal::ZERO) += amount;
        self.gross_total += amount;
        self.net_total += amount;
        debug!(%beneficiary, %amount, gross = %self.gross_total, "minted shares");
        Ok(())
    }

    /// Burn shares from a holder.
    pub fn burn(&mut self, holder: &str, amount: Decimal) -> Result<(), FundError> {
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        let balance = self.balance_of(holder);
        if balance < amount {
            return Err(FundError::InsufficientBalance);
        }
        self.balances.insert(holder.to_string(), balance - amount);
        self.gross_total -= amount;
        self.net_total -= amount;
        debug!(%holder, %amount, gross = %self.gross_total, "burned shares");
        Ok(())
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: Decimal) -> Result<(), FundError> {
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(FundError::InsufficientBalance);
        }
        self.balances.insert(from.to_string(), balance - amount);
        *self
            .balances
            .entry(to.to_string())
            .or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    pub fn approve(&mut self, owner: &str, spender: &str, amount: Decimal) {
        self.allowances
            .insert((owner.to_string(), spender.to_string()), amount);
    }

    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<(), FundError> {
        let key = (from.to_string(), spender.to_string());
        let allowed = self.allowances.get(&key).copied().unwrap_or(Decimal::ZERO);
        if allowed < amount {
            return Err(FundError::InsufficientAllowance);
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert(key, allowed - amount);
        Ok(())
    }

    /// Mint deferred performance-fee shares into the outstanding sub-account.
    /// These count toward `gross_total` only; they vest at the next purchase.
    pub fn mint_outstanding(&mut self, amount: Decimal) -> Result<(), FundError> {
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        self.outstanding_fee_shares += amount;
        self.gross_total += amount;
        debug!(%amount, outstanding = %self.outstanding_fee_shares, "deferred fee shares");
        Ok(())
    }

    /// Move the whole outstanding balance to the manager, vesting it into the
    /// net supply. Returns the amount moved, zero when nothing was parked.
    pub fn settle_outstanding(&mut self, manager: &str) -> Decimal {
        let amount = self.outstanding_fee_shares;
        if amount.is_zero() {
            return Decimal::ZERO;
        }
        self.outstanding_fee_shares = Decimal::ZERO;
        *self
            .balances
            .entry(manager.to_string())
            .or_insert(Decimal::ZERO) += amount;
        self.net_total += amount;
        debug!(%manager, %amount, "settled outstanding fee shares");
        amount
    }

    /// Unit share price given the current total asset value.
    ///
    /// With no shares and no assets the price is defined as 1, used only at
    /// the first purchase. No shares while assets remain is a degenerate
    /// collapse and fails rather than guessing.
    pub fn share_price(&self, total_asset_value: Decimal) -> Result<Decimal, FundError> {
        if self.gross_total.is_zero() {
            if total_asset_value.is_zero() {
                return Ok(Decimal::ONE);
            }
            return Err(FundError::DivisionByZero);
        }
        Ok(total_asset_value / self.gross_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mint_updates_both_totals() {
        let mut ledger = ShareLedger::new();
        ledger.mint("alice", dec!(100)).unwrap();
        assert_eq!(ledger.balance_of("alice"), dec!(100));
        assert_eq!(ledger.gross_total(), dec!(100));
        assert_eq!(ledger.net_total(), dec!(100));
    }

    #[test]
    fn mint_rejects_non_positive_amounts() {
        let mut ledger = ShareLedger::new();
        assert_eq!(
            ledger.mint("alice", Decimal::ZERO),
            Err(FundError::InvalidAmount)
        );
        assert_eq!(
            ledger.mint("alice", dec!(-5)),
            Err(FundError::InvalidAmount)
        );
    }

    #[test]
    fn burn_requires_balance() {
        let mut ledger = ShareLedger::new();
        ledger.mint("alice", dec!(10)).unwrap();
        assert_eq!(
            ledger.burn("alice", dec!(11)),
            Err(FundError::InsufficientBalance)
        );
        ledger.burn("alice", dec!(10)).unwrap();
        assert_eq!(ledger.gross_total(), Decimal::ZERO);
        assert_eq!(ledger.net_total(), Decimal::ZERO);
    }

    #[test]
    fn transfer_from_respects_allowance() {
        let mut ledger = ShareLedger::new();
        ledger.mint("alice", dec!(50)).unwrap();
        ledger.approve("alice", "bob", dec!(20));
        assert_eq!(
            ledger.transfer_from("bob", "alice", "carol", dec!(30)),
            Err(FundError::InsufficientAllowance)
        );
        ledger.transfer_from("bob", "alice", "carol", dec!(20)).unwrap();
        assert_eq!(ledger.balance_of("carol"), dec!(20));
        assert_eq!(ledger.allowance("alice", "bob"), Decimal::ZERO);
        // Transfers move balances without touching supply totals.
        assert_eq!(ledger.gross_total(), dec!(50));
        assert_eq!(ledger.net_total(), dec!(50));
    }

    #[test]
    fn outstanding_shares_count_gross_only_until_settled() {
        let mut ledger = ShareLedger::new();
        ledger.mint("alice", dec!(100)).unwrap();
        ledger.mint_outstanding(dec!(5)).unwrap();
        assert_eq!(ledger.gross_total(), dec!(105));
        assert_eq!(ledger.net_total(), dec!(100));
        assert_eq!(ledger.outstanding_fee_shares(), dec!(5));

        let settled = ledger.settle_outstanding("manager");
        assert_eq!(settled, dec!(5));
        assert_eq!(ledger.balance_of("manager"), dec!(5));
        assert_eq!(ledger.net_total(), dec!(105));
        assert_eq!(ledger.outstanding_fee_shares(), Decimal::ZERO);
        // Idempotent when nothing is parked.
        assert_eq!(ledger.settle_outstanding("manager"), Decimal::ZERO);
    }

    #[test]
    fn share_price_is_derived() {
        let mut ledger = ShareLedger::new();
        assert_eq!(ledger.share_price(Decimal::ZERO).unwrap(), Decimal::ONE);
        assert_eq!(
            ledger.share_price(dec!(10)),
            Err(FundError::DivisionByZero)
        );
        ledger.mint("alice", dec!(200)).unwrap();
        assert_eq!(ledger.share_price(dec!(300)).unwrap(), dec!(1.5));
    }
}
