//! Queued redemption rounds and pro-rata claim settlement.
//!
//! At most one round is open (unfunded) at a time. Redemptions that cannot be
//! covered from reserve join the open round; purchase proceeds and `resume`
//! move denomination value into it. Once the round's value covers its pending
//! shares at the current price it is sealed: its `total_redemption_value` is
//! fixed and each entry claims `value * pending_share / total_pending_share`
//! exactly once, in any later fund state including Closed.

use crate::core::error::FundError;
use crate::core::ledger::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct PendingEntry {
    pending_share: Decimal,
    claimed: bool,
}

#[derive(Debug, Clone)]
pub struct PendingRound {
    round_id: u64,
    total_pending_share: Decimal,
    total_redemption_value: Decimal,
    remaining_value: Decimal,
    funded: bool,
    opened_at: DateTime<Utc>,
    entries: HashMap<AccountId, PendingEntry>,
}

impl PendingRound {
    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn total_pending_share(&self) -> Decimal {
        self.total_pending_share
    }

    /// Denomination value reserved for this round so far. Fixed once funded.
    pub fn total_redemption_value(&self) -> Decimal {
        self.total_redemption_value
    }

    pub fn is_funded(&self) -> bool {
        self.funded
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn pending_share_of(&self, user: &str) -> Decimal {
        self.entries
            .get(user)
            .filter(|e| !e.claimed)
            .map(|e| e.pending_share)
            .unwrap_or(Decimal::ZERO)
    }

    /// Shares not yet backed by redemption value at the given price.
    pub fn unfunded_shares(&self, price: Decimal) -> Decimal {
        if price.is_zero() {
            return Decimal::ZERO;
        }
        let deficit = self.total_pending_share * price - self.total_redemption_value;
        if deficit > Decimal::ZERO {
            deficit / price
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    rounds: Vec<PendingRound>,
    next_round_id: u64,
    /// Denomination value held for claims across all funded rounds.
    pool: Decimal,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(&self) -> &[PendingRound] {
        &self.rounds
    }

    pub fn pool(&self) -> Decimal {
        self.pool
    }

    pub fn open_round(&self) -> Option<&PendingRound> {
        self.rounds.last().filter(|r| !r.funded)
    }

    pub fn has_unfunded(&self) -> bool {
        self.open_round().is_some()
    }

    /// Surrender shares into the open round, creating one if necessary.
    /// Returns the round id joined.
    pub fn open_or_join(
        &mut self,
        now: DateTime<Utc>,
        user: &str,
        shares: Decimal,
    ) -> Result<u64, FundError> {
        if shares <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        if self.open_round().is_none() {
            self.next_round_id += 1;
            self.rounds.push(PendingRound {
                round_id: self.next_round_id,
                total_pending_share: Decimal::ZERO,
                total_redemption_value: Decimal::ZERO,
                remaining_value: Decimal::ZERO,
                funded: false,
                opened_at: now,
                entries: HashMap::new(),
            });
            debug!(round = self.next_round_id, "opened pending round");
        }
        let round = self.rounds.last_mut().unwrap();
        let entry = round
            .entries
            .entry(user.to_string())
            .or_insert(PendingEntry {
                pending_share: Decimal::ZERO,
                claimed: false,
            });
        // Re-joining after a claim within the same round reuses the entry.
        entry.claimed = false;
        entry.pending_share += shares;
        round.total_pending_share += shares;
        debug!(round = round.round_id, %user, %shares, "joined pending round");
        Ok(round.round_id)
    }

    /// Deficit of the open round at the given price, zero when none is open.
    pub fn deficit(&self, price: Decimal) -> Decimal {
        self.open_round()
            .map(|r| {
                let d = r.total_pending_share * price - r.total_redemption_value;
                if d > Decimal::ZERO { d } else { Decimal::ZERO }
            })
            .unwrap_or(Decimal::ZERO)
    }

    /// Move up to `available` denomination value into the open round. Seals
    /// the round once it fully covers its pending shares at `price`. Returns
    /// the amount actually taken.
    pub fn fund(&mut self, available: Decimal, price: Decimal) -> Decimal {
        let deficit = self.deficit(price);
        let Some(round) = self.rounds.last_mut().filter(|r| !r.funded) else {
            return Decimal::ZERO;
        };
        let contribution = available.min(deficit);
        if contribution > Decimal::ZERO {
            round.total_redemption_value += contribution;
            round.remaining_value += contribution;
            self.pool += contribution;
        }
        if round.total_redemption_value >= round.total_pending_share * price {
            round.funded = true;
            debug!(
                round = round.round_id,
                value = %round.total_redemption_value,
                "pending round fully funded"
            );
        }
        contribution
    }

    /// Settle every funded, unclaimed entry held by `user` pro-rata.
    pub fn claim(&mut self, user: &str) -> Result<Decimal, FundError> {
        let mut payout = Decimal::ZERO;
        let mut has_entry = false;
        for round in &mut self.rounds {
            let Some(entry) = round.entries.get_mut(user) else {
                continue;
            };
            has_entry = true;
            if entry.claimed || !round.funded {
                continue;
            }
            let amount = (round.total_redemption_value * entry.pending_share
                / round.total_pending_share)
                .min(round.remaining_value);
            entry.claimed = true;
            round.remaining_value -= amount;
            payout += amount;
            debug!(round = round.round_id, %user, %amount, "claimed pending redemption");
        }
        if payout > Decimal::ZERO {
            self.pool -= payout;
            return Ok(payout);
        }
        if has_entry {
            // Entries exist but are either already claimed or not yet funded.
            if self
                .rounds
                .iter()
                .any(|r| r.entries.get(user).is_some_and(|e| e.claimed))
            {
                Err(FundError::AlreadyClaimed)
            } else {
                Err(FundError::NotClaimable)
            }
        } else {
            Err(FundError::NotClaimable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn redemptions_join_the_same_open_round() {
        let mut queue = PendingQueue::new();
        let r1 = queue.open_or_join(t0(), "alice", dec!(100)).unwrap();
        let r2 = queue.open_or_join(t0(), "bob", dec!(50)).unwrap();
        assert_eq!(r1, r2);
        let round = queue.open_round().unwrap();
        assert_eq!(round.total_pending_share(), dec!(150));
        assert_eq!(round.pending_share_of("alice"), dec!(100));
    }

    #[test]
    fn funding_seals_the_round_at_price() {
        let mut queue = PendingQueue::new();
        queue.open_or_join(t0(), "alice", dec!(100)).unwrap();

        // Price 2: the round needs 200 of denomination value.
        let taken = queue.fund(dec!(120), dec!(2));
        assert_eq!(taken, dec!(120));
        assert!(queue.has_unfunded());
        assert_eq!(queue.deficit(dec!(2)), dec!(80));
        assert_eq!(
            queue.open_round().unwrap().unfunded_shares(dec!(2)),
            dec!(40)
        );

        let taken = queue.fund(dec!(500), dec!(2));
        assert_eq!(taken, dec!(80));
        assert!(!queue.has_unfunded());
        assert_eq!(queue.pool(), dec!(200));
    }

    #[test]
    fn claims_are_pro_rata_and_single_shot() {
        let mut queue = PendingQueue::new();
        queue.open_or_join(t0(), "alice", dec!(75)).unwrap();
        queue.open_or_join(t0(), "bob", dec!(25)).unwrap();
        queue.fund(dec!(100), Decimal::ONE);

        assert_eq!(queue.claim("alice").unwrap(), dec!(75));
        assert_eq!(queue.claim("alice"), Err(FundError::AlreadyClaimed));
        assert_eq!(queue.claim("bob").unwrap(), dec!(25));
        assert_eq!(queue.pool(), Decimal::ZERO);
    }

    #[test]
    fn unfunded_round_is_not_claimable() {
        let mut queue = PendingQueue::new();
        queue.open_or_join(t0(), "alice", dec!(10)).unwrap();
        assert_eq!(queue.claim("alice"), Err(FundError::NotClaimable));
        assert_eq!(queue.claim("stranger"), Err(FundError::NotClaimable));
    }

    #[test]
    fn entries_span_multiple_rounds() {
        let mut queue = PendingQueue::new();
        queue.open_or_join(t0(), "alice", dec!(10)).unwrap();
        queue.fund(dec!(10), Decimal::ONE);
        // First round sealed; the next shortfall opens a new one.
        let second = queue.open_or_join(t0(), "alice", dec!(4)).unwrap();
        assert_eq!(queue.rounds().len(), 2);
        assert_eq!(queue.rounds()[1].round_id(), second);

        // Only the funded round pays out.
        assert_eq!(queue.claim("alice").unwrap(), dec!(10));
        queue.fund(dec!(4), Decimal::ONE);
        assert_eq!(queue.claim("alice").unwrap(), dec!(4));
    }

    #[test]
    fn price_drop_can_seal_without_new_value() {
        let mut queue = PendingQueue::new();
        queue.open_or_join(t0(), "alice", dec!(100)).unwrap();
        queue.fund(dec!(60), Decimal::ONE);
        assert!(queue.has_unfunded());
        // Price halves: 60 now covers 100 shares at 0.5.
        let taken = queue.fund(Decimal::ZERO, dec!(0.5));
        assert_eq!(taken, Decimal::ZERO);
        assert!(!queue.has_unfunded());
    }
}
