//! The fund aggregate: state machine, accounting orchestration, role gating.
//!
//! One `Fund` owns exclusive instances of the share ledger, fee accountant,
//! pending queue and asset holdings; collaborators (valuator, strategy
//! executor, collateral vault, clock) are injected as trait objects. Every
//! operation runs to completion serially: fee accrual is computed against the
//! asset value and share supply as they stood before the operation's own
//! effect, and collaborators only ever see immutable snapshots, so no
//! external call can re-enter and mutate fund state mid-operation.
//!
//! Operations are all-or-nothing. Each one is applied to a scratch copy of
//! the books and committed only on success, so an error never leaves a
//! partially applied purchase, redemption or transition behind.

use crate::core::clock::Clock;
use crate::core::collateral::CollateralVault;
use crate::core::config::FundConfig;
use crate::core::error::FundError;
use crate::core::executor::StrategyExecutor;
use crate::core::fees::{FeeAccountant, FeeSettlement};
use crate::core::ledger::ShareLedger;
use crate::core::pending::{PendingQueue, PendingRound};
use crate::core::state::FundState;
use crate::core::valuation::{AssetValuator, Holdings};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Mutable book state, cloned per operation for transactional semantics.
#[derive(Debug, Clone)]
struct Book {
    state: FundState,
    controller: String,
    ledger: ShareLedger,
    fees: FeeAccountant,
    queue: PendingQueue,
    holdings: Holdings,
    pending_deadline: Option<DateTime<Utc>>,
    collateral_posted: bool,
}

pub struct Fund {
    config: FundConfig,
    manager: String,
    book: Book,
    valuator: Box<dyn AssetValuator>,
    executor: Box<dyn StrategyExecutor>,
    vault: Box<dyn CollateralVault>,
    clock: Box<dyn Clock>,
}

impl Fund {
    pub fn new(
        config: FundConfig,
        manager: impl Into<String>,
        valuator: Box<dyn AssetValuator>,
        executor: Box<dyn StrategyExecutor>,
        vault: Box<dyn CollateralVault>,
        clock: Box<dyn Clock>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let manager = manager.into();
        let now = clock.now();
        let book = Book {
            state: FundState::Reviewing,
            controller: manager.clone(),
            ledger: ShareLedger::new(),
            fees: FeeAccountant::new(
                config.management_fee_rate_per_second,
                config.performance_fee_rate,
                config.crystallization_period(),
                now,
            ),
            queue: PendingQueue::new(),
            holdings: Holdings::new(config.denomination.clone()),
            pending_deadline: None,
            collateral_posted: false,
        };
        info!(%manager, denomination = %config.denomination, "fund created");
        Ok(Self {
            config,
            manager,
            book,
            valuator,
            executor,
            vault,
            clock,
        })
    }

    // ── read-only surface ──────────────────────────────────────────────

    pub fn state(&self) -> FundState {
        self.book.state
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }

    /// Manager until liquidation, then the liquidator.
    pub fn controller(&self) -> &str {
        &self.book.controller
    }

    pub fn share_balance(&self, account: &str) -> Decimal {
        self.book.ledger.balance_of(account)
    }

    pub fn gross_total_share(&self) -> Decimal {
        self.book.ledger.gross_total()
    }

    pub fn net_total_share(&self) -> Decimal {
        self.book.ledger.net_total()
    }

    pub fn outstanding_fee_shares(&self) -> Decimal {
        self.book.ledger.outstanding_fee_shares()
    }

    pub fn high_water_mark(&self) -> Decimal {
        self.book.fees.high_water_mark()
    }

    pub fn holdings(&self) -> &Holdings {
        &self.book.holdings
    }

    pub fn pending_rounds(&self) -> &[PendingRound] {
        self.book.queue.rounds()
    }

    /// Denomination value reserved for pending claims, held outside the
    /// valued holdings.
    pub fn pending_pool(&self) -> Decimal {
        self.book.queue.pool()
    }

    pub fn pending_expiration_deadline(&self) -> Option<DateTime<Utc>> {
        self.book.pending_deadline
    }

    /// Current unit share price per the configured valuator.
    pub fn share_price(&self) -> Result<Decimal, FundError> {
        let value = self.valuator.total_value(&self.book.holdings)?;
        self.book.ledger.share_price(value)
    }

    // ── share transfers (ledger passthrough, any non-terminal state) ───

    pub fn transfer_shares(
        &mut self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<(), FundError> {
        self.book.state.ensure(&[
            FundState::Executing,
            FundState::Pending,
            FundState::Liquidating,
        ])?;
        self.book.ledger.transfer(from, to, amount)
    }

    pub fn approve_shares(&mut self, owner: &str, spender: &str, amount: Decimal) {
        self.book.ledger.approve(owner, spender, amount);
    }

    pub fn transfer_shares_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<(), FundError> {
        self.book.state.ensure(&[
            FundState::Executing,
            FundState::Pending,
            FundState::Liquidating,
        ])?;
        self.book.ledger.transfer_from(spender, from, to, amount)
    }

    // ── lifecycle operations ───────────────────────────────────────────

    /// Move Reviewing → Executing. Posts the manager's collateral and starts
    /// the fee clock; no fee accrues for time spent in review.
    pub fn finalize(&mut self, caller: &str) -> Result<(), FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state.ensure(&[FundState::Reviewing])?;
        if caller != self.manager {
            return Err(FundError::Unauthorized);
        }
        book.fees = FeeAccountant::new(
            self.config.management_fee_rate_per_second,
            self.config.performance_fee_rate,
            self.config.crystallization_period(),
            now,
        );
        book.state = FundState::Executing;
        self.vault
            .post_collateral(&self.manager, self.config.collateral_tier)?;
        book.collateral_posted = true;
        info!(manager = %self.manager, "fund finalized");
        self.book = book;
        Ok(())
    }

    /// Deposit denomination asset, mint shares at the pre-deposit price.
    ///
    /// While Pending, part of the proceeds funds the open round and the
    /// purchaser is granted bonus shares as compensation for absorbing
    /// queued-redemption risk; the fund flips back to Executing once the
    /// round is fully covered.
    pub fn purchase(
        &mut self,
        buyer: &str,
        amount: Decimal,
    ) -> Result<(Decimal, FundState), FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        let shares = self.apply_purchase(&mut book, now, buyer, amount)?;
        self.book = book;
        Ok((shares, self.book.state))
    }

    fn apply_purchase(
        &self,
        book: &mut Book,
        now: DateTime<Utc>,
        buyer: &str,
        amount: Decimal,
    ) -> Result<Decimal, FundError> {
        book.state.ensure(&[FundState::Executing, FundState::Pending])?;
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        let value = self.valuator.total_value(&book.holdings)?;
        self.accrue_fees(book, now, value)?;
        // A purchase event resolves any deferred performance-fee settlement.
        book.ledger.settle_outstanding(&self.manager);

        let price = book.ledger.share_price(value)?;
        if price.is_zero() {
            // Shares outstanding against a collapsed valuation; minting at a
            // zero price would be unbounded.
            return Err(FundError::DivisionByZero);
        }
        let mut shares = amount / price;
        let mut to_reserve = amount;

        if book.state == FundState::Pending {
            let unfunded_shares = book
                .queue
                .open_round()
                .map(|r| r.unfunded_shares(price))
                .unwrap_or(Decimal::ZERO);
            let contribution = book.queue.fund(amount, price);
            to_reserve -= contribution;
            if contribution > Decimal::ZERO && self.config.pending_penalty > Decimal::ZERO {
                let penalty = self.config.pending_penalty;
                let bonus = (contribution / price * penalty / (Decimal::ONE - penalty))
                    .min(unfunded_shares);
                debug!(%bonus, %contribution, "pending purchase bonus");
                shares += bonus;
            }
            if !book.queue.has_unfunded() {
                book.state = FundState::Executing;
                book.pending_deadline = None;
                info!("pending round resolved by purchase, fund executing");
            }
        }

        book.holdings.deposit_reserve(to_reserve);
        book.ledger.mint(buyer, shares)?;
        debug!(%buyer, %amount, %shares, state = %book.state, "purchase");
        Ok(shares)
    }

    /// Burn shares against the reserve. Pays immediately for the part the
    /// reserve covers; the remainder needs `accept_pending` and joins the
    /// open round, arming the pending expiration deadline.
    pub fn redeem(
        &mut self,
        user: &str,
        share_amount: Decimal,
        accept_pending: bool,
    ) -> Result<(Decimal, FundState), FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        let paid = self.apply_redeem(&mut book, now, user, share_amount, accept_pending)?;
        self.book = book;
        Ok((paid, self.book.state))
    }

    fn apply_redeem(
        &self,
        book: &mut Book,
        now: DateTime<Utc>,
        user: &str,
        share_amount: Decimal,
        accept_pending: bool,
    ) -> Result<Decimal, FundError> {
        book.state.ensure(&[FundState::Executing, FundState::Pending])?;
        if share_amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        if book.ledger.balance_of(user) < share_amount {
            return Err(FundError::InsufficientBalance);
        }
        let value = self.valuator.total_value(&book.holdings)?;
        self.accrue_fees(book, now, value)?;

        let price = book.ledger.share_price(value)?;
        let gross_value = share_amount * price;
        let reserve = book.holdings.reserve();

        if reserve >= gross_value {
            book.ledger.burn(user, share_amount)?;
            book.holdings.withdraw_reserve(gross_value)?;
            debug!(%user, %share_amount, paid = %gross_value, "redeemed in full");
            return Ok(gross_value);
        }

        if !accept_pending {
            return Err(FundError::RedeemWithoutPendingPermission);
        }

        // Shortfall: pay what the reserve covers, queue the rest. All the
        // surrendered shares are burned now; the queued part realizes value
        // only as the round gets funded.
        let immediate_shares = reserve / price;
        let pending_shares = share_amount - immediate_shares;
        book.ledger.burn(user, share_amount)?;
        if reserve > Decimal::ZERO {
            book.holdings.withdraw_reserve(reserve)?;
        }
        book.queue.open_or_join(now, user, pending_shares)?;
        if book.state == FundState::Executing {
            book.state = FundState::Pending;
            book.pending_deadline = Some(now + self.config.pending_expiration());
            warn!(%user, queued = %pending_shares, "reserve shortfall, fund pending");
        }
        debug!(%user, %share_amount, paid = %reserve, queued = %pending_shares, "partial redemption");
        Ok(reserve)
    }

    /// Settle every funded, unclaimed pending entry of `user`. Valid in any
    /// state including Closed.
    pub fn claim_pending_redemption(&mut self, user: &str) -> Result<Decimal, FundError> {
        let mut book = self.book.clone();
        let paid = book.queue.claim(user)?;
        self.book = book;
        info!(%user, %paid, "pending redemption claimed");
        Ok(paid)
    }

    /// Explicit performance-fee crystallization. Manager-only; fails with
    /// `CrystallizationNotDue` until the crystallization period has elapsed.
    pub fn crystallize(&mut self, caller: &str) -> Result<Decimal, FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state.ensure(&[FundState::Executing, FundState::Pending])?;
        if caller != self.manager {
            return Err(FundError::Unauthorized);
        }
        let value = self.valuator.total_value(&book.holdings)?;
        book.fees
            .accrue_management(now, &mut book.ledger, &self.manager)?;
        let settlement = self.settlement_for(book.state);
        let shares = book
            .fees
            .crystallize(now, &mut book.ledger, value, settlement, &self.manager)?;
        self.book = book;
        Ok(shares)
    }

    /// Force a management-fee accrual. Manager-only; the accrual clock also
    /// resets on every implicit accrual, so this only claims the residual.
    pub fn claim_management_fee(&mut self, caller: &str) -> Result<Decimal, FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state.ensure(&[FundState::Executing, FundState::Pending])?;
        if caller != self.manager {
            return Err(FundError::Unauthorized);
        }
        let shares = book
            .fees
            .accrue_management(now, &mut book.ledger, &self.manager)?;
        self.book = book;
        Ok(shares)
    }

    /// Run a strategy reallocation. Controller-only: the manager while
    /// Executing or Pending (raising reserve for a queued round), the
    /// liquidator while Liquidating (unwinding back to the denomination
    /// asset). The result must be valuable, and in Executing the reserve
    /// must keep the configured floor ratio of total value.
    pub fn execute(&mut self, caller: &str, payload: &serde_json::Value) -> Result<(), FundError> {
        let mut book = self.book.clone();
        book.state.ensure(&[
            FundState::Executing,
            FundState::Pending,
            FundState::Liquidating,
        ])?;
        if caller != book.controller {
            return Err(FundError::Unauthorized);
        }
        let new_holdings = self.executor.execute(&book.holdings, payload)?;
        let value = self.valuator.total_value(&new_holdings)?;
        if book.state == FundState::Executing
            && new_holdings.reserve() < self.config.reserve_execution_ratio * value
        {
            return Err(FundError::InsufficientReserve);
        }
        debug!(%value, reserve = %new_holdings.reserve(), "strategy executed");
        book.holdings = new_holdings;
        self.book = book;
        Ok(())
    }

    /// Move free reserve into the open pending round. Pending flips back to
    /// Executing once the round is fully covered; while Liquidating this is
    /// how the liquidator resolves queued redemptions before closing.
    pub fn resume(&mut self, caller: &str) -> Result<FundState, FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state
            .ensure(&[FundState::Pending, FundState::Liquidating])?;
        if caller != book.controller {
            return Err(FundError::Unauthorized);
        }
        let value = self.valuator.total_value(&book.holdings)?;
        self.accrue_fees(&mut book, now, value)?;
        let price = book.ledger.share_price(value)?;
        let taken = book.queue.fund(book.holdings.reserve(), price);
        if taken > Decimal::ZERO {
            book.holdings.withdraw_reserve(taken)?;
        }
        if !book.queue.has_unfunded() && book.state == FundState::Pending {
            book.state = FundState::Executing;
            book.pending_deadline = None;
            info!(funded = %taken, "pending round resolved, fund executing");
        }
        let state = book.state;
        self.book = book;
        Ok(state)
    }

    /// Force-unwind an expired fund. Permissionless by design: once the
    /// pending expiration deadline has passed anyone may call this, so the
    /// fund cannot be stuck forever behind an unresponsive manager. The
    /// caller becomes the liquidator and takes control; the manager's
    /// collateral leaves at this ownership transfer.
    pub fn liquidate(&mut self, caller: &str) -> Result<(), FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state.ensure(&[FundState::Pending])?;
        let deadline = book.pending_deadline.ok_or(FundError::LiquidationNotDue)?;
        if now <= deadline {
            return Err(FundError::LiquidationNotDue);
        }
        book.fees
            .accrue_management(now, &mut book.ledger, &self.manager)?;
        // Performance crystallization is best-effort here: liquidation is a
        // liveness valve and must not be blocked by a stale or collapsed
        // valuation.
        if let Ok(value) = self.valuator.total_value(&book.holdings) {
            let _ = book.fees.crystallize_if_due(
                now,
                &mut book.ledger,
                value,
                FeeSettlement::Deferred,
                &self.manager,
            );
        }
        book.state = FundState::Liquidating;
        book.controller = caller.to_string();
        if book.collateral_posted {
            self.vault.return_collateral(&self.manager)?;
            book.collateral_posted = false;
        }
        warn!(liquidator = %caller, "fund liquidating");
        self.book = book;
        Ok(())
    }

    /// Terminal transition. Controller-only, from Executing (clean close) or
    /// Liquidating. Requires every non-denomination balance at or below the
    /// dust threshold and no unfunded pending round. Afterwards only reads
    /// and pending claims remain valid.
    pub fn close(&mut self, caller: &str) -> Result<(), FundError> {
        let now = self.clock.now();
        let mut book = self.book.clone();
        book.state
            .ensure(&[FundState::Executing, FundState::Liquidating])?;
        if caller != book.controller {
            return Err(FundError::Unauthorized);
        }
        if book.holdings.max_foreign_balance() > self.config.dust_threshold {
            return Err(FundError::DifferentAssetRemaining);
        }
        if book.queue.has_unfunded() {
            return Err(FundError::InvalidState(book.state));
        }
        let value = self.valuator.total_value(&book.holdings)?;
        book.fees
            .accrue_management(now, &mut book.ledger, &self.manager)?;
        book.fees.crystallize_if_due(
            now,
            &mut book.ledger,
            value,
            FeeSettlement::Direct,
            &self.manager,
        )?;
        if book.collateral_posted {
            self.vault.return_collateral(&self.manager)?;
            book.collateral_posted = false;
        }
        book.state = FundState::Closed;
        info!("fund closed");
        self.book = book;
        Ok(())
    }

    /// Credit assets that arrived without a purchase (donations, airdrops).
    /// No shares are minted; existing holders absorb the gain.
    pub fn donate(&mut self, asset: &str, amount: Decimal) -> Result<(), FundError> {
        if amount <= Decimal::ZERO {
            return Err(FundError::InvalidAmount);
        }
        if self.book.state.is_terminal() {
            return Err(FundError::InvalidState(self.book.state));
        }
        let current = self.book.holdings.asset_balance(asset);
        self.book.holdings.set_asset(asset, current + amount);
        debug!(%asset, %amount, "donation credited");
        Ok(())
    }

    // ── internals ──────────────────────────────────────────────────────

    fn settlement_for(&self, state: FundState) -> FeeSettlement {
        if state == FundState::Pending {
            FeeSettlement::Deferred
        } else {
            FeeSettlement::Direct
        }
    }

    /// Pre-operation fee pass: management accrual first (pure dilution, value
    /// unchanged), then performance crystallization if due, both against the
    /// pre-operation asset value.
    fn accrue_fees(
        &self,
        book: &mut Book,
        now: DateTime<Utc>,
        value: Decimal,
    ) -> Result<(), FundError> {
        book.fees
            .accrue_management(now, &mut book.ledger, &self.manager)?;
        let settlement = self.settlement_for(book.state);
        book.fees
            .crystallize_if_due(now, &mut book.ledger, value, settlement, &self.manager)?;
        Ok(())
    }
}
