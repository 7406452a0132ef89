//! Fund lifecycle states and the transition gate.

use crate::core::error::FundError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Lifecycle of a fund: `Reviewing → Executing ⇄ Pending → Liquidating → Closed`.
///
/// Every mutating operation declares the states it is legal in and calls
/// [`FundState::ensure`] before touching any book state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundState {
    /// Post-creation, pre-finalize. The manager has not yet posted collateral.
    Reviewing,
    /// Normal operation: purchases, redemptions and strategy execution.
    Executing,
    /// At least one redemption round is queued and not yet fully funded.
    Pending,
    /// Control has moved to the liquidator, who unwinds remaining assets.
    Liquidating,
    /// Terminal. Only read-only queries and pending-claim settlement remain.
    Closed,
}

impl Display for FundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FundState::Reviewing => "reviewing",
                FundState::Executing => "executing",
                FundState::Pending => "pending",
                FundState::Liquidating => "liquidating",
                FundState::Closed => "closed",
            }
        )
    }
}

impl FundState {
    /// Gate an operation to a set of valid states.
    pub fn ensure(self, valid: &[FundState]) -> Result<(), FundError> {
        if valid.contains(&self) {
            Ok(())
        } else {
            Err(FundError::InvalidState(self))
        }
    }

    /// True once the fund has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, FundState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_accepts_listed_states() {
        assert!(
            FundState::Executing
                .ensure(&[FundState::Executing, FundState::Pending])
                .is_ok()
        );
    }

    #[test]
    fn ensure_rejects_with_current_state() {
        let err = FundState::Reviewing
            .ensure(&[FundState::Executing])
            .unwrap_err();
        match err {
            FundError::InvalidState(state) => assert_eq!(state, FundState::Reviewing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(FundState::Liquidating.to_string(), "liquidating");
        assert!(FundState::Closed.is_terminal());
        assert!(!FundState::Pending.is_terminal());
    }
}
