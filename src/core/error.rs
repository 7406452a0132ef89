//! Error taxonomy for fund operations.
//!
//! Every error aborts the whole operation: the fund aggregate applies an
//! operation to a scratch copy of its books and commits only on success, so
//! a caller never observes a partially applied purchase or redemption.

use crate::core::state::FundState;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FundError {
    #[error("operation not permitted while fund is {0}")]
    InvalidState(FundState),

    #[error("caller lacks the required role")]
    Unauthorized,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient share balance")]
    InsufficientBalance,

    #[error("insufficient share allowance")]
    InsufficientAllowance,

    #[error("division by zero in share price or fee computation")]
    DivisionByZero,

    #[error("crystallization period has not elapsed")]
    CrystallizationNotDue,

    #[error("pending expiration deadline has not passed")]
    LiquidationNotDue,

    #[error("insufficient reserve and pending redemption not accepted")]
    RedeemWithoutPendingPermission,

    #[error("no claimable pending redemption for this account")]
    NotClaimable,

    #[error("pending redemption already claimed")]
    AlreadyClaimed,

    #[error("non-denomination assets remain above the dust threshold")]
    DifferentAssetRemaining,

    #[error("execution would leave the reserve below the required ratio")]
    InsufficientReserve,

    #[error("stale or unavailable price for asset {0}")]
    StalePrice(String),
}
