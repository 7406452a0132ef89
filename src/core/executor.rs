//! Strategy execution boundary.

use crate::core::error::FundError;
use crate::core::valuation::Holdings;

/// Performs a permitted asset reallocation described by an opaque payload and
/// returns the resulting holdings. The engine does not interpret the payload;
/// it only re-checks its own invariants afterwards: the result must be
/// valuable by the configured valuator, and in Executing the denomination
/// reserve must stay at or above the configured execution ratio.
///
/// The executor receives an immutable snapshot, so it cannot re-enter and
/// mutate ledger or queue state mid-operation.
pub trait StrategyExecutor: Send + Sync {
    fn execute(
        &self,
        holdings: &Holdings,
        payload: &serde_json::Value,
    ) -> Result<Holdings, FundError>;
}
