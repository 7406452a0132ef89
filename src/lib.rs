pub mod core;
pub mod fund;
pub mod log;

pub use crate::core::{
    AssetValuator, Clock, CollateralVault, FeeSettlement, FundConfig, FundError, FundState,
    Holdings, MemoryVault, PriceTableValuator, StrategyExecutor, SystemClock,
};
pub use crate::fund::Fund;
