//! Core accounting abstractions

pub mod clock;
pub mod collateral;
pub mod config;
pub mod error;
pub mod executor;
pub mod fees;
pub mod ledger;
pub mod pending;
pub mod state;
pub mod valuation;

// Re-export main types for cleaner imports
pub use clock::{Clock, SystemClock};
pub use collateral::{CollateralVault, MemoryVault};
pub use config::FundConfig;
pub use error::FundError;
pub use executor::StrategyExecutor;
pub use fees::{FeeAccountant, FeeSettlement};
pub use ledger::{AccountId, ShareLedger};
pub use pending::{PendingQueue, PendingRound};
pub use state::FundState;
pub use valuation::{AssetValuator, Holdings, PriceTableValuator};
