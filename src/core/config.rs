//! Fund parameters, loadable from YAML.

use anyhow::{Context, Result, bail};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::debug;

fn default_crystallization_period_secs() -> i64 {
    30 * 24 * 3600
}

fn default_pending_expiration_secs() -> i64 {
    14 * 24 * 3600
}

fn default_reserve_execution_ratio() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_dust_threshold() -> Decimal {
    Decimal::new(1, 6) // 0.000001
}

fn default_collateral_tier() -> u8 {
    1
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FundConfig {
    /// The single reference asset fund value, purchases and redemptions are
    /// expressed in.
    pub denomination: String,
    /// Management fee as a fraction of net supply per elapsed second.
    #[serde(default)]
    pub management_fee_rate_per_second: Decimal,
    /// Performance fee as a fraction of wealth above the high-water mark.
    #[serde(default)]
    pub performance_fee_rate: Decimal,
    #[serde(default = "default_crystallization_period_secs")]
    pub crystallization_period_secs: i64,
    /// How long a pending round may stay unresolved before liquidation
    /// becomes permissionlessly callable.
    #[serde(default = "default_pending_expiration_secs")]
    pub pending_expiration_secs: i64,
    /// Floor fraction of total asset value that must remain in the
    /// denomination reserve after a strategy execution.
    #[serde(default = "default_reserve_execution_ratio")]
    pub reserve_execution_ratio: Decimal,
    /// Spread granted to purchasers who fund an open pending round.
    #[serde(default)]
    pub pending_penalty: Decimal,
    /// Foreign balances at or below this are ignored by the close check.
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: Decimal,
    #[serde(default = "default_collateral_tier")]
    pub collateral_tier: u8,
}

impl FundConfig {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read fund config: {}", path.as_ref().display()))?;
        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse fund config: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded fund config");
        Ok(config)
    }

    /// Zero-fee configuration, the starting point for most tests.
    pub fn zero_fee(denomination: impl Into<String>) -> Self {
        Self {
            denomination: denomination.into(),
            management_fee_rate_per_second: Decimal::ZERO,
            performance_fee_rate: Decimal::ZERO,
            crystallization_period_secs: default_crystallization_period_secs(),
            pending_expiration_secs: default_pending_expiration_secs(),
            reserve_execution_ratio: default_reserve_execution_ratio(),
            pending_penalty: Decimal::ZERO,
            dust_threshold: default_dust_threshold(),
            collateral_tier: default_collateral_tier(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.management_fee_rate_per_second < Decimal::ZERO {
            bail!("management fee rate must not be negative");
        }
        if self.performance_fee_rate < Decimal::ZERO || self.performance_fee_rate >= Decimal::ONE {
            bail!("performance fee rate must be within [0, 1)");
        }
        if self.pending_penalty < Decimal::ZERO || self.pending_penalty >= Decimal::ONE {
            bail!("pending penalty must be within [0, 1)");
        }
        if self.reserve_execution_ratio < Decimal::ZERO
            || self.reserve_execution_ratio > Decimal::ONE
        {
            bail!("reserve execution ratio must be within [0, 1]");
        }
        if self.crystallization_period_secs <= 0 {
            bail!("crystallization period must be positive");
        }
        if self.pending_expiration_secs <= 0 {
            bail!("pending expiration must be positive");
        }
        Ok(())
    }

    pub fn crystallization_period(&self) -> Duration {
        Duration::seconds(self.crystallization_period_secs)
    }

    pub fn pending_expiration(&self) -> Duration {
        Duration::seconds(self.pending_expiration_secs)
    }
}
