//! Ledger configuration
//!
//! Defaults come from the environment (after loading `.env`), mirroring how
//! the host reads its database settings. A YAML document can be used instead
//! when the host keeps its settings in a config file.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::error::LedgerError;
use crate::numeric::{self, MoneyRounding, MONEY_SCALE, PERCENT_CEILING};

pub const ENV_ALLOCATION_CEILING: &str = "PRODUCTIVITY_ALLOCATION_CEILING";
pub const ENV_MONEY_SCALE: &str = "PRODUCTIVITY_MONEY_SCALE";
pub const ENV_ROUNDING: &str = "PRODUCTIVITY_ROUNDING";

/// Numeric policy shared by the validator, the recompute engine and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum cumulative execution percentage per invoice
    pub allocation_ceiling: Decimal,
    /// Decimal places for commission amounts
    pub money_scale: u32,
    /// Midpoint rule for commission amounts
    pub rounding: MoneyRounding,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allocation_ceiling: PERCENT_CEILING,
            money_scale: MONEY_SCALE,
            rounding: MoneyRounding::HalfUp,
        }
    }
}

impl LedgerConfig {
    /// Load from process environment, falling back to defaults per key.
    pub fn from_env() -> Result<Self, LedgerError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ALLOCATION_CEILING) {
            config.allocation_ceiling = Decimal::from_str(raw.trim()).map_err(|e| {
                LedgerError::Config(format!("{}='{}': {}", ENV_ALLOCATION_CEILING, raw, e))
            })?;
        }
        if let Some(raw) = lookup(ENV_MONEY_SCALE) {
            config.money_scale = raw.trim().parse().map_err(|e| {
                LedgerError::Config(format!("{}='{}': {}", ENV_MONEY_SCALE, raw, e))
            })?;
        }
        if let Some(raw) = lookup(ENV_ROUNDING) {
            config.rounding = raw
                .parse()
                .map_err(|e| LedgerError::Config(format!("{}: {}", ENV_ROUNDING, e)))?;
        }

        config.validate()?;
        debug!(
            ceiling = %config.allocation_ceiling,
            money_scale = config.money_scale,
            rounding = %config.rounding,
            "Ledger configuration loaded"
        );
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, LedgerError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| LedgerError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.allocation_ceiling <= Decimal::ZERO {
            return Err(LedgerError::Config(format!(
                "allocation ceiling must be positive, got {}",
                self.allocation_ceiling
            )));
        }
        // Decimal carries at most 28 fractional digits
        if self.money_scale > 28 {
            return Err(LedgerError::Config(format!(
                "money scale must be at most 28, got {}",
                self.money_scale
            )));
        }
        Ok(())
    }

    /// Round a monetary amount with this configuration's scale and rule.
    pub fn round_money(&self, value: Decimal) -> Decimal {
        numeric::round_money(value, self.money_scale, self.rounding)
    }
}
