//! Shared numeric and formatting helpers
//!
//! Percentages and money are both `Decimal`. Percentages are never rounded;
//! money is rounded only when a commission amount is produced, using the
//! configured [`MoneyRounding`].

use std::fmt;
use std::str::FromStr;

use productivity_types::DeliveryStatus;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Default cap on the cumulative execution of a single invoice.
pub const PERCENT_CEILING: Decimal = Decimal::ONE_HUNDRED;

/// Default number of decimal places for monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Midpoint rule applied when rounding monetary amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyRounding {
    /// Half away from zero (33.335 -> 33.34)
    #[default]
    HalfUp,
    /// Banker's rounding (33.335 -> 33.34, 33.345 -> 33.34)
    HalfEven,
}

impl MoneyRounding {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

impl fmt::Display for MoneyRounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HalfUp => f.write_str("half_up"),
            Self::HalfEven => f.write_str("half_even"),
        }
    }
}

impl FromStr for MoneyRounding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_up" | "half-up" => Ok(Self::HalfUp),
            "half_even" | "half-even" | "bankers" => Ok(Self::HalfEven),
            other => Err(format!("unknown rounding mode '{}'", other)),
        }
    }
}

/// `base * percentage / 100`, exact.
pub fn percent_of(base: Decimal, percentage: Decimal) -> Decimal {
    base * percentage / Decimal::ONE_HUNDRED
}

/// Round a monetary amount to `scale` places.
pub fn round_money(value: Decimal, scale: u32, rounding: MoneyRounding) -> Decimal {
    value.round_dp_with_strategy(scale, rounding.strategy())
}

/// Render a percentage for user-facing text: `101`, `70.5`, never `70.500`.
pub fn format_percent(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Delivery status implied by a cumulative execution percentage.
///
/// The comparison is made on the value rounded to two places, so 99.999 reads
/// as delivered.
pub fn delivery_status(cumulative: Decimal) -> DeliveryStatus {
    let rounded = cumulative.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded >= PERCENT_CEILING {
        DeliveryStatus::Delivered
    } else if rounded <= Decimal::ZERO {
        DeliveryStatus::NotStarted
    } else {
        DeliveryStatus::NotDelivered
    }
}
