//! Value Recomputation Engine
//!
//! Pure functions over a record's in-memory state.
//!
//! # Precision
//!
//! - Line values are exact: `base * pct / 100`, never rounded here.
//! - Commission amounts are rounded per line to the configured money scale.
//! - `total_amount` is the sum of the rounded line amounts, not the rounded
//!   sum, so rounding error accumulates row by row.
//!
//! # Triggers
//!
//! Every edit ends in [`recompute_record`], a full pass over all execution
//! and commission lines. There is no incremental path.

use productivity_types::{CommissionLine, ExecutionLine, ExecutionRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LedgerConfig;
use crate::numeric::percent_of;

/// Roll-up totals of the commission waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommissionTotals {
    /// Sum of recognized value the waterfall was computed from
    pub base_sum: Decimal,
    pub total_percentage: Decimal,
    pub total_amount: Decimal,
}

pub fn recompute_line_value(base_amount: Decimal, percentage: Decimal) -> Decimal {
    percent_of(base_amount, percentage)
}

/// Re-derive a line's actual value from its base and percentage.
///
/// Always clears a direct override: callers use this only on formula triggers.
pub fn apply_line_formula(line: &mut ExecutionLine) {
    line.actual_value = recompute_line_value(line.base_amount, line.execution_percentage);
    line.actual_value_overridden = false;
}

/// Sum of actual values across all lines, regardless of validation state.
pub fn sum_actual_values(lines: &[ExecutionLine]) -> Decimal {
    lines.iter().map(|l| l.actual_value).sum()
}

/// Recompute every commission line's amount from `base_sum`.
pub fn recompute_commission(
    base_sum: Decimal,
    lines: &mut [CommissionLine],
    config: &LedgerConfig,
) -> CommissionTotals {
    let mut totals = CommissionTotals {
        base_sum,
        ..CommissionTotals::default()
    };

    for line in lines.iter_mut() {
        line.commission_amount = config.round_money(percent_of(base_sum, line.commission_percentage));
        totals.total_percentage += line.commission_percentage;
        totals.total_amount += line.commission_amount;
    }

    totals
}

/// Full recompute: sum execution values, rerun the waterfall, write roll-ups.
pub fn recompute_record(record: &mut ExecutionRecord, config: &LedgerConfig) -> CommissionTotals {
    let base_sum = sum_actual_values(&record.execution_lines);
    let totals = recompute_commission(base_sum, &mut record.commission_lines, config);

    record.total_commission_percentage = totals.total_percentage;
    record.total_commission_amount = totals.total_amount;

    debug!(
        record = %record.name,
        base_sum = %totals.base_sum,
        total_percentage = %totals.total_percentage,
        total_amount = %totals.total_amount,
        "Commission waterfall recomputed"
    );
    totals
}
