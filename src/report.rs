//! Productivity Report Views
//!
//! Pure computations over records the caller has already loaded. Only
//! finalized records are counted.
//!
//! - [`invoice_progress`] - how one invoice was recognized month by month
//! - [`period_summary`] - executed value, costs, shareholder and sales person
//!   commission, and profit per month (or per year for ranges longer than
//!   365 days)
//! - [`monthly_detail`] - line-level view of one month, with each record's
//!   shareholder commission spread over its lines by executed value
//!
//! Sales person commission is `actual_value * sales_person_commission / 100`
//! per line, unrounded.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use productivity_types::{ExecutionRecord, InvoiceKey, RecordName, SalesPersonId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::percent_of;
use crate::recompute::sum_actual_values;

// =============================================================================
// PERIODS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    Month,
    Year,
}

impl PeriodGranularity {
    /// Yearly buckets once the range spans more than 365 days.
    pub fn for_range(from: NaiveDate, to: NaiveDate) -> Self {
        if (to - from).num_days() > 365 {
            Self::Year
        } else {
            Self::Month
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    Year(i32),
    Month { year: i32, month: u32 },
}

impl Period {
    pub fn of(date: NaiveDate, granularity: PeriodGranularity) -> Self {
        match granularity {
            PeriodGranularity::Month => Self::Month {
                year: date.year(),
                month: date.month(),
            },
            PeriodGranularity::Year => Self::Year(date.year()),
        }
    }

    /// Display label: `March 2025` or `2025`.
    pub fn label(&self) -> String {
        match *self {
            Self::Year(year) => year.to_string(),
            Self::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1)
                .map(month_label)
                .unwrap_or_else(|| format!("{}-{:02}", year, month)),
        }
    }
}

fn month_label(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

// =============================================================================
// INVOICE PROGRESS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceProgressRow {
    pub month: String,
    pub report_month: NaiveDate,
    pub execution_percentage: Decimal,
    pub cumulative_execution: Decimal,
    pub record: RecordName,
}

/// Every finalized line for `key`, oldest report month first.
pub fn invoice_progress(records: &[ExecutionRecord], key: &InvoiceKey) -> Vec<InvoiceProgressRow> {
    let mut finalized: Vec<&ExecutionRecord> = records.iter().filter(|r| r.is_finalized()).collect();
    finalized.sort_by(|a, b| {
        a.report_month
            .cmp(&b.report_month)
            .then_with(|| a.name.cmp(&b.name))
    });

    finalized
        .into_iter()
        .flat_map(|record| {
            record.lines_for_key(key).map(move |line| InvoiceProgressRow {
                month: month_label(record.report_month),
                report_month: record.report_month,
                execution_percentage: line.execution_percentage,
                cumulative_execution: line.cumulative_execution,
                record: record.name.clone(),
            })
        })
        .collect()
}

// =============================================================================
// PERIOD SUMMARY
// =============================================================================

/// Scope of a summary report (both dates inclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryQuery {
    pub company: Option<String>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl SummaryQuery {
    fn in_range(&self, date: NaiveDate) -> bool {
        date >= self.from_date && date <= self.to_date
    }

    fn includes(&self, record: &ExecutionRecord) -> bool {
        record.is_finalized()
            && self.in_range(record.report_month)
            && company_matches(self.company.as_deref(), record)
    }
}

fn company_matches(company: Option<&str>, record: &ExecutionRecord) -> bool {
    company.map_or(true, |c| record.company.as_deref() == Some(c))
}

/// A dated cost posted outside the productivity records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub posting_date: NaiveDate,
    pub amount: Decimal,
}

/// Costs the host pulls from its purchasing and journal ledgers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodCosts {
    pub purchases: Vec<CostEntry>,
    pub other_expenses: Vec<CostEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummaryRow {
    pub period: Period,
    pub label: String,
    pub executed_value: Decimal,
    pub total_purchases: Decimal,
    pub other_expenses: Decimal,
    pub shareholder_commission: Decimal,
    pub sales_person_commission: Decimal,
    pub profit_loss: Decimal,
}

impl PeriodSummaryRow {
    /// Sales person commission as a share of executed value.
    pub fn average_sales_person_percentage(&self) -> Decimal {
        if self.executed_value.is_zero() {
            Decimal::ZERO
        } else {
            self.sales_person_commission * Decimal::ONE_HUNDRED / self.executed_value
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub executed_value: Decimal,
    pub shareholder_commission: Decimal,
    pub sales_person_commission: Decimal,
    pub profit_loss: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub granularity: PeriodGranularity,
    pub rows: Vec<PeriodSummaryRow>,
    pub totals: SummaryTotals,
}

#[derive(Debug, Default)]
struct PeriodBucket {
    executed_value: Decimal,
    total_purchases: Decimal,
    other_expenses: Decimal,
    shareholder_commission: Decimal,
    sales_person_commission: Decimal,
}

pub fn period_summary(
    records: &[ExecutionRecord],
    query: &SummaryQuery,
    costs: &PeriodCosts,
) -> PeriodSummary {
    let granularity = PeriodGranularity::for_range(query.from_date, query.to_date);
    let mut buckets: BTreeMap<Period, PeriodBucket> = BTreeMap::new();

    for record in records.iter().filter(|r| query.includes(r)) {
        let bucket = buckets
            .entry(Period::of(record.report_month, granularity))
            .or_default();
        bucket.executed_value += sum_actual_values(&record.execution_lines);
        bucket.shareholder_commission += record.total_commission_amount;
        bucket.sales_person_commission += record
            .execution_lines
            .iter()
            .map(|l| percent_of(l.actual_value, l.sales_person_commission))
            .sum::<Decimal>();
    }

    for cost in costs.purchases.iter().filter(|c| query.in_range(c.posting_date)) {
        buckets
            .entry(Period::of(cost.posting_date, granularity))
            .or_default()
            .total_purchases += cost.amount;
    }
    for cost in costs
        .other_expenses
        .iter()
        .filter(|c| query.in_range(c.posting_date))
    {
        buckets
            .entry(Period::of(cost.posting_date, granularity))
            .or_default()
            .other_expenses += cost.amount;
    }

    let mut totals = SummaryTotals::default();
    let rows = buckets
        .into_iter()
        .map(|(period, b)| {
            let profit_loss = b.executed_value
                - b.total_purchases
                - b.other_expenses
                - b.shareholder_commission
                - b.sales_person_commission;
            totals.executed_value += b.executed_value;
            totals.shareholder_commission += b.shareholder_commission;
            totals.sales_person_commission += b.sales_person_commission;
            totals.profit_loss += profit_loss;
            PeriodSummaryRow {
                period,
                label: period.label(),
                executed_value: b.executed_value,
                total_purchases: b.total_purchases,
                other_expenses: b.other_expenses,
                shareholder_commission: b.shareholder_commission,
                sales_person_commission: b.sales_person_commission,
                profit_loss,
            }
        })
        .collect();

    PeriodSummary {
        granularity,
        rows,
        totals,
    }
}

// =============================================================================
// MONTHLY DETAIL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDetailQuery {
    pub company: Option<String>,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDetailRow {
    pub report_month: NaiveDate,
    pub record: RecordName,
    pub reference_key: Option<InvoiceKey>,
    pub executed_value: Decimal,
    pub execution_percentage: Decimal,
    pub cumulative_execution: Decimal,
    /// This line's share of its record's total commission amount
    pub shareholder_commission: Decimal,
    pub sales_person: Option<SalesPersonId>,
    pub sales_person_commission_percentage: Decimal,
    pub sales_person_commission: Decimal,
}

pub fn monthly_detail(records: &[ExecutionRecord], query: &MonthlyDetailQuery) -> Vec<MonthlyDetailRow> {
    let mut rows = Vec::new();

    for record in records.iter().filter(|r| {
        r.is_finalized()
            && r.report_month.year() == query.year
            && r.report_month.month() == query.month
            && company_matches(query.company.as_deref(), r)
    }) {
        let record_executed = sum_actual_values(&record.execution_lines);
        for line in &record.execution_lines {
            let shareholder_commission = if record_executed.is_zero() {
                Decimal::ZERO
            } else {
                record.total_commission_amount * line.actual_value / record_executed
            };
            rows.push(MonthlyDetailRow {
                report_month: record.report_month,
                record: record.name.clone(),
                reference_key: line.reference_key.clone(),
                executed_value: line.actual_value,
                execution_percentage: line.execution_percentage,
                cumulative_execution: line.cumulative_execution,
                shareholder_commission,
                sales_person: line.sales_person.clone(),
                sales_person_commission_percentage: line.sales_person_commission,
                sales_person_commission: percent_of(line.actual_value, line.sales_person_commission),
            });
        }
    }

    rows.sort_by(|a, b| {
        a.report_month
            .cmp(&b.report_month)
            .then_with(|| a.reference_key.cmp(&b.reference_key))
    });
    rows
}
