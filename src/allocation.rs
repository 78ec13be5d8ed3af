//! Allocation Validator
//!
//! Keeps the cumulative execution of an invoice at or below the ceiling:
//!
//! ```text
//! cumulative = prior_total      (finalized records, current record excluded)
//!            + same_doc_total   (same-key lines in this record, target excluded)
//!            + proposed
//! ```
//!
//! A proposal that pushes `cumulative` past the ceiling is rejected: the
//! accepted percentage becomes 0 (not the previous value) and the displayed
//! cumulative is `prior_total + same_doc_total`.
//!
//! The check is advisory. Two records edited at the same time can each pass
//! and jointly exceed the ceiling once both are finalized; a commit-time
//! guarantee belongs to the storage collaborator.

use productivity_types::{ExecutionLine, InvoiceKey, LineId, RecordName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AllocationExceeded, LedgerError};
use crate::store::CommittedAllocations;

/// Result of validating one proposed percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationDecision {
    pub accepted_percentage: Decimal,
    /// Cumulative to display on the line
    pub cumulative: Decimal,
    pub rejection: Option<AllocationExceeded>,
}

impl AllocationDecision {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }

    /// Unkeyed lines track only their own percentage.
    pub fn local(proposed: Decimal) -> Self {
        Self {
            accepted_percentage: proposed,
            cumulative: proposed,
            rejection: None,
        }
    }
}

/// The two partial sums a decision is made from; kept for display and logs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationContext {
    pub prior_total: Decimal,
    pub same_doc_total: Decimal,
}

impl AllocationContext {
    pub fn committed(&self) -> Decimal {
        self.prior_total + self.same_doc_total
    }
}

/// Decide on a proposal given already-known partial sums.
pub fn decide(
    key: &InvoiceKey,
    context: AllocationContext,
    proposed: Decimal,
    ceiling: Decimal,
) -> AllocationDecision {
    let cumulative = context.committed() + proposed;

    if cumulative > ceiling {
        warn!(
            key = %key,
            prior_total = %context.prior_total,
            same_doc_total = %context.same_doc_total,
            proposed = %proposed,
            cumulative = %cumulative,
            "Allocation rejected, percentage reset to zero"
        );
        return AllocationDecision {
            accepted_percentage: Decimal::ZERO,
            cumulative: context.committed(),
            rejection: Some(AllocationExceeded {
                key: key.clone(),
                cumulative,
                ceiling,
            }),
        };
    }

    debug!(key = %key, cumulative = %cumulative, "Allocation accepted");
    AllocationDecision {
        accepted_percentage: proposed,
        cumulative,
        rejection: None,
    }
}

/// Sum of same-key percentages in the current record, `target` excluded.
pub fn same_record_total(lines: &[ExecutionLine], key: &InvoiceKey, target: LineId) -> Decimal {
    lines
        .iter()
        .filter(|l| l.id != target && l.has_key(key))
        .map(|l| l.execution_percentage)
        .sum()
}

/// Validator bound to the aggregate query and a ceiling.
pub struct AllocationValidator<'a> {
    allocations: &'a dyn CommittedAllocations,
    ceiling: Decimal,
}

impl<'a> AllocationValidator<'a> {
    pub fn new(allocations: &'a dyn CommittedAllocations, ceiling: Decimal) -> Self {
        Self {
            allocations,
            ceiling,
        }
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    /// Committed percentage for `key` in finalized records other than `record`.
    pub async fn prior_total(
        &self,
        key: &InvoiceKey,
        record: &RecordName,
    ) -> Result<Decimal, LedgerError> {
        self.allocations.sum_committed_percentage(key, record).await
    }

    /// Validate a proposed percentage for a line in `record`.
    ///
    /// `same_key_percentages` are the percentages of the other lines in the
    /// current record that share the key. A missing key short-circuits to a
    /// local-only decision without querying the store.
    pub async fn validate<I>(
        &self,
        key: Option<&InvoiceKey>,
        record: &RecordName,
        same_key_percentages: I,
        proposed: Decimal,
    ) -> Result<AllocationDecision, LedgerError>
    where
        I: IntoIterator<Item = Decimal> + Send,
    {
        let Some(key) = key else {
            return Ok(AllocationDecision::local(proposed));
        };

        let same_doc_total: Decimal = same_key_percentages.into_iter().sum();
        let prior_total = self.prior_total(key, record).await?;
        Ok(decide(
            key,
            AllocationContext {
                prior_total,
                same_doc_total,
            },
            proposed,
            self.ceiling,
        ))
    }
}
