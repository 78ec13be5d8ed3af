//! Collaborator interfaces
//!
//! The engine never owns persistence. It reaches the host document store
//! through three async traits:
//!
//! - [`ReferenceLookup`] - point lookups (invoice total, shareholder default %,
//!   sales person commission rate)
//! - [`CommittedAllocations`] - the cross-record aggregate used by the validator
//! - [`RecordCatalog`] - list queries; [`ScanningAllocations`] derives the
//!   aggregate from them for stores that cannot aggregate server-side
//!
//! [`memory::MemoryLedgerStore`] implements all three.

pub mod memory;

use async_trait::async_trait;
use productivity_types::{
    InvoiceKey, LineId, RecordName, RecordStatus, SalesPersonId, ShareholderId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

pub use memory::MemoryLedgerStore;

/// Point lookups of reference data.
///
/// `Ok(None)` means the referenced document does not exist or has no value.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Total value of an invoice.
    async fn reference_value(&self, key: &InvoiceKey) -> Result<Option<Decimal>, LedgerError>;

    /// Default commission percentage stored on a shareholder.
    async fn shareholder_default_percentage(
        &self,
        shareholder: &ShareholderId,
    ) -> Result<Option<Decimal>, LedgerError>;

    /// Commission rate stored on a sales person.
    async fn sales_person_commission_rate(
        &self,
        sales_person: &SalesPersonId,
    ) -> Result<Option<Decimal>, LedgerError>;
}

/// Aggregate over finalized records.
#[async_trait]
pub trait CommittedAllocations: Send + Sync {
    /// Sum of execution percentages on lines for `key` in finalized records,
    /// `excluding` one record entirely.
    async fn sum_committed_percentage(
        &self,
        key: &InvoiceKey,
        excluding: &RecordName,
    ) -> Result<Decimal, LedgerError>;
}

// ============================================================================
// LIST FORM
// ============================================================================

/// Filter for [`RecordCatalog::list_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Only records in this status (None = any)
    pub status: Option<RecordStatus>,
    /// Leave this record out
    pub excluding: Option<RecordName>,
}

impl RecordFilter {
    pub fn finalized_excluding(record: &RecordName) -> Self {
        Self {
            status: Some(RecordStatus::Finalized),
            excluding: Some(record.clone()),
        }
    }
}

/// Filter for [`RecordCatalog::list_lines`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineFilter {
    /// Parent records to search
    pub records: Vec<RecordName>,
    /// Only lines with this reference key (None = any)
    pub reference_key: Option<InvoiceKey>,
}

/// The slice of an execution line visible to other records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedLine {
    pub record: RecordName,
    pub line: LineId,
    pub reference_key: Option<InvoiceKey>,
    pub execution_percentage: Decimal,
}

/// List queries over stored records.
#[async_trait]
pub trait RecordCatalog: Send + Sync {
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<RecordName>, LedgerError>;

    async fn list_lines(&self, filter: &LineFilter) -> Result<Vec<CommittedLine>, LedgerError>;
}

/// [`CommittedAllocations`] computed client-side from list queries.
///
/// Fetches the finalized record names, then their lines for the key, then
/// sums. Agrees with a server-side aggregate for the same data; the catalog
/// must return complete (unpaginated) results.
#[derive(Debug, Clone)]
pub struct ScanningAllocations<C> {
    catalog: C,
}

impl<C: RecordCatalog> ScanningAllocations<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn into_inner(self) -> C {
        self.catalog
    }
}

#[async_trait]
impl<C: RecordCatalog> CommittedAllocations for ScanningAllocations<C> {
    async fn sum_committed_percentage(
        &self,
        key: &InvoiceKey,
        excluding: &RecordName,
    ) -> Result<Decimal, LedgerError> {
        let records = self
            .catalog
            .list_records(&RecordFilter::finalized_excluding(excluding))
            .await?;
        if records.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let record_count = records.len();
        let lines = self
            .catalog
            .list_lines(&LineFilter {
                records,
                reference_key: Some(key.clone()),
            })
            .await?;

        let total: Decimal = lines
            .iter()
            .filter(|l| l.reference_key.as_ref() == Some(key))
            .map(|l| l.execution_percentage)
            .sum();

        debug!(
            key = %key,
            records = record_count,
            lines = lines.len(),
            total = %total,
            "Committed percentage computed by scan"
        );
        Ok(total)
    }
}

/// The collaborators one edit needs, borrowed for the duration of a lookup.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub lookup: &'a dyn ReferenceLookup,
    pub allocations: &'a dyn CommittedAllocations,
}

impl<'a> Collaborators<'a> {
    pub fn new(lookup: &'a dyn ReferenceLookup, allocations: &'a dyn CommittedAllocations) -> Self {
        Self {
            lookup,
            allocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use productivity_types::{ExecutionLine, ExecutionRecord};
    use rust_decimal_macros::dec;

    fn record(name: &str, lines: &[(&str, Decimal)]) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(
            RecordName::new(name),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );
        for (key, pct) in lines {
            record.execution_lines.push(
                ExecutionLine::new()
                    .with_reference_key(InvoiceKey::parse(key).unwrap())
                    .with_execution_percentage(*pct),
            );
        }
        record
    }

    #[tokio::test]
    async fn test_scan_matches_aggregate() {
        let store = MemoryLedgerStore::new();
        store
            .insert_record(record("MP-1", &[("SINV-1", dec!(20)), ("SINV-2", dec!(50))]))
            .await;
        store
            .insert_record(record("MP-2", &[("SINV-1", dec!(15.5))]))
            .await;
        store.insert_record(record("MP-3", &[("SINV-1", dec!(40))])).await;
        store.insert_record(record("MP-4", &[("SINV-1", dec!(5))])).await;
        store.finalize_record(&RecordName::new("MP-1")).await.unwrap();
        store.finalize_record(&RecordName::new("MP-2")).await.unwrap();
        store.finalize_record(&RecordName::new("MP-4")).await.unwrap();

        let key = InvoiceKey::parse("SINV-1").unwrap();
        let current = RecordName::new("MP-4");
        let scanning = ScanningAllocations::new(store.clone());

        let aggregate = store.sum_committed_percentage(&key, &current).await.unwrap();
        let scanned = scanning.sum_committed_percentage(&key, &current).await.unwrap();

        assert_eq!(aggregate, dec!(35.5));
        assert_eq!(scanned, aggregate);
    }

    #[tokio::test]
    async fn test_scan_with_no_finalized_records_is_zero() {
        let store = MemoryLedgerStore::new();
        store.insert_record(record("MP-1", &[("SINV-1", dec!(20))])).await;

        let scanning = ScanningAllocations::new(store);
        let total = scanning
            .sum_committed_percentage(&InvoiceKey::parse("SINV-1").unwrap(), &RecordName::new("X"))
            .await
            .unwrap();
        assert_eq!(total, Decimal::ZERO);
    }
}
