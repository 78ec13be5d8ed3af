//! In-memory ledger store
//!
//! Holds records, invoice totals and shareholder defaults behind an async
//! `RwLock`. Used by tests and by hosts that embed the engine without a
//! database. Clones share the same state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use productivity_types::{
    ExecutionRecord, InvoiceKey, RecordName, RecordStatus, SalesPersonId, ShareholderId,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    CommittedAllocations, CommittedLine, LineFilter, RecordCatalog, RecordFilter, ReferenceLookup,
};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<RecordName, ExecutionRecord>,
    invoice_totals: HashMap<InvoiceKey, Decimal>,
    shareholder_defaults: HashMap<ShareholderId, Decimal>,
    sales_person_rates: HashMap<SalesPersonId, Decimal>,
    /// When set, every query fails with a storage error
    unavailable: bool,
}

impl MemoryState {
    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable {
            Err(LedgerError::Storage("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reference data ──

    pub async fn set_invoice_total(&self, key: InvoiceKey, total: Decimal) {
        self.state.write().await.invoice_totals.insert(key, total);
    }

    pub async fn set_shareholder_default(&self, shareholder: ShareholderId, percentage: Decimal) {
        self.state
            .write()
            .await
            .shareholder_defaults
            .insert(shareholder, percentage);
    }

    pub async fn set_sales_person_rate(&self, sales_person: SalesPersonId, rate: Decimal) {
        self.state
            .write()
            .await
            .sales_person_rates
            .insert(sales_person, rate);
    }

    // ── Records ──

    /// Insert or replace a record, keeping whatever status it carries.
    pub async fn insert_record(&self, record: ExecutionRecord) {
        self.state
            .write()
            .await
            .records
            .insert(record.name.clone(), record);
    }

    pub async fn load_record(&self, name: &RecordName) -> Option<ExecutionRecord> {
        self.state.read().await.records.get(name).cloned()
    }

    pub async fn finalize_record(&self, name: &RecordName) -> Result<(), LedgerError> {
        self.set_status(name, RecordStatus::Finalized).await
    }

    /// Cancelled records stop contributing to committed totals.
    pub async fn cancel_record(&self, name: &RecordName) -> Result<(), LedgerError> {
        self.set_status(name, RecordStatus::Cancelled).await
    }

    async fn set_status(&self, name: &RecordName, status: RecordStatus) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(name)
            .ok_or_else(|| LedgerError::RecordNotFound(name.clone()))?;
        record.status = status;
        info!(record = %name, status = ?status, "Record status changed");
        Ok(())
    }

    /// All finalized records, ordered by name.
    pub async fn finalized_records(&self) -> Vec<ExecutionRecord> {
        self.state
            .read()
            .await
            .records
            .values()
            .filter(|r| r.is_finalized())
            .cloned()
            .collect()
    }

    // ── Fault injection ──

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl ReferenceLookup for MemoryLedgerStore {
    async fn reference_value(&self, key: &InvoiceKey) -> Result<Option<Decimal>, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.invoice_totals.get(key).copied())
    }

    async fn shareholder_default_percentage(
        &self,
        shareholder: &ShareholderId,
    ) -> Result<Option<Decimal>, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.shareholder_defaults.get(shareholder).copied())
    }

    async fn sales_person_commission_rate(
        &self,
        sales_person: &SalesPersonId,
    ) -> Result<Option<Decimal>, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.sales_person_rates.get(sales_person).copied())
    }
}

#[async_trait]
impl CommittedAllocations for MemoryLedgerStore {
    async fn sum_committed_percentage(
        &self,
        key: &InvoiceKey,
        excluding: &RecordName,
    ) -> Result<Decimal, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.is_finalized() && &r.name != excluding)
            .flat_map(|r| r.lines_for_key(key))
            .map(|l| l.execution_percentage)
            .sum())
    }
}

#[async_trait]
impl RecordCatalog for MemoryLedgerStore {
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<RecordName>, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .records
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.excluding.as_ref() != Some(&r.name))
            .map(|r| r.name.clone())
            .collect())
    }

    async fn list_lines(&self, filter: &LineFilter) -> Result<Vec<CommittedLine>, LedgerError> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut lines = Vec::new();
        for name in &filter.records {
            let Some(record) = state.records.get(name) else {
                continue;
            };
            for line in &record.execution_lines {
                if filter
                    .reference_key
                    .as_ref()
                    .is_some_and(|key| !line.has_key(key))
                {
                    continue;
                }
                lines.push(CommittedLine {
                    record: record.name.clone(),
                    line: line.id,
                    reference_key: line.reference_key.clone(),
                    execution_percentage: line.execution_percentage,
                });
            }
        }
        Ok(lines)
    }
}
