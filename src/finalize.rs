//! Submit-time validation of a whole record
//!
//! Re-runs every rule over the full record before the storage collaborator
//! marks it finalized. Unlike edit-time validation, a violation here is an
//! error: nothing is reset, the record is simply not finalizable.
//!
//! Every lookup completes before the record is written, so a failed check
//! leaves the record exactly as it was passed in.
//!
//! Storage failures propagate. A missing shareholder default still counts as
//! 0; a sales person without a commission rate is an error.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use productivity_types::{ExecutionRecord, InvoiceKey, RecordStatus};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{AllocationExceeded, FinalizeError};
use crate::numeric::{delivery_status, percent_of};
use crate::recompute::{recompute_record, CommissionTotals};
use crate::store::Collaborators;

/// Per-invoice outcome of a successful check.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTotal {
    pub key: InvoiceKey,
    pub committed: Decimal,
    pub in_record: Decimal,
}

impl KeyTotal {
    pub fn cumulative(&self) -> Decimal {
        self.committed + self.in_record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeSummary {
    pub keys: Vec<KeyTotal>,
    pub totals: CommissionTotals,
}

/// Validate and normalize `record` for finalization.
///
/// On success the record's derived fields (cumulative, delivery status,
/// unset actual values, unset commission percentages, roll-ups) are filled in.
pub async fn validate_for_finalize(
    record: &mut ExecutionRecord,
    services: Collaborators<'_>,
    config: &LedgerConfig,
) -> Result<FinalizeSummary, FinalizeError> {
    if record.status != RecordStatus::Draft {
        return Err(FinalizeError::NotDraft(record.name.clone()));
    }

    if let Some(line) = record
        .execution_lines
        .iter()
        .find(|l| l.execution_percentage < Decimal::ZERO)
    {
        return Err(FinalizeError::NegativePercentage { line: line.id });
    }

    // Same-key totals inside the record
    let mut in_record: BTreeMap<InvoiceKey, Decimal> = BTreeMap::new();
    for line in &record.execution_lines {
        if let Some(key) = &line.reference_key {
            *in_record.entry(key.clone()).or_default() += line.execution_percentage;
        }
    }

    let name = &record.name;
    let committed = try_join_all(
        in_record
            .keys()
            .map(move |key| services.allocations.sum_committed_percentage(key, name)),
    )
    .await?;

    let keys: Vec<KeyTotal> = in_record
        .into_iter()
        .zip(committed)
        .map(|((key, in_record), committed)| KeyTotal {
            key,
            committed,
            in_record,
        })
        .collect();

    for total in &keys {
        if total.cumulative() > config.allocation_ceiling {
            return Err(AllocationExceeded {
                key: total.key.clone(),
                cumulative: total.cumulative(),
                ceiling: config.allocation_ceiling,
            }
            .into());
        }
    }

    // Fills for percentages left at zero, by line index
    let sales_person_rates = try_join_all(
        record
            .execution_lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.sales_person_commission.is_zero())
            .filter_map(|(i, l)| l.sales_person.as_ref().map(|sp| (i, l.id, sp)))
            .map(|(i, line, sales_person)| async move {
                match services
                    .lookup
                    .sales_person_commission_rate(sales_person)
                    .await?
                {
                    Some(rate) => Ok::<_, FinalizeError>((i, rate)),
                    None => Err(FinalizeError::MissingCommissionRate {
                        line,
                        sales_person: sales_person.clone(),
                    }),
                }
            }),
    )
    .await?;

    let shareholder_defaults = try_join_all(
        record
            .commission_lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.commission_percentage.is_zero())
            .filter_map(|(i, l)| l.shareholder.as_ref().map(|sh| (i, sh)))
            .map(|(i, shareholder)| async move {
                services
                    .lookup
                    .shareholder_default_percentage(shareholder)
                    .await
                    .map(|value| (i, value.unwrap_or_default()))
            }),
    )
    .await?;

    // ── Writes ──

    for line in &mut record.execution_lines {
        let cumulative = match &line.reference_key {
            Some(key) => keys
                .iter()
                .find(|t| &t.key == key)
                .map_or(line.execution_percentage, KeyTotal::cumulative),
            None => line.execution_percentage,
        };
        line.cumulative_execution = cumulative;
        line.delivery_status = delivery_status(cumulative);

        if line.actual_value.is_zero() {
            line.actual_value =
                config.round_money(percent_of(line.base_amount, line.execution_percentage));
        }
    }

    for (i, rate) in sales_person_rates {
        if let Some(line) = record.execution_lines.get_mut(i) {
            line.sales_person_commission = rate;
        }
    }
    for (i, percentage) in shareholder_defaults {
        if let Some(line) = record.commission_lines.get_mut(i) {
            line.commission_percentage = percentage;
        }
    }

    let totals = recompute_record(record, config);
    info!(
        record = %record.name,
        invoices = keys.len(),
        total_commission = %totals.total_amount,
        "Record passed finalize validation"
    );
    Ok(FinalizeSummary { keys, totals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use chrono::NaiveDate;
    use crate::error::LedgerError;
    use crate::store::ReferenceLookup;
    use async_trait::async_trait;
    use productivity_types::{
        CommissionLine, DeliveryStatus, ExecutionLine, RecordName, SalesPersonId, ShareholderId,
    };
    use rust_decimal_macros::dec;

    fn key(raw: &str) -> InvoiceKey {
        InvoiceKey::parse(raw).unwrap()
    }

    fn draft(name: &str) -> ExecutionRecord {
        ExecutionRecord::new(
            RecordName::new(name),
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        )
    }

    fn keyed(invoice: &str, base: Decimal, pct: Decimal) -> ExecutionLine {
        ExecutionLine::new()
            .with_reference_key(key(invoice))
            .with_base_amount(base)
            .with_execution_percentage(pct)
    }

    async fn store_with_prior(pct: Decimal) -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        let mut prior = draft("MP-PRIOR");
        prior.execution_lines.push(keyed("SINV-1", dec!(1000), pct));
        store.insert_record(prior).await;
        store
            .finalize_record(&RecordName::new("MP-PRIOR"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_fills_derived_fields() {
        let store = store_with_prior(dec!(50)).await;
        store
            .set_shareholder_default(ShareholderId::new("SH-1"), dec!(10))
            .await;

        let mut record = draft("MP-1");
        record
            .execution_lines
            .push(keyed("SINV-1", dec!(1000), dec!(20.005)));
        record
            .execution_lines
            .push(keyed("SINV-1", dec!(1000), dec!(29.995)));
        record
            .commission_lines
            .push(CommissionLine::new().with_shareholder(ShareholderId::new("SH-1")));

        let summary = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.keys.len(), 1);
        assert_eq!(summary.keys[0].cumulative(), dec!(100));
        for line in &record.execution_lines {
            assert_eq!(line.cumulative_execution, dec!(100));
            assert_eq!(line.delivery_status, DeliveryStatus::Delivered);
        }
        // Server-side fill rounds to money scale
        assert_eq!(record.execution_lines[0].actual_value, dec!(200.05));
        assert_eq!(record.execution_lines[1].actual_value, dec!(299.95));
        assert_eq!(record.commission_lines[0].commission_percentage, dec!(10));
        assert_eq!(record.total_commission_amount, dec!(50));
    }

    #[tokio::test]
    async fn test_over_ceiling_is_an_error() {
        let store = store_with_prior(dec!(80)).await;
        let mut record = draft("MP-1");
        record
            .execution_lines
            .push(keyed("SINV-1", dec!(1000), dec!(15)));
        record
            .execution_lines
            .push(keyed("SINV-1", dec!(1000), dec!(10)));

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();

        match err {
            FinalizeError::Allocation(exceeded) => {
                assert_eq!(exceeded.key, key("SINV-1"));
                assert_eq!(exceeded.cumulative, dec!(105));
            }
            other => panic!("expected allocation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_negative_percentage_is_rejected() {
        let store = MemoryLedgerStore::new();
        let mut record = draft("MP-1");
        let line = ExecutionLine::new().with_execution_percentage(dec!(-5));
        let id = line.id;
        record.execution_lines.push(line);

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FinalizeError::NegativePercentage { line } if line == id));
    }

    #[tokio::test]
    async fn test_only_drafts_can_be_finalized() {
        let store = MemoryLedgerStore::new();
        let mut record = draft("MP-1");
        record.status = RecordStatus::Finalized;

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FinalizeError::NotDraft(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let store = MemoryLedgerStore::new();
        store.set_unavailable(true).await;
        let mut record = draft("MP-1");
        record
            .execution_lines
            .push(keyed("SINV-1", dec!(1000), dec!(10)));

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FinalizeError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_unkeyed_lines_track_locally_and_keep_overrides() {
        let store = MemoryLedgerStore::new();
        let mut record = draft("MP-1");
        let mut line = ExecutionLine::new()
            .with_base_amount(dec!(400))
            .with_execution_percentage(dec!(25));
        line.actual_value = dec!(123.45);
        record.execution_lines.push(line);

        validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap();

        let line = &record.execution_lines[0];
        assert_eq!(line.cumulative_execution, dec!(25));
        assert_eq!(line.delivery_status, DeliveryStatus::NotDelivered);
        assert_eq!(line.actual_value, dec!(123.45));
    }

    /// Reference data whose shareholder lookup is down.
    struct ShareholderLookupDown;

    #[async_trait]
    impl ReferenceLookup for ShareholderLookupDown {
        async fn reference_value(&self, _key: &InvoiceKey) -> Result<Option<Decimal>, LedgerError> {
            Ok(None)
        }

        async fn shareholder_default_percentage(
            &self,
            _shareholder: &ShareholderId,
        ) -> Result<Option<Decimal>, LedgerError> {
            Err(LedgerError::Storage("down".to_string()))
        }

        async fn sales_person_commission_rate(
            &self,
            _sales_person: &SalesPersonId,
        ) -> Result<Option<Decimal>, LedgerError> {
            Ok(Some(dec!(2)))
        }
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_record_untouched() {
        let store = MemoryLedgerStore::new();
        let mut record = draft("MP-1");
        record.execution_lines.push(
            keyed("SINV-1", dec!(1000), dec!(40)).with_sales_person(SalesPersonId::new("SP-1")),
        );
        record
            .commission_lines
            .push(CommissionLine::new().with_shareholder(ShareholderId::new("SH-1")));
        let before = record.clone();

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&ShareholderLookupDown, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FinalizeError::Ledger(LedgerError::Storage(_))));
        assert_eq!(record, before);
    }

    #[tokio::test]
    async fn test_fills_sales_person_rate() {
        let store = MemoryLedgerStore::new();
        store
            .set_sales_person_rate(SalesPersonId::new("SP-1"), dec!(3))
            .await;
        let mut record = draft("MP-1");
        record.execution_lines.push(
            keyed("SINV-1", dec!(1000), dec!(40)).with_sales_person(SalesPersonId::new("SP-1")),
        );
        let mut manual = keyed("SINV-2", dec!(1000), dec!(10))
            .with_sales_person(SalesPersonId::new("SP-1"));
        manual.sales_person_commission = dec!(7.5);
        record.execution_lines.push(manual);

        validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(record.execution_lines[0].sales_person_commission, dec!(3));
        assert_eq!(record.execution_lines[1].sales_person_commission, dec!(7.5));
    }

    #[tokio::test]
    async fn test_sales_person_without_rate_is_an_error() {
        let store = MemoryLedgerStore::new();
        let mut record = draft("MP-1");
        let line = keyed("SINV-1", dec!(1000), dec!(40)).with_sales_person(SalesPersonId::new("SP-9"));
        let id = line.id;
        record.execution_lines.push(line);
        let before = record.clone();

        let err = validate_for_finalize(
            &mut record,
            Collaborators::new(&store, &store),
            &LedgerConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("Sales Person SP-9 on line {id} has no commission rate.")
        );
        assert_eq!(record, before);
    }
}
