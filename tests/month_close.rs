//! Integration tests for closing months
//!
//! Builds records through the editor, finalizes them against the in-memory
//! store and reads the reports back.

use chrono::NaiveDate;
use productivity_ledger::report::{
    invoice_progress, monthly_detail, period_summary, CostEntry, MonthlyDetailQuery,
    PeriodCosts, PeriodGranularity, SummaryQuery,
};
use productivity_ledger::{
    validate_for_finalize, Collaborators, DeliveryStatus, ExecutionRecord, FinalizeError,
    InvoiceKey, LedgerConfig, MemoryLedgerStore, RecordEditor, RecordName, ShareholderId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(raw: &str) -> InvoiceKey {
    InvoiceKey::parse(raw).unwrap()
}

fn month(m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, 1).unwrap()
}

async fn store() -> MemoryLedgerStore {
    let store = MemoryLedgerStore::new();
    store.set_invoice_total(key("SINV-1"), dec!(10000)).await;
    store.set_invoice_total(key("SINV-2"), dec!(4000)).await;
    store
        .set_shareholder_default(ShareholderId::new("SH-1"), dec!(10))
        .await;
    store
}

/// Edit a draft for `m` with the given (invoice, percentage) lines and one
/// shareholder line, then finalize it.
async fn close_month(
    store: &MemoryLedgerStore,
    m: u32,
    lines: &[(&str, Decimal)],
) -> Result<ExecutionRecord, FinalizeError> {
    let services = Collaborators::new(store, store);
    let config = LedgerConfig::default();
    let name = RecordName::new(format!("MP-2025-{:02}", m));
    let record = ExecutionRecord::new(name.clone(), month(m)).with_company("ACME");
    let mut editor = RecordEditor::new(record, config.clone());

    for (invoice, pct) in lines {
        let id = editor.add_execution_line();
        editor
            .assign_reference_key(id, Some(key(invoice)), services)
            .await?;
        editor.edit_execution_percentage(id, *pct, services).await?;
    }
    let sh = editor.add_commission_line();
    editor
        .assign_shareholder(sh, Some(ShareholderId::new("SH-1")), services)
        .await?;

    let mut record = editor.into_record();
    validate_for_finalize(&mut record, services, &config).await?;
    store.insert_record(record).await;
    store.finalize_record(&name).await?;
    Ok(store
        .load_record(&name)
        .await
        .expect("record was just inserted"))
}

#[tokio::test]
async fn test_invoice_recognized_over_three_months() {
    init_tracing();
    let store = store().await;

    let jan = close_month(&store, 1, &[("SINV-1", dec!(40))]).await.unwrap();
    assert_eq!(jan.execution_lines[0].cumulative_execution, dec!(40));
    assert_eq!(jan.total_commission_amount, dec!(400));

    let feb = close_month(&store, 2, &[("SINV-1", dec!(35)), ("SINV-2", dec!(50))])
        .await
        .unwrap();
    assert_eq!(feb.execution_lines[0].cumulative_execution, dec!(75));
    assert_eq!(feb.total_commission_amount, dec!(550));

    let mar = close_month(&store, 3, &[("SINV-1", dec!(25))]).await.unwrap();
    assert_eq!(mar.execution_lines[0].cumulative_execution, dec!(100));
    assert_eq!(mar.execution_lines[0].delivery_status, DeliveryStatus::Delivered);

    let finalized = store.finalized_records().await;
    let progress = invoice_progress(&finalized, &key("SINV-1"));
    let months: Vec<&str> = progress.iter().map(|r| r.month.as_str()).collect();
    assert_eq!(months, ["January 2025", "February 2025", "March 2025"]);
    let cumulative: Vec<Decimal> = progress.iter().map(|r| r.cumulative_execution).collect();
    assert_eq!(cumulative, [dec!(40), dec!(75), dec!(100)]);
}

#[tokio::test]
async fn test_over_allocated_draft_cannot_be_finalized() {
    init_tracing();
    let store = store().await;
    close_month(&store, 1, &[("SINV-1", dec!(80))]).await.unwrap();

    // The editor resets the offending line, so craft the draft directly
    let mut draft = ExecutionRecord::new(RecordName::new("MP-2025-02"), month(2));
    draft.execution_lines.push(
        productivity_ledger::ExecutionLine::new()
            .with_reference_key(key("SINV-1"))
            .with_base_amount(dec!(10000))
            .with_execution_percentage(dec!(30)),
    );

    let err = validate_for_finalize(
        &mut draft,
        Collaborators::new(&store, &store),
        &LedgerConfig::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Total execution for Sales Invoice SINV-1 cannot exceed 100%. The proposed total is 110%."
    );
}

#[tokio::test]
async fn test_summary_and_detail_views() {
    init_tracing();
    let store = store().await;
    close_month(&store, 1, &[("SINV-1", dec!(40))]).await.unwrap();
    close_month(&store, 2, &[("SINV-1", dec!(35)), ("SINV-2", dec!(50))])
        .await
        .unwrap();
    let finalized = store.finalized_records().await;

    let summary = period_summary(
        &finalized,
        &SummaryQuery {
            company: Some("ACME".to_string()),
            from_date: month(1),
            to_date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
        },
        &PeriodCosts {
            purchases: vec![CostEntry {
                posting_date: NaiveDate::from_ymd_opt(2025, 2, 14).unwrap(),
                amount: dec!(1500),
            }],
            other_expenses: Vec::new(),
        },
    );

    assert_eq!(summary.granularity, PeriodGranularity::Month);
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.rows[0].executed_value, dec!(4000));
    assert_eq!(summary.rows[0].profit_loss, dec!(3600));
    assert_eq!(summary.rows[1].executed_value, dec!(5500));
    assert_eq!(summary.rows[1].profit_loss, dec!(3450));
    assert_eq!(summary.totals.profit_loss, dec!(7050));

    let detail = monthly_detail(
        &finalized,
        &MonthlyDetailQuery {
            company: Some("ACME".to_string()),
            year: 2025,
            month: 2,
        },
    );
    assert_eq!(detail.len(), 2);
    assert_eq!(detail[0].reference_key, Some(key("SINV-1")));
    assert_eq!(detail[0].executed_value, dec!(3500));
    assert_eq!(detail[0].shareholder_commission, dec!(350));
    assert_eq!(detail[1].shareholder_commission, dec!(200));
}
