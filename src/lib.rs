//! Productivity Ledger - invoice execution tracking and commission waterfall
//!
//! A monthly productivity record recognizes parts of sales invoices as
//! executed. This crate keeps the cumulative execution of every invoice at or
//! below the ceiling across all finalized records, derives each line's
//! executed value, and distributes shareholder commission over the record's
//! total executed value.
//!
//! ## Flow
//! Host form edit -> [`RecordEditor`] -> [`PendingEdit::resolve`] against the
//! [`store`] collaborators -> [`RecordEditor::apply`] -> full recompute.
//! On submit, [`validate_for_finalize`] re-runs every rule over the record.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use productivity_ledger::{
//!     Collaborators, ExecutionRecord, InvoiceKey, LedgerConfig, MemoryLedgerStore, RecordEditor,
//!     RecordName,
//! };
//! use rust_decimal::Decimal;
//!
//! # async fn run() -> Result<(), productivity_ledger::LedgerError> {
//! let store = MemoryLedgerStore::new();
//! let month = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//! let record = ExecutionRecord::new(RecordName::new("MP-2025-03"), month);
//!
//! let mut editor = RecordEditor::new(record, LedgerConfig::from_env()?);
//! let line = editor.add_execution_line();
//! let services = Collaborators::new(&store, &store);
//! editor
//!     .assign_reference_key(line, InvoiceKey::parse("SINV-0001"), services)
//!     .await?;
//! editor
//!     .edit_execution_percentage(line, Decimal::new(40, 0), services)
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Numeric model and configuration
pub mod config;
pub mod error;
pub mod numeric;

// Collaborator seams and the in-memory store
pub mod store;

// Core engine
pub mod allocation;
pub mod editor;
pub mod finalize;
pub mod recompute;

// Read-only views over finalized records
pub mod report;

pub use allocation::{AllocationContext, AllocationDecision, AllocationValidator};
pub use config::LedgerConfig;
pub use editor::{
    EditOutcome, EditReport, EditSeq, EditStep, LookupFailure, LookupIssue, LookupSubject,
    PendingEdit, RecordEditor, ResolvedEdit,
};
pub use error::{AllocationExceeded, FinalizeError, LedgerError};
pub use finalize::{validate_for_finalize, FinalizeSummary, KeyTotal};
pub use numeric::MoneyRounding;
pub use recompute::{recompute_record, CommissionTotals};
pub use store::{
    Collaborators, CommittedAllocations, MemoryLedgerStore, RecordCatalog, ReferenceLookup,
    ScanningAllocations,
};

// Domain types
pub use productivity_types::{
    CommissionLine, DeliveryStatus, ExecutionLine, ExecutionRecord, InvoiceKey, LineId,
    RecordName, RecordStatus, SalesPersonId, ShareholderId,
};
