//! Error types for the productivity ledger
//!
//! `AllocationExceeded` is the only domain error. It is recovered locally by
//! the editor (the offending percentage is reset) and carried on the edit
//! outcome as a user-facing message. Everything else is a collaborator or
//! configuration failure.

use productivity_types::{InvoiceKey, LineId, RecordName, SalesPersonId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Cumulative execution for an invoice would pass the ceiling.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Total execution for Sales Invoice {key} cannot exceed {}%. The proposed total is {}%.",
    .ceiling.normalize(),
    .cumulative.normalize()
)]
pub struct AllocationExceeded {
    pub key: InvoiceKey,
    /// The rejected cumulative, rejected line included
    pub cumulative: Decimal,
    pub ceiling: Decimal,
}

/// Failures from collaborators, configuration, or bad edits.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("record not found: {0}")]
    RecordNotFound(RecordName),

    #[error("line not found: {0}")]
    LineNotFound(LineId),

    #[error("Execution Percentage on line {line} cannot be negative (got {value}).")]
    NegativePercentage { line: LineId, value: Decimal },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Reasons a record cannot be finalized.
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("Execution Percentage on line {line} cannot be negative.")]
    NegativePercentage { line: LineId },

    #[error("record {0} is not a draft")]
    NotDraft(RecordName),

    #[error("Sales Person {sales_person} on line {line} has no commission rate.")]
    MissingCommissionRate {
        line: LineId,
        sales_person: SalesPersonId,
    },

    #[error(transparent)]
    Allocation(#[from] AllocationExceeded),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
