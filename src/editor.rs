//! Record Edit Session
//!
//! Entry points the host form layer calls on every field edit. Each edit is
//! split in three phases so that a user can keep typing while a lookup is in
//! flight:
//!
//! 1. a synchronous call mutates the in-memory record and, when it needs the
//!    store, returns a [`PendingEdit`] tagged with an [`EditSeq`];
//! 2. [`PendingEdit::resolve`] awaits the collaborators without borrowing the
//!    editor;
//! 3. [`RecordEditor::apply`] folds the result back in, unless a newer edit on
//!    the same line and channel has been issued since, in which case the
//!    result is dropped as [`EditOutcome::Superseded`].
//!
//! Sequence numbers are tracked per line and per channel (invoice lookup,
//! allocation check, shareholder lookup), so a percentage edit does not throw
//! away the invoice total fetched for a key assigned just before it.
//!
//! Every completed edit ends with a full waterfall recompute.

use std::collections::HashMap;
use std::fmt;

use productivity_types::{
    CommissionLine, ExecutionLine, ExecutionRecord, InvoiceKey, LineId, RecordName, SalesPersonId,
    ShareholderId,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::allocation::{decide, same_record_total, AllocationContext, AllocationDecision};
use crate::config::LedgerConfig;
use crate::error::{AllocationExceeded, LedgerError};
use crate::numeric::delivery_status;
use crate::recompute::{apply_line_formula, recompute_record, CommissionTotals};
use crate::store::Collaborators;

// ============================================================================
// SEQUENCING
// ============================================================================

/// Monotonic tag of an issued edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditSeq(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EditChannel {
    Reference,
    Allocation,
    Shareholder,
}

#[derive(Debug, Default)]
struct EditSequencer {
    counter: u64,
    latest: HashMap<(LineId, EditChannel), u64>,
}

impl EditSequencer {
    fn issue(&mut self, line: LineId, channel: EditChannel) -> EditSeq {
        self.counter += 1;
        self.latest.insert((line, channel), self.counter);
        EditSeq(self.counter)
    }

    fn is_current(&self, line: LineId, channel: EditChannel, seq: EditSeq) -> bool {
        self.latest.get(&(line, channel)) == Some(&seq.0)
    }

    fn forget(&mut self, line: LineId) {
        self.latest.retain(|(l, _), _| *l != line);
    }
}

// ============================================================================
// LOOKUP ISSUES
// ============================================================================

/// What a lookup was asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupSubject {
    ReferenceValue(InvoiceKey),
    CommittedTotal(InvoiceKey),
    ShareholderDefault(ShareholderId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupFailure {
    NotFound,
    Failed(String),
}

/// A lookup that produced no value; the engine used 0 in its place.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupIssue {
    pub subject: LookupSubject,
    pub failure: LookupFailure,
}

impl fmt::Display for LookupIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            LookupSubject::ReferenceValue(key) => write!(f, "total of Sales Invoice {}", key)?,
            LookupSubject::CommittedTotal(key) => {
                write!(f, "committed execution of Sales Invoice {}", key)?
            }
            LookupSubject::ShareholderDefault(sh) => {
                write!(f, "commission percentage of Shareholder {}", sh)?
            }
        }
        match &self.failure {
            LookupFailure::NotFound => f.write_str(" not found, using 0"),
            LookupFailure::Failed(reason) => write!(f, " unavailable ({}), using 0", reason),
        }
    }
}

fn value_or_zero(
    subject: LookupSubject,
    result: Result<Option<Decimal>, LedgerError>,
    issues: &mut Vec<LookupIssue>,
) -> Decimal {
    let failure = match result {
        Ok(Some(value)) => return value,
        Ok(None) => LookupFailure::NotFound,
        Err(e) => LookupFailure::Failed(e.to_string()),
    };
    let issue = LookupIssue { subject, failure };
    warn!(issue = %issue, "Lookup returned no value");
    issues.push(issue);
    Decimal::ZERO
}

// ============================================================================
// PENDING / RESOLVED EDITS
// ============================================================================

/// An edit waiting on the collaborators.
#[derive(Debug, Clone)]
pub enum PendingEdit {
    /// Key assigned: fetch the invoice total and the committed total
    ReferenceLookup {
        line: LineId,
        key: InvoiceKey,
        record: RecordName,
        reference_seq: EditSeq,
        allocation_seq: EditSeq,
    },
    /// Percentage changed on a keyed line
    AllocationCheck {
        line: LineId,
        key: InvoiceKey,
        record: RecordName,
        seq: EditSeq,
    },
    /// Shareholder assigned: fetch the default commission percentage
    ShareholderLookup {
        line: LineId,
        shareholder: ShareholderId,
        seq: EditSeq,
    },
}

impl PendingEdit {
    pub fn line(&self) -> LineId {
        match self {
            Self::ReferenceLookup { line, .. }
            | Self::AllocationCheck { line, .. }
            | Self::ShareholderLookup { line, .. } => *line,
        }
    }

    /// Run the lookups. Failures and missing values resolve to 0 with an issue.
    pub async fn resolve(self, services: Collaborators<'_>) -> ResolvedEdit {
        let mut issues = Vec::new();
        match self {
            Self::ReferenceLookup {
                line,
                key,
                record,
                reference_seq,
                allocation_seq,
            } => {
                let (value, committed) = futures::join!(
                    services.lookup.reference_value(&key),
                    services.allocations.sum_committed_percentage(&key, &record),
                );
                let base_amount =
                    value_or_zero(LookupSubject::ReferenceValue(key.clone()), value, &mut issues);
                let prior_total = value_or_zero(
                    LookupSubject::CommittedTotal(key.clone()),
                    committed.map(Some),
                    &mut issues,
                );
                ResolvedEdit::Reference {
                    line,
                    key,
                    reference_seq,
                    allocation_seq,
                    base_amount,
                    prior_total,
                    issues,
                }
            }
            Self::AllocationCheck {
                line,
                key,
                record,
                seq,
            } => {
                let committed = services
                    .allocations
                    .sum_committed_percentage(&key, &record)
                    .await;
                let prior_total = value_or_zero(
                    LookupSubject::CommittedTotal(key.clone()),
                    committed.map(Some),
                    &mut issues,
                );
                ResolvedEdit::Allocation {
                    line,
                    key,
                    seq,
                    prior_total,
                    issues,
                }
            }
            Self::ShareholderLookup {
                line,
                shareholder,
                seq,
            } => {
                let value = services
                    .lookup
                    .shareholder_default_percentage(&shareholder)
                    .await;
                let default_percentage = value_or_zero(
                    LookupSubject::ShareholderDefault(shareholder.clone()),
                    value,
                    &mut issues,
                );
                ResolvedEdit::Shareholder {
                    line,
                    shareholder,
                    seq,
                    default_percentage,
                    issues,
                }
            }
        }
    }
}

/// Lookup results ready to be applied.
#[derive(Debug, Clone)]
pub enum ResolvedEdit {
    Reference {
        line: LineId,
        key: InvoiceKey,
        reference_seq: EditSeq,
        allocation_seq: EditSeq,
        base_amount: Decimal,
        prior_total: Decimal,
        issues: Vec<LookupIssue>,
    },
    Allocation {
        line: LineId,
        key: InvoiceKey,
        seq: EditSeq,
        prior_total: Decimal,
        issues: Vec<LookupIssue>,
    },
    Shareholder {
        line: LineId,
        shareholder: ShareholderId,
        seq: EditSeq,
        default_percentage: Decimal,
        issues: Vec<LookupIssue>,
    },
}

impl ResolvedEdit {
    pub fn line(&self) -> LineId {
        match self {
            Self::Reference { line, .. }
            | Self::Allocation { line, .. }
            | Self::Shareholder { line, .. } => *line,
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What a completed edit did to the record.
#[derive(Debug, Clone, PartialEq)]
pub struct EditReport {
    pub line: Option<LineId>,
    /// Present when the edit ran (or short-circuited) allocation validation
    pub allocation: Option<AllocationDecision>,
    pub issues: Vec<LookupIssue>,
    pub totals: CommissionTotals,
}

impl EditReport {
    pub fn rejection(&self) -> Option<&AllocationExceeded> {
        self.allocation.as_ref().and_then(|d| d.rejection.as_ref())
    }

    /// User-facing validation message, if the edit was rejected.
    pub fn message(&self) -> Option<String> {
        self.rejection().map(|r| r.to_string())
    }
}

/// Result of a synchronous edit call.
#[derive(Debug, Clone)]
pub enum EditStep {
    Done(EditReport),
    Pending(PendingEdit),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied(EditReport),
    /// A newer edit on the same line made this result obsolete
    Superseded { line: LineId },
}

impl EditOutcome {
    pub fn report(&self) -> Option<&EditReport> {
        match self {
            Self::Applied(report) => Some(report),
            Self::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

// ============================================================================
// EDITOR
// ============================================================================

/// An in-memory record under edit.
#[derive(Debug)]
pub struct RecordEditor {
    record: ExecutionRecord,
    config: LedgerConfig,
    sequencer: EditSequencer,
}

impl RecordEditor {
    /// Open a record for editing; roll-ups are recomputed on open.
    pub fn new(mut record: ExecutionRecord, config: LedgerConfig) -> Self {
        recompute_record(&mut record, &config);
        Self {
            record,
            config,
            sequencer: EditSequencer::default(),
        }
    }

    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    pub fn into_record(self) -> ExecutionRecord {
        self.record
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Per-record entry point: full waterfall recompute.
    pub fn recompute(&mut self) -> CommissionTotals {
        recompute_record(&mut self.record, &self.config)
    }

    fn finish(
        &mut self,
        line: Option<LineId>,
        allocation: Option<AllocationDecision>,
        issues: Vec<LookupIssue>,
    ) -> EditReport {
        let totals = self.recompute();
        EditReport {
            line,
            allocation,
            issues,
            totals,
        }
    }

    fn execution_line_mut(&mut self, id: LineId) -> Result<&mut ExecutionLine, LedgerError> {
        self.record
            .execution_line_mut(id)
            .ok_or(LedgerError::LineNotFound(id))
    }

    fn commission_line_mut(&mut self, id: LineId) -> Result<&mut CommissionLine, LedgerError> {
        self.record
            .commission_line_mut(id)
            .ok_or(LedgerError::LineNotFound(id))
    }

    // ── Execution lines ──

    pub fn add_execution_line(&mut self) -> LineId {
        let line = ExecutionLine::new();
        let id = line.id;
        self.record.execution_lines.push(line);
        self.recompute();
        id
    }

    pub fn remove_execution_line(&mut self, id: LineId) -> Result<EditReport, LedgerError> {
        let index = self
            .record
            .execution_lines
            .iter()
            .position(|l| l.id == id)
            .ok_or(LedgerError::LineNotFound(id))?;
        self.record.execution_lines.remove(index);
        self.sequencer.forget(id);
        Ok(self.finish(None, None, Vec::new()))
    }

    /// Assign, change or clear the invoice key of a line.
    ///
    /// Assigning returns a pending lookup of the invoice total plus an
    /// allocation check against the new key. Nothing is released on the old
    /// key: its committed totals are always recomputed from stored data.
    pub fn set_reference_key(
        &mut self,
        id: LineId,
        key: Option<InvoiceKey>,
    ) -> Result<EditStep, LedgerError> {
        let Some(key) = key else {
            return self.clear_reference_key(id).map(EditStep::Done);
        };

        let record = self.record.name.clone();
        let line = self.execution_line_mut(id)?;
        line.reference_key = Some(key.clone());
        line.actual_value_overridden = false;

        let reference_seq = self.sequencer.issue(id, EditChannel::Reference);
        let allocation_seq = self.sequencer.issue(id, EditChannel::Allocation);
        debug!(line = %id, key = %key, "Reference key assigned");
        Ok(EditStep::Pending(PendingEdit::ReferenceLookup {
            line: id,
            key,
            record,
            reference_seq,
            allocation_seq,
        }))
    }

    /// Drop the key: base amount and actual value go to zero and the
    /// cumulative tracks only the line's own percentage.
    pub fn clear_reference_key(&mut self, id: LineId) -> Result<EditReport, LedgerError> {
        let line = self.execution_line_mut(id)?;
        line.reference_key = None;
        line.base_amount = Decimal::ZERO;
        apply_line_formula(line);
        track_locally(line);
        let local = AllocationDecision::local(line.execution_percentage);

        self.sequencer.issue(id, EditChannel::Reference);
        self.sequencer.issue(id, EditChannel::Allocation);
        Ok(self.finish(Some(id), Some(local), Vec::new()))
    }

    /// Change a line's execution percentage.
    ///
    /// Unkeyed lines complete immediately. Keyed lines are recomputed locally
    /// and return a pending allocation check. Negative input is refused and
    /// leaves the line unchanged.
    pub fn set_execution_percentage(
        &mut self,
        id: LineId,
        percentage: Decimal,
    ) -> Result<EditStep, LedgerError> {
        let record = self.record.name.clone();
        let line = self.execution_line_mut(id)?;
        if percentage < Decimal::ZERO {
            return Err(LedgerError::NegativePercentage {
                line: id,
                value: percentage,
            });
        }
        line.execution_percentage = percentage;
        apply_line_formula(line);

        let Some(key) = line.reference_key.clone() else {
            track_locally(line);
            let local = AllocationDecision::local(percentage);
            self.sequencer.issue(id, EditChannel::Allocation);
            return Ok(EditStep::Done(self.finish(Some(id), Some(local), Vec::new())));
        };

        let seq = self.sequencer.issue(id, EditChannel::Allocation);
        self.recompute();
        Ok(EditStep::Pending(PendingEdit::AllocationCheck {
            line: id,
            key,
            record,
            seq,
        }))
    }

    /// Manual edit of the denormalized invoice total.
    ///
    /// Supersedes any invoice-total lookup still in flight for the line.
    /// Keyed lines return a pending allocation check, like a percentage edit.
    pub fn set_base_amount(&mut self, id: LineId, amount: Decimal) -> Result<EditStep, LedgerError> {
        let record = self.record.name.clone();
        let line = self.execution_line_mut(id)?;
        line.base_amount = amount;
        apply_line_formula(line);
        let key = line.reference_key.clone();
        self.sequencer.issue(id, EditChannel::Reference);

        let Some(key) = key else {
            return Ok(EditStep::Done(self.finish(Some(id), None, Vec::new())));
        };
        let seq = self.sequencer.issue(id, EditChannel::Allocation);
        self.recompute();
        Ok(EditStep::Pending(PendingEdit::AllocationCheck {
            line: id,
            key,
            record,
            seq,
        }))
    }

    /// Direct override of the derived actual value.
    ///
    /// Kept until the next formula trigger on the line.
    pub fn override_actual_value(
        &mut self,
        id: LineId,
        value: Decimal,
    ) -> Result<EditReport, LedgerError> {
        let line = self.execution_line_mut(id)?;
        line.actual_value = value;
        line.actual_value_overridden = true;
        info!(line = %id, value = %value, "Actual value overridden");
        Ok(self.finish(Some(id), None, Vec::new()))
    }

    /// Assign or clear the sales person credited with a line.
    ///
    /// Clearing drops the line's sales person commission to zero. The rate is
    /// not fetched here; finalize fills a commission left at zero.
    pub fn set_sales_person(
        &mut self,
        id: LineId,
        sales_person: Option<SalesPersonId>,
    ) -> Result<EditReport, LedgerError> {
        let line = self.execution_line_mut(id)?;
        if sales_person.is_none() {
            line.sales_person_commission = Decimal::ZERO;
        }
        line.sales_person = sales_person;
        Ok(self.finish(Some(id), None, Vec::new()))
    }

    pub fn set_sales_person_commission(
        &mut self,
        id: LineId,
        percentage: Decimal,
    ) -> Result<EditReport, LedgerError> {
        let line = self.execution_line_mut(id)?;
        line.sales_person_commission = percentage;
        Ok(self.finish(Some(id), None, Vec::new()))
    }

    // ── Commission lines ──

    pub fn add_commission_line(&mut self) -> LineId {
        let line = CommissionLine::new();
        let id = line.id;
        self.record.commission_lines.push(line);
        self.recompute();
        id
    }

    pub fn remove_commission_line(&mut self, id: LineId) -> Result<EditReport, LedgerError> {
        let index = self
            .record
            .commission_lines
            .iter()
            .position(|l| l.id == id)
            .ok_or(LedgerError::LineNotFound(id))?;
        self.record.commission_lines.remove(index);
        self.sequencer.forget(id);
        Ok(self.finish(None, None, Vec::new()))
    }

    /// Assign or clear a shareholder. Assigning fetches the default percentage.
    pub fn set_shareholder(
        &mut self,
        id: LineId,
        shareholder: Option<ShareholderId>,
    ) -> Result<EditStep, LedgerError> {
        let Some(shareholder) = shareholder else {
            return self.clear_shareholder(id).map(EditStep::Done);
        };

        let line = self.commission_line_mut(id)?;
        line.shareholder = Some(shareholder.clone());
        let seq = self.sequencer.issue(id, EditChannel::Shareholder);
        Ok(EditStep::Pending(PendingEdit::ShareholderLookup {
            line: id,
            shareholder,
            seq,
        }))
    }

    /// Remove the shareholder; the line's percentage and amount drop to zero.
    pub fn clear_shareholder(&mut self, id: LineId) -> Result<EditReport, LedgerError> {
        let line = self.commission_line_mut(id)?;
        line.shareholder = None;
        line.commission_percentage = Decimal::ZERO;
        line.commission_amount = Decimal::ZERO;
        self.sequencer.issue(id, EditChannel::Shareholder);
        Ok(self.finish(Some(id), None, Vec::new()))
    }

    /// Manual commission percentage; wins over a default still being fetched.
    pub fn set_commission_percentage(
        &mut self,
        id: LineId,
        percentage: Decimal,
    ) -> Result<EditReport, LedgerError> {
        let line = self.commission_line_mut(id)?;
        line.commission_percentage = percentage;
        self.sequencer.issue(id, EditChannel::Shareholder);
        Ok(self.finish(Some(id), None, Vec::new()))
    }

    // ── Resolution ──

    /// Fold a resolved lookup back into the record.
    pub fn apply(&mut self, resolved: ResolvedEdit) -> EditOutcome {
        match resolved {
            ResolvedEdit::Reference {
                line,
                key,
                reference_seq,
                allocation_seq,
                base_amount,
                prior_total,
                issues,
            } => {
                let reference_current = self
                    .sequencer
                    .is_current(line, EditChannel::Reference, reference_seq);
                let allocation_current = self
                    .sequencer
                    .is_current(line, EditChannel::Allocation, allocation_seq);
                if !(reference_current || allocation_current) || !self.line_has_key(line, &key) {
                    return superseded(line);
                }

                if reference_current {
                    if let Some(l) = self.record.execution_line_mut(line) {
                        l.base_amount = base_amount;
                        if !l.actual_value_overridden {
                            apply_line_formula(l);
                        }
                    }
                }
                let allocation = if allocation_current {
                    self.apply_allocation(line, &key, prior_total)
                } else {
                    None
                };
                EditOutcome::Applied(self.finish(Some(line), allocation, issues))
            }
            ResolvedEdit::Allocation {
                line,
                key,
                seq,
                prior_total,
                issues,
            } => {
                if !self.sequencer.is_current(line, EditChannel::Allocation, seq)
                    || !self.line_has_key(line, &key)
                {
                    return superseded(line);
                }
                let allocation = self.apply_allocation(line, &key, prior_total);
                EditOutcome::Applied(self.finish(Some(line), allocation, issues))
            }
            ResolvedEdit::Shareholder {
                line,
                shareholder,
                seq,
                default_percentage,
                issues,
            } => {
                if !self.sequencer.is_current(line, EditChannel::Shareholder, seq) {
                    return superseded(line);
                }
                match self.record.commission_line_mut(line) {
                    Some(l) if l.shareholder.as_ref() == Some(&shareholder) => {
                        l.commission_percentage = default_percentage;
                    }
                    _ => return superseded(line),
                }
                EditOutcome::Applied(self.finish(Some(line), None, issues))
            }
        }
    }

    /// Resolve and apply a step back to back.
    pub async fn settle(&mut self, step: EditStep, services: Collaborators<'_>) -> EditOutcome {
        match step {
            EditStep::Done(report) => EditOutcome::Applied(report),
            EditStep::Pending(pending) => {
                let resolved = pending.resolve(services).await;
                self.apply(resolved)
            }
        }
    }

    pub async fn assign_reference_key(
        &mut self,
        id: LineId,
        key: Option<InvoiceKey>,
        services: Collaborators<'_>,
    ) -> Result<EditOutcome, LedgerError> {
        let step = self.set_reference_key(id, key)?;
        Ok(self.settle(step, services).await)
    }

    pub async fn edit_execution_percentage(
        &mut self,
        id: LineId,
        percentage: Decimal,
        services: Collaborators<'_>,
    ) -> Result<EditOutcome, LedgerError> {
        let step = self.set_execution_percentage(id, percentage)?;
        Ok(self.settle(step, services).await)
    }

    pub async fn assign_shareholder(
        &mut self,
        id: LineId,
        shareholder: Option<ShareholderId>,
        services: Collaborators<'_>,
    ) -> Result<EditOutcome, LedgerError> {
        let step = self.set_shareholder(id, shareholder)?;
        Ok(self.settle(step, services).await)
    }

    fn line_has_key(&self, id: LineId, key: &InvoiceKey) -> bool {
        self.record
            .execution_line(id)
            .is_some_and(|l| l.has_key(key))
    }

    fn apply_allocation(
        &mut self,
        id: LineId,
        key: &InvoiceKey,
        prior_total: Decimal,
    ) -> Option<AllocationDecision> {
        let same_doc_total = same_record_total(&self.record.execution_lines, key, id);
        let ceiling = self.config.allocation_ceiling;
        let line = self.record.execution_line_mut(id)?;

        let context = AllocationContext {
            prior_total,
            same_doc_total,
        };
        let decision = decide(key, context, line.execution_percentage, ceiling);
        if !decision.is_accepted() {
            line.execution_percentage = decision.accepted_percentage;
            apply_line_formula(line);
        }
        line.cumulative_execution = decision.cumulative;
        line.delivery_status = delivery_status(decision.cumulative);
        Some(decision)
    }
}

fn track_locally(line: &mut ExecutionLine) {
    line.cumulative_execution = line.execution_percentage;
    line.delivery_status = delivery_status(line.execution_percentage);
}

fn superseded(line: LineId) -> EditOutcome {
    warn!(line = %line, "Discarding superseded lookup result");
    EditOutcome::Superseded { line }
}
