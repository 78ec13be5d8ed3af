//! Execution record and its line collections.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{InvoiceKey, LineId, RecordName, SalesPersonId, ShareholderId};

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Lifecycle status of a record, owned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Draft,
    Finalized,
    Cancelled,
}

/// Delivery state of an invoice as seen from one execution line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    NotStarted,
    NotDelivered,
    Delivered,
}

impl DeliveryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started Yet",
            Self::NotDelivered => "Not Delivered",
            Self::Delivered => "Delivered",
        }
    }
}

// ============================================================================
// LINES
// ============================================================================

/// One row of recognized value against an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLine {
    pub id: LineId,

    /// Invoice being partially recognized (None until the user picks one)
    #[serde(default, deserialize_with = "deserialize_optional_key")]
    pub reference_key: Option<InvoiceKey>,

    /// Denormalized copy of the invoice total (0 when unset)
    #[serde(default)]
    pub base_amount: Decimal,

    /// Share of the invoice recognized by this line, 0-100
    #[serde(default)]
    pub execution_percentage: Decimal,

    /// base_amount * execution_percentage / 100, or a direct override
    #[serde(default)]
    pub actual_value: Decimal,

    /// True while `actual_value` holds a direct override
    #[serde(default)]
    pub actual_value_overridden: bool,

    /// Total recognized percentage for the key, this line included
    #[serde(default)]
    pub cumulative_execution: Decimal,

    #[serde(default)]
    pub delivery_status: DeliveryStatus,

    #[serde(default)]
    pub sales_person: Option<SalesPersonId>,

    /// Sales person commission percentage on `actual_value`, filled from
    /// the sales person's rate when left at 0
    #[serde(default)]
    pub sales_person_commission: Decimal,
}

/// Blank or whitespace-only keys load as `None`.
fn deserialize_optional_key<'de, D>(deserializer: D) -> Result<Option<InvoiceKey>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(InvoiceKey::parse))
}

impl ExecutionLine {
    pub fn new() -> Self {
        Self {
            id: LineId::new(),
            reference_key: None,
            base_amount: Decimal::ZERO,
            execution_percentage: Decimal::ZERO,
            actual_value: Decimal::ZERO,
            actual_value_overridden: false,
            cumulative_execution: Decimal::ZERO,
            delivery_status: DeliveryStatus::NotStarted,
            sales_person: None,
            sales_person_commission: Decimal::ZERO,
        }
    }

    pub fn with_reference_key(mut self, key: InvoiceKey) -> Self {
        self.reference_key = Some(key);
        self
    }

    pub fn with_base_amount(mut self, base_amount: Decimal) -> Self {
        self.base_amount = base_amount;
        self
    }

    pub fn with_execution_percentage(mut self, percentage: Decimal) -> Self {
        self.execution_percentage = percentage;
        self
    }

    pub fn with_sales_person(mut self, sales_person: SalesPersonId) -> Self {
        self.sales_person = Some(sales_person);
        self
    }

    pub fn has_key(&self, key: &InvoiceKey) -> bool {
        self.reference_key.as_ref() == Some(key)
    }
}

impl Default for ExecutionLine {
    fn default() -> Self {
        Self::new()
    }
}

/// One shareholder's slice of the commission waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionLine {
    pub id: LineId,

    #[serde(default)]
    pub shareholder: Option<ShareholderId>,

    /// Auto-filled from the shareholder default, manually overridable
    #[serde(default)]
    pub commission_percentage: Decimal,

    /// round(sum of actual values * commission_percentage / 100, 2)
    #[serde(default)]
    pub commission_amount: Decimal,
}

impl CommissionLine {
    pub fn new() -> Self {
        Self {
            id: LineId::new(),
            shareholder: None,
            commission_percentage: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
        }
    }

    pub fn with_shareholder(mut self, shareholder: ShareholderId) -> Self {
        self.shareholder = Some(shareholder);
        self
    }

    pub fn with_percentage(mut self, percentage: Decimal) -> Self {
        self.commission_percentage = percentage;
        self
    }
}

impl Default for CommissionLine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// A monthly productivity record: execution lines plus commission breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub name: RecordName,

    #[serde(default)]
    pub status: RecordStatus,

    /// Month being reported on (first day of month by convention)
    pub report_month: NaiveDate,

    /// Reporting scope used by the summary views
    #[serde(default)]
    pub company: Option<String>,

    #[serde(default)]
    pub execution_lines: Vec<ExecutionLine>,

    #[serde(default)]
    pub commission_lines: Vec<CommissionLine>,

    #[serde(default)]
    pub total_commission_percentage: Decimal,

    #[serde(default)]
    pub total_commission_amount: Decimal,
}

impl ExecutionRecord {
    /// Create an empty draft record.
    pub fn new(name: RecordName, report_month: NaiveDate) -> Self {
        Self {
            name,
            status: RecordStatus::Draft,
            report_month,
            company: None,
            execution_lines: Vec::new(),
            commission_lines: Vec::new(),
            total_commission_percentage: Decimal::ZERO,
            total_commission_amount: Decimal::ZERO,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.status == RecordStatus::Finalized
    }

    pub fn execution_line(&self, id: LineId) -> Option<&ExecutionLine> {
        self.execution_lines.iter().find(|l| l.id == id)
    }

    pub fn execution_line_mut(&mut self, id: LineId) -> Option<&mut ExecutionLine> {
        self.execution_lines.iter_mut().find(|l| l.id == id)
    }

    pub fn commission_line(&self, id: LineId) -> Option<&CommissionLine> {
        self.commission_lines.iter().find(|l| l.id == id)
    }

    pub fn commission_line_mut(&mut self, id: LineId) -> Option<&mut CommissionLine> {
        self.commission_lines.iter_mut().find(|l| l.id == id)
    }

    /// Execution lines carrying `key`.
    pub fn lines_for_key<'a>(
        &'a self,
        key: &'a InvoiceKey,
    ) -> impl Iterator<Item = &'a ExecutionLine> + 'a {
        self.execution_lines.iter().filter(move |l| l.has_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn test_new_record_is_empty_draft() {
        let record = ExecutionRecord::new(RecordName::new("MP-0001"), march());
        assert_eq!(record.status, RecordStatus::Draft);
        assert!(record.execution_lines.is_empty());
        assert!(record.commission_lines.is_empty());
        assert_eq!(record.total_commission_amount, Decimal::ZERO);
    }

    #[test]
    fn test_lines_for_key_filters_by_reference() {
        let key = InvoiceKey::parse("SINV-1").unwrap();
        let other = InvoiceKey::parse("SINV-2").unwrap();
        let mut record = ExecutionRecord::new(RecordName::new("MP-0001"), march());
        record
            .execution_lines
            .push(ExecutionLine::new().with_reference_key(key.clone()));
        record
            .execution_lines
            .push(ExecutionLine::new().with_reference_key(other));
        record.execution_lines.push(ExecutionLine::new());

        assert_eq!(record.lines_for_key(&key).count(), 1);
    }

    #[test]
    fn test_record_deserializes_with_missing_optional_fields() {
        let json = r#"{
            "name": "MP-0002",
            "report_month": "2025-04-01",
            "execution_lines": [
                {"id": "6f1c1f0e-2d0c-4a57-9d0b-6b1e7c6b0a11", "execution_percentage": "25"}
            ]
        }"#;
        let record: ExecutionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, RecordStatus::Draft);
        assert_eq!(record.execution_lines[0].execution_percentage, Decimal::new(25, 0));
        assert!(record.execution_lines[0].reference_key.is_none());
        assert_eq!(
            record.execution_lines[0].delivery_status,
            DeliveryStatus::NotStarted
        );
    }

    #[test]
    fn test_blank_reference_key_loads_as_none() {
        let json = r#"{
            "name": "MP-0003",
            "report_month": "2025-04-01",
            "execution_lines": [
                {"id": "6f1c1f0e-2d0c-4a57-9d0b-6b1e7c6b0a12", "reference_key": "   "},
                {"id": "6f1c1f0e-2d0c-4a57-9d0b-6b1e7c6b0a13", "reference_key": ""},
                {"id": "6f1c1f0e-2d0c-4a57-9d0b-6b1e7c6b0a14", "reference_key": null},
                {"id": "6f1c1f0e-2d0c-4a57-9d0b-6b1e7c6b0a15", "reference_key": " SINV-9 "}
            ]
        }"#;
        let record: ExecutionRecord = serde_json::from_str(json).unwrap();
        let keys: Vec<Option<&str>> = record
            .execution_lines
            .iter()
            .map(|l| l.reference_key.as_ref().map(InvoiceKey::as_str))
            .collect();
        assert_eq!(keys, [None, None, None, Some("SINV-9")]);
    }
}
