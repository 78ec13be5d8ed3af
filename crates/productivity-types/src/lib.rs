//! Shared Document Types for Monthly Productivity
//!
//! This crate is the single source of truth for the shapes that cross the
//! boundary between the host document store and the allocation engine.
//!
//! ## Documents
//!
//! ```text
//! ExecutionRecord
//! ├── execution_lines[]   (invoice key, base amount, execution %, actual value,
//! │                        sales person, sales person commission %)
//! ├── commission_lines[]  (shareholder, commission %, commission amount)
//! └── totals              (total commission %, total commission amount)
//! ```
//!
//! ## Rules
//!
//! 1. Ids are newtypes, serialized transparently as plain strings
//! 2. Money and percentages are `rust_decimal::Decimal`, never `f64`
//! 3. Enums serialize as `snake_case` strings

pub mod record;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use record::*;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Unique name of an execution record (e.g. `MP-2025-03-0001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordName(pub String);

impl RecordName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a line, unique within its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference key of the invoice whose value is recognized across records.
///
/// Keys are stored trimmed; a blank key is not a key (see [`InvoiceKey::parse`]).
/// Deserialization goes through `parse` and rejects blank input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InvoiceKey(String);

impl InvoiceKey {
    /// Parse a user-entered key. Whitespace-only input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InvoiceKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom("invoice key must not be blank"))
    }
}

/// Reference to a shareholder participating in the commission waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareholderId(pub String);

impl ShareholderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ShareholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sales person credited with an execution line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesPersonId(pub String);

impl SalesPersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SalesPersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_key_parse_trims() {
        let key = InvoiceKey::parse("  SINV-0042 ").unwrap();
        assert_eq!(key.as_str(), "SINV-0042");
    }

    #[test]
    fn test_invoice_key_parse_blank_is_none() {
        assert!(InvoiceKey::parse("").is_none());
        assert!(InvoiceKey::parse("   ").is_none());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let key = InvoiceKey::parse("SINV-1").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"SINV-1\"");

        let name = RecordName::new("MP-0001");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"MP-0001\"");
    }

    #[test]
    fn test_invoice_key_deserializes_trimmed() {
        let key: InvoiceKey = serde_json::from_str("\"  SINV-7 \"").unwrap();
        assert_eq!(key.as_str(), "SINV-7");
    }

    #[test]
    fn test_blank_invoice_key_is_rejected() {
        assert!(serde_json::from_str::<InvoiceKey>("\"   \"").is_err());
        assert!(serde_json::from_str::<InvoiceKey>("\"\"").is_err());
    }
}
