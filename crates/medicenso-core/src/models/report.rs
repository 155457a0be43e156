//! Census report model

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A typed value recorded under a field id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Whether this value counts as "nothing entered".
    ///
    /// Forms seed numeric inputs with an empty string, so blank text is
    /// treated as absent. Numbers and booleans always count as entered.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Numeric view of the value, parsing numeric text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// A field census report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Canonical unique identifier
    pub id: String,
    /// Free-text location label (e.g. "Block 4")
    pub location: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Time the last update was applied remotely or locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Free-text notes
    #[serde(default)]
    pub notes: String,
    /// Field id to recorded value
    #[serde(default)]
    pub data: BTreeMap<String, FieldValue>,
    /// Owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Report {
    /// Look up a value by field id. Missing ids are simply absent.
    pub fn value(&self, field_id: &str) -> Option<&FieldValue> {
        self.data.get(field_id)
    }

    /// Whether a non-blank value is recorded under `field_id`.
    pub fn has_value(&self, field_id: &str) -> bool {
        self.value(field_id).is_some_and(|value| !value.is_blank())
    }

    /// Rewrite payload keys through the identifier migration map.
    ///
    /// Returns `true` when any key changed.
    pub fn canonicalize_keys(&mut self) -> bool {
        let (data, changed) = ids::canonicalize_data(std::mem::take(&mut self.data));
        self.data = data;
        changed
    }
}

/// Input for creating a new report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub data: BTreeMap<String, FieldValue>,
}

impl ReportDraft {
    /// Create a draft for the given location
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Attach notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Record a value under a field id
    #[must_use]
    pub fn with_value(mut self, field_id: impl Into<String>, value: FieldValue) -> Self {
        self.data.insert(field_id.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_report() -> Report {
        Report {
            id: ids::mint_id(),
            location: "Block 4".to_string(),
            timestamp: Utc::now(),
            last_modified: None,
            notes: String::new(),
            data: BTreeMap::new(),
            user_id: Some("user-1".to_string()),
        }
    }

    #[test]
    fn field_values_deserialize_by_shape() {
        let values: Vec<FieldValue> = serde_json::from_str(r#"[5, "five", true]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Number(5.0),
                FieldValue::Text("five".to_string()),
                FieldValue::Bool(true),
            ]
        );
    }

    #[test]
    fn blank_text_counts_as_absent() {
        assert!(FieldValue::Text("  ".to_string()).is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
    }

    #[test]
    fn numeric_text_is_readable_as_number() {
        assert_eq!(FieldValue::Text(" 7 ".to_string()).as_number(), Some(7.0));
        assert_eq!(FieldValue::Bool(true).as_number(), None);
    }

    #[test]
    fn missing_field_reads_as_absent() {
        let report = sample_report();
        assert_eq!(report.value("deleted-field"), None);
        assert!(!report.has_value("deleted-field"));
    }

    #[test]
    fn legacy_blob_shape_deserializes() {
        let raw = r#"{
            "id": "0b7a5a2e-6f43-4c38-9d55-4c3c7c1f8d10",
            "location": "Edificio 30",
            "timestamp": "2024-05-01T10:00:00.000Z",
            "notes": "",
            "data": { "total_pop": 4, "sick": "" }
        }"#;
        let report: Report = serde_json::from_str(raw).unwrap();
        assert_eq!(report.location, "Edificio 30");
        assert_eq!(report.user_id, None);
        assert_eq!(report.data.len(), 2);
    }

    #[test]
    fn canonicalize_keys_rewrites_payload() {
        let mut report = sample_report();
        report
            .data
            .insert("total_pop".to_string(), FieldValue::Number(9.0));
        assert!(report.canonicalize_keys());
        assert!(report.has_value(ids::TOTAL_POPULATION_FIELD_ID));
        assert!(!report.canonicalize_keys());
    }

    #[test]
    fn draft_builder_collects_values() {
        let draft = ReportDraft::new("Block 4")
            .with_notes("two dogs")
            .with_value("houses", FieldValue::Number(5.0));
        assert_eq!(draft.location, "Block 4");
        assert_eq!(draft.notes, "two dogs");
        assert_eq!(draft.data.get("houses"), Some(&FieldValue::Number(5.0)));
    }
}
