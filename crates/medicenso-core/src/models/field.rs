//! Field definition model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::FieldValue;
use crate::ids;

/// Value type collected by a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Number,
    Text,
    Boolean,
}

impl FieldType {
    /// Parse raw user input into a value of this type.
    pub fn parse_value(self, raw: &str) -> Option<FieldValue> {
        let raw = raw.trim();
        match self {
            Self::Number => raw.parse::<f64>().ok().map(FieldValue::Number),
            Self::Text => Some(FieldValue::Text(raw.to_string())),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "si" | "sí" => Some(FieldValue::Bool(true)),
                "0" | "false" | "no" => Some(FieldValue::Bool(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => f.write_str("number"),
            Self::Text => f.write_str("text"),
            Self::Boolean => f.write_str("boolean"),
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "text" => Ok(Self::Text),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// A configurable census form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Canonical unique identifier
    pub id: String,
    /// Display label
    pub label: String,
    /// Value type
    #[serde(rename = "type")]
    pub value_type: FieldType,
    /// Whether the field appears in new forms
    pub is_active: bool,
    /// Dense, user-controlled sort position
    pub order: i32,
}

impl FieldDefinition {
    /// Create an operator-defined field with a freshly minted id
    #[must_use]
    pub fn custom(label: impl Into<String>, value_type: FieldType, order: i32) -> Self {
        Self {
            id: ids::mint_id(),
            label: label.into(),
            value_type,
            is_active: true,
            order,
        }
    }

    fn builtin(id: &str, label: &str, is_active: bool, order: i32) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            value_type: FieldType::Number,
            is_active,
            order,
        }
    }
}

/// The field set shown to users who have never configured their own.
pub fn default_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::builtin("2b9d3e42-7c70-4a2a-b425-9c9e843e9e51", "Total de casas", true, 1),
        FieldDefinition::builtin(
            "6f9c8d32-2b1a-4d9e-8c7a-5b4a3c2d1e0f",
            "Casas Vistas/Pesquisadas",
            true,
            2,
        ),
        FieldDefinition::builtin(ids::TOTAL_POPULATION_FIELD_ID, "Total de población", true, 3),
        FieldDefinition::builtin("f1a2b3c4-d5e6-4f5a-8b7c-0d9e8f7a6b5c", "Mayores de 80", true, 4),
        FieldDefinition::builtin("e5d4c3b2-a1b0-4c9d-8e7f-6a5b4c3d2e1f", "Mayores de 60", true, 5),
        FieldDefinition::builtin("b9a8c7d6-e5f4-3d2c-1b0a-9d8c7b6a5e4d", "Embarazadas", true, 6),
        FieldDefinition::builtin(
            "d1e2f3a4-b5c6-7d8e-9f0a-1b2c3d4e5f6a",
            "Lactantes/Menores 2 años",
            true,
            7,
        ),
        FieldDefinition::builtin("c3d4e5f6-a1b2-0c9d-8e7f-6a5b4c3d2e1f", "Enfermos", true, 8),
        FieldDefinition::builtin("0f9e8d7c-6b5a-4e3d-2c1b-0a1b2c3d4e5f", "Vulnerables", false, 9),
        FieldDefinition::builtin("7a6b5c4d-3e2f-1a0b-9c8d-7e6f5a4b3c2d", "Mayores solos", false, 10),
    ]
}
