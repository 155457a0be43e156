//! Pending sync operation model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FieldDefinition, Report, UserId};
use crate::ids;

/// Kind of mutation awaiting remote confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// Remote collection targeted by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Reports,
    FieldDefinitions,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reports => f.write_str("reports"),
            Self::FieldDefinitions => f.write_str("field_definitions"),
        }
    }
}

/// Data carried by a pending operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OperationPayload {
    /// Full report for creates and updates
    Report(Report),
    /// Reduced payload for deletes
    ReportRef { id: String },
    /// Complete field set replacing the owner's remote set
    FieldSet {
        user_id: String,
        fields: Vec<FieldDefinition>,
    },
}

/// A mutation applied locally and not yet confirmed by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Queue entry id (not the record id)
    pub id: Uuid,
    pub kind: OperationKind,
    pub collection: Collection,
    pub payload: OperationPayload,
    pub created_at: DateTime<Utc>,
}

impl PendingOperation {
    fn new(kind: OperationKind, collection: Collection, payload: OperationPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            collection,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Queue a remote insert of `report`
    #[must_use]
    pub fn create_report(report: Report) -> Self {
        Self::new(
            OperationKind::Create,
            Collection::Reports,
            OperationPayload::Report(report),
        )
    }

    /// Queue a remote update of `report`
    #[must_use]
    pub fn update_report(report: Report) -> Self {
        Self::new(
            OperationKind::Update,
            Collection::Reports,
            OperationPayload::Report(report),
        )
    }

    /// Queue a remote delete of the report with `id`
    #[must_use]
    pub fn delete_report(id: impl Into<String>) -> Self {
        Self::new(
            OperationKind::Delete,
            Collection::Reports,
            OperationPayload::ReportRef { id: id.into() },
        )
    }

    /// Queue a full replace of the owner's field definitions
    #[must_use]
    pub fn replace_fields(user_id: &UserId, fields: Vec<FieldDefinition>) -> Self {
        Self::new(
            OperationKind::Update,
            Collection::FieldDefinitions,
            OperationPayload::FieldSet {
                user_id: user_id.as_str().to_string(),
                fields,
            },
        )
    }

    /// Identifier of the record this operation targets, for report operations.
    pub fn target_id(&self) -> Option<&str> {
        match &self.payload {
            OperationPayload::Report(report) => Some(&report.id),
            OperationPayload::ReportRef { id } => Some(id),
            OperationPayload::FieldSet { .. } => None,
        }
    }

    /// Check whether this operation can ever succeed remotely.
    ///
    /// Returns the reason when it cannot.
    pub fn unrecoverable_reason(&self) -> Option<String> {
        if let Some(target) = self.target_id() {
            if !ids::is_canonical(target) {
                return Some(format!("target id '{target}' is not a canonical identifier"));
            }
        }

        match (&self.kind, &self.payload) {
            (OperationKind::Create, OperationPayload::Report(report))
                if report.user_id.as_deref().is_none_or(|user| user.trim().is_empty()) =>
            {
                Some(format!("report {} has no owner", report.id))
            }
            (_, OperationPayload::FieldSet { user_id, .. }) if user_id.trim().is_empty() => {
                Some("field set has no owner".to_string())
            }
            (OperationKind::Create | OperationKind::Update, OperationPayload::ReportRef { id }) => {
                Some(format!("{} of report {id} carries no report data", self.kind_name()))
            }
            _ => None,
        }
    }

    const fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Short human-readable description for logs and status output
    pub fn describe(&self) -> String {
        let kind = self.kind_name();
        match &self.payload {
            OperationPayload::Report(report) => format!("{kind} report {}", report.id),
            OperationPayload::ReportRef { id } => format!("{kind} report {id}"),
            OperationPayload::FieldSet { fields, .. } => {
                format!("replace {} field definitions", fields.len())
            }
        }
    }
}

/// An operation removed from the queue because it can never succeed remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedOperation {
    pub operation: PendingOperation,
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}
