//! Data models for MediCenso

mod field;
mod operation;
mod report;
mod user;

pub use field::{default_fields, FieldDefinition, FieldType};
pub use operation::{Collection, OperationKind, OperationPayload, ParkedOperation, PendingOperation};
pub use report::{FieldValue, Report, ReportDraft};
pub use user::UserId;
