use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] medicenso_core::Error),
    #[error(transparent)]
    Remote(#[from] medicenso_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Location cannot be empty")]
    EmptyLocation,
    #[error("Report ID cannot be empty")]
    EmptyReportId,
    #[error("Report not found for id/prefix: {0}")]
    ReportNotFound(String),
    #[error("{0}")]
    AmbiguousReportId(String),
    #[error("Field not found: {0}")]
    FieldNotFound(String),
    #[error("Field {0} holds values in existing reports; pass --force to remove it anyway")]
    FieldInUse(String),
    #[error("Invalid field assignment '{0}': {1}")]
    InvalidAssignment(String, String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No census user configured. Run `medicenso config init --user-id <ID>` or set MEDICENSO_USER_ID."
    )]
    NotAuthenticated,
}
