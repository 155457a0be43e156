//! medicenso-core - Core library for MediCenso
//!
//! This crate contains the census models, the device-local store, the
//! pending-operation queue and the sync engine that drains it, plus the
//! repository façade used by every MediCenso interface.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod migration;
pub mod models;
pub mod remote;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use migration::{migrate_to_supabase, MigrationReport};
pub use models::{FieldDefinition, FieldType, FieldValue, Report, ReportDraft, UserId};
pub use repository::{ReportRepository, ReportSummary};
pub use sync::{Connectivity, DrainOutcome, DrainReport, SyncState, SyncStatus};
