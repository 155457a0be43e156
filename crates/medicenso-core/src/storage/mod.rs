//! Durable on-device storage.
//!
//! Everything lives in one key-value database under fixed keys. The local
//! store and the pending queue share a single [`DeviceStorage`] handle so
//! multi-key updates can be made under one lock.

mod device;
mod local;

pub use device::{DeviceStorage, StorageGuard};
pub use local::{LocalStore, FIELDS_KEY, LEGACY_FIELDS_KEY, LEGACY_REPORTS_KEY, REPORTS_KEY};

pub(crate) use local::canonicalize_fields;
