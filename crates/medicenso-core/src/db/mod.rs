//! Database layer for MediCenso

mod connection;
mod kv_repository;
mod migrations;

pub use connection::Database;
pub use kv_repository::{KeyValueRepository, LibSqlKeyValueRepository};
