pub mod add;
pub mod common;
pub mod config;
pub mod delete;
pub mod edit;
pub mod fields;
pub mod list;
pub mod migrate;
pub mod show;
pub mod status;
pub mod summary;
pub mod sync;
pub mod watch;
