//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod sector_file_adapter;
pub mod snapshot_csv_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
