//! Port traits for the collaborators the selection core consumes.

pub mod config_port;
pub mod market_data_port;
pub mod report_port;
pub mod sector_port;
pub mod selection_store_port;
pub mod symbol_directory_port;
