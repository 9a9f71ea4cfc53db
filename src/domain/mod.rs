//! Core domain types and logic for universe selection.

pub mod ohlcv;
pub mod series;
pub mod metrics;
pub mod filter;
pub mod scoring;
pub mod selection;
pub mod snapshot;
pub mod service;
pub mod config_validation;
pub mod error;
