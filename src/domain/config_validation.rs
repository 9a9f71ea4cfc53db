//! Configuration validation.
//!
//! Range checks on every section that feeds a selection cycle, run before
//! any market data is touched.

use crate::domain::error::SelectorError;
use crate::domain::metrics::{ExtensionMetric, MAX_SESSION_MINUTES};
use crate::domain::scoring::EXTENSION_PREFIX;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveTime;

pub fn validate_selection_config(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    validate_data_source(config)?;
    validate_metrics(config)?;
    validate_thresholds(config)?;
    validate_weights(config)?;
    validate_universe(config)?;
    Ok(())
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "sqlite".to_string());
    match source.trim() {
        "sqlite" | "csv" => Ok(()),
        other => Err(SelectorError::invalid(
            "data",
            "source",
            format!("unknown source '{other}', expected sqlite or csv"),
        )),
    }
}

/// `HH:MM` or `HH:MM:SS`.
pub fn parse_session_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Reads a float, rejecting `nan` and `inf`.
fn finite_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SelectorError> {
    let value = config.get_double(section, key, default);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SelectorError::invalid(
            section,
            key,
            format!("{key} must be a finite number"),
        ))
    }
}

fn validate_metrics(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    if finite_double(config, "metrics", "target_atr_pct", 0.03)? <= 0.0 {
        return Err(SelectorError::invalid(
            "metrics",
            "target_atr_pct",
            "target_atr_pct must be positive",
        ));
    }
    if finite_double(config, "metrics", "atr_tolerance", 0.02)? <= 0.0 {
        return Err(SelectorError::invalid(
            "metrics",
            "atr_tolerance",
            "atr_tolerance must be positive",
        ));
    }
    if config.get_int("metrics", "ranking_pool_size", 200) < 1 {
        return Err(SelectorError::invalid(
            "metrics",
            "ranking_pool_size",
            "ranking_pool_size must be at least 1",
        ));
    }
    if config.get_int("metrics", "close_volume_window_days", 20) < 1 {
        return Err(SelectorError::invalid(
            "metrics",
            "close_volume_window_days",
            "close_volume_window_days must be at least 1",
        ));
    }
    for key in ["close_window_minutes", "opening_range_minutes"] {
        validate_session_minutes(key, config.get_int("metrics", key, 5))?;
    }
    if let Some(close) = config.get_string("metrics", "session_close") {
        if parse_session_time(&close).is_none() {
            return Err(SelectorError::invalid(
                "metrics",
                "session_close",
                "invalid session_close, expected HH:MM",
            ));
        }
    }
    Ok(())
}

/// Intraday windows must fit inside one day: `1..=MAX_SESSION_MINUTES`.
pub fn validate_session_minutes(key: &str, minutes: i64) -> Result<(), SelectorError> {
    if (1..=MAX_SESSION_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(SelectorError::invalid(
            "metrics",
            key,
            format!("{key} must be between 1 and {MAX_SESSION_MINUTES}"),
        ))
    }
}

fn validate_thresholds(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    for key in [
        "adv_min",
        "price_min",
        "price_max",
        "atr_pct_min",
        "atr_pct_max",
        "zero_volume_ratio_max",
    ] {
        if finite_double(config, "thresholds", key, 0.0)? < 0.0 {
            return Err(SelectorError::invalid(
                "thresholds",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }

    let price_min = config.get_double("thresholds", "price_min", 1.0);
    let price_max = config.get_double("thresholds", "price_max", 1_000_000.0);
    if price_min > price_max {
        return Err(SelectorError::invalid(
            "thresholds",
            "price_min",
            "price_min must not exceed price_max",
        ));
    }

    let atr_min = config.get_double("thresholds", "atr_pct_min", 0.005);
    let atr_max = config.get_double("thresholds", "atr_pct_max", 0.10);
    if atr_min > atr_max {
        return Err(SelectorError::invalid(
            "thresholds",
            "atr_pct_min",
            "atr_pct_min must not exceed atr_pct_max",
        ));
    }
    Ok(())
}

fn validate_weights(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    let base = ["liquidity", "volatility", "cost", "close_liquidity", "zero_volume"];
    let extensions = ExtensionMetric::ALL.map(|ext| format!("{EXTENSION_PREFIX}{}", ext.name()));
    let keys = base
        .iter()
        .map(|k| k.to_string())
        .chain(extensions);

    for key in keys {
        if finite_double(config, "weights", &key, 0.0)? < 0.0 {
            return Err(SelectorError::invalid(
                "weights",
                &key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), SelectorError> {
    if config.get_int("universe", "core_size", 20) < 1 {
        return Err(SelectorError::invalid(
            "universe",
            "core_size",
            "core_size must be at least 1",
        ));
    }
    for key in ["bench_size", "maintain_rank_max", "add_rank_max"] {
        if config.get_int("universe", key, 0) < 0 {
            return Err(SelectorError::invalid(
                "universe",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    let ratio = finite_double(config, "universe", "sector_max_ratio", 0.3)?;
    if ratio <= 0.0 || ratio > 1.0 {
        return Err(SelectorError::invalid(
            "universe",
            "sector_max_ratio",
            "sector_max_ratio must be in (0, 1]",
        ));
    }
    Ok(())
}
