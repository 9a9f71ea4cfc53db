//! CSV file market-data adapter.
//!
//! One file per symbol and bar size under a base directory:
//! `{SYMBOL}_{MARKET}.csv` for daily bars and `{SYMBOL}_{MARKET}_5m.csv` for
//! 5-minute bars. Columns: `date` (or `datetime`), open, high, low, close,
//! volume. A missing file means the symbol has no data.

use crate::domain::error::SelectorError;
use crate::domain::ohlcv::{trailing_sessions, OhlcvBar};
use crate::ports::market_data_port::{BarsBySymbol, MarketDataConnector, MarketDataPort};
use crate::ports::symbol_directory_port::SymbolDirectory;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const INTRADAY_SUFFIX: &str = "_5m";

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(alias = "date", alias = "datetime")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub struct CsvAdapter {
    base_path: PathBuf,
    market: String,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf, market: &str) -> Self {
        Self {
            base_path,
            market: market.to_string(),
        }
    }

    fn csv_path(&self, symbol: &str, suffix: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}{}.csv", symbol, self.market, suffix))
    }

    /// `Ok(None)` when the file does not exist.
    fn read_bars(&self, symbol: &str, path: &Path) -> Result<Option<Vec<OhlcvBar>>, SelectorError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SelectorError::Data {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.deserialize::<BarRecord>() {
            let record = result.map_err(|e| SelectorError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let timestamp =
                parse_timestamp(&record.timestamp).ok_or_else(|| SelectorError::Data {
                    reason: format!(
                        "invalid timestamp '{}' in {}",
                        record.timestamp,
                        path.display()
                    ),
                })?;
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume.round() as i64,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(Some(bars))
    }

    fn fetch(
        &self,
        symbols: &[String],
        window_days: usize,
        suffix: &str,
    ) -> Result<BarsBySymbol, SelectorError> {
        let mut out = BarsBySymbol::new();
        for symbol in symbols {
            let path = self.csv_path(symbol, suffix);
            match self.read_bars(symbol, &path)? {
                Some(bars) => {
                    let window = trailing_sessions(&bars, window_days).to_vec();
                    if !window.is_empty() {
                        out.insert(symbol.clone(), window);
                    }
                }
                None => debug!(symbol = %symbol, path = %path.display(), "no CSV data"),
            }
        }
        Ok(out)
    }
}

impl MarketDataPort for CsvAdapter {
    fn fetch_daily_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError> {
        self.fetch(symbols, window_days, "")
    }

    fn fetch_intraday_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError> {
        self.fetch(symbols, window_days, INTRADAY_SUFFIX)
    }
}

impl MarketDataConnector for CsvAdapter {
    fn connect(&self) -> Result<Box<dyn MarketDataPort + '_>, SelectorError> {
        if !self.base_path.is_dir() {
            return Err(SelectorError::Data {
                reason: format!("CSV directory {} not found", self.base_path.display()),
            });
        }
        Ok(Box::new(CsvAdapter::new(self.base_path.clone(), &self.market)))
    }
}

impl SymbolDirectory for CsvAdapter {
    /// Symbols with a daily file for `market`, sorted.
    fn load_symbols(&self, market: &str) -> Vec<String> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %self.base_path.display(), error = %e, "cannot list CSV directory");
                return Vec::new();
            }
        };

        let suffix = format!("_{}.csv", market);
        let mut symbols: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(&suffix).map(str::to_string)
            })
            .filter(|s| !s.is_empty())
            .collect();

        symbols.sort();
        symbols.dedup();
        symbols
    }
}
