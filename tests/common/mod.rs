#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
pub use uniselect::domain::ohlcv::OhlcvBar;
use uniselect::domain::error::SelectorError;
use uniselect::ports::market_data_port::{BarsBySymbol, MarketDataConnector, MarketDataPort};
use uniselect::ports::sector_port::SectorLookup;
use uniselect::ports::symbol_directory_port::SymbolDirectory;
use std::cell::Cell;
use std::collections::HashMap;

pub const DAILY_SESSIONS: usize = 30;
pub const INTRADAY_SESSIONS: usize = 5;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_hms_opt(hour, minute, 0).unwrap()
}

/// Flat bar: high/low sit `half_range` (fraction of close) either side.
pub fn make_bar(symbol: &str, timestamp: NaiveDateTime, close: f64, volume: i64, half_range: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        timestamp,
        open: close,
        high: close * (1.0 + half_range),
        low: close * (1.0 - half_range),
        close,
        volume,
    }
}

/// `sessions` flat daily bars ending 2024-03-29. ATR% is `2 × half_range`,
/// ADV is `close × volume`.
pub fn daily_bars(symbol: &str, close: f64, volume: i64, half_range: f64, sessions: usize) -> Vec<OhlcvBar> {
    let start = date(2024, 3, 29) - Duration::days(sessions as i64 - 1);
    (0..sessions)
        .map(|i| {
            let day = start + Duration::days(i as i64);
            make_bar(symbol, at(day, 0, 0), close, volume, half_range)
        })
        .collect()
}

/// Three 5-minute bars per session (15:45, 15:50, 15:55); with a 16:00
/// close and a 5-minute window the last bar is the closing bar.
pub fn intraday_bars(symbol: &str, close: f64, volume: i64, half_range: f64, sessions: usize) -> Vec<OhlcvBar> {
    let start = date(2024, 3, 29) - Duration::days(sessions as i64 - 1);
    (0..sessions)
        .flat_map(|i| {
            let day = start + Duration::days(i as i64);
            [(15, 45), (15, 50), (15, 55)]
                .into_iter()
                .map(move |(h, m)| make_bar(symbol, at(day, h, m), close, volume, half_range))
        })
        .collect()
}

/// In-memory market data that counts session releases.
pub struct MockMarketData {
    pub daily: BarsBySymbol,
    pub intraday: BarsBySymbol,
    pub daily_error: Option<String>,
    pub releases: Cell<usize>,
    pub connects: Cell<usize>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            daily: HashMap::new(),
            intraday: HashMap::new(),
            daily_error: None,
            releases: Cell::new(0),
            connects: Cell::new(0),
        }
    }

    /// Flat daily and intraday history for one symbol.
    pub fn with_symbol(mut self, symbol: &str, close: f64, volume: i64, half_range: f64) -> Self {
        self.daily.insert(
            symbol.to_string(),
            daily_bars(symbol, close, volume, half_range, DAILY_SESSIONS),
        );
        self.intraday.insert(
            symbol.to_string(),
            intraday_bars(symbol, close, volume, half_range, INTRADAY_SESSIONS),
        );
        self
    }

    pub fn with_daily(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.daily.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_intraday(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.intraday.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_daily_error(mut self, reason: &str) -> Self {
        self.daily_error = Some(reason.to_string());
        self
    }
}

fn pick(source: &BarsBySymbol, symbols: &[String]) -> BarsBySymbol {
    symbols
        .iter()
        .filter_map(|s| source.get(s).map(|bars| (s.clone(), bars.clone())))
        .collect()
}

pub struct MockSession<'a> {
    data: &'a MockMarketData,
}

impl MarketDataPort for MockSession<'_> {
    fn fetch_daily_bars(&self, symbols: &[String], _window_days: usize) -> Result<BarsBySymbol, SelectorError> {
        if let Some(reason) = &self.data.daily_error {
            return Err(SelectorError::Data {
                reason: reason.clone(),
            });
        }
        Ok(pick(&self.data.daily, symbols))
    }

    fn fetch_intraday_bars(&self, symbols: &[String], _window_days: usize) -> Result<BarsBySymbol, SelectorError> {
        Ok(pick(&self.data.intraday, symbols))
    }

    fn release(&mut self) {
        self.data.releases.set(self.data.releases.get() + 1);
    }
}

impl MarketDataConnector for MockMarketData {
    fn connect(&self) -> Result<Box<dyn MarketDataPort + '_>, SelectorError> {
        self.connects.set(self.connects.get() + 1);
        Ok(Box::new(MockSession { data: self }))
    }
}

pub struct MockDirectory {
    pub symbols: HashMap<String, Vec<String>>,
}

impl MockDirectory {
    pub fn empty() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    pub fn with_market(mut self, market: &str, symbols: &[&str]) -> Self {
        self.symbols.insert(
            market.to_string(),
            symbols.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl SymbolDirectory for MockDirectory {
    fn load_symbols(&self, market: &str) -> Vec<String> {
        self.symbols.get(market).cloned().unwrap_or_default()
    }
}

pub struct MockSectors {
    pub map: HashMap<String, String>,
}

impl MockSectors {
    pub fn none() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            map: pairs
                .iter()
                .map(|(s, sec)| (s.to_string(), sec.to_string()))
                .collect(),
        }
    }
}

impl SectorLookup for MockSectors {
    fn load_sector_map(&self, _locator: &str) -> HashMap<String, String> {
        self.map.clone()
    }
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
