//! Market-data access port.
//!
//! A [`MarketDataConnector`] opens a [`MarketDataPort`] session for one
//! selection cycle. The session is released exactly once when the cycle
//! ends, whether it succeeded or failed.

use crate::domain::error::SelectorError;
use crate::domain::ohlcv::OhlcvBar;
use std::collections::HashMap;

/// Bars per symbol, ascending time order.
pub type BarsBySymbol = HashMap<String, Vec<OhlcvBar>>;

pub trait MarketDataPort {
    /// Daily bars covering at least the trailing `window_days` sessions.
    /// Symbols with no data are absent from the returned map.
    fn fetch_daily_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError>;

    /// 5-minute bars covering the trailing `window_days` sessions.
    fn fetch_intraday_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError>;

    /// Give back whatever the session holds (connections, handles).
    fn release(&mut self) {}
}

pub trait MarketDataConnector {
    fn connect(&self) -> Result<Box<dyn MarketDataPort + '_>, SelectorError>;
}

/// Scoped session: calls [`MarketDataPort::release`] on drop.
pub struct MarketDataSession<'a> {
    port: Box<dyn MarketDataPort + 'a>,
}

impl<'a> MarketDataSession<'a> {
    pub fn open(connector: &'a dyn MarketDataConnector) -> Result<Self, SelectorError> {
        Ok(Self {
            port: connector.connect()?,
        })
    }

    pub fn port(&self) -> &dyn MarketDataPort {
        self.port.as_ref()
    }
}

impl Drop for MarketDataSession<'_> {
    fn drop(&mut self) {
        self.port.release();
        tracing::debug!("market data session released");
    }
}
