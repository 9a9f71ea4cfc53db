//! SQLite adapter: bar storage, symbol directory and selection history.
//!
//! A market-data session checks one connection out of the pool and hands it
//! back on release.

use crate::domain::error::SelectorError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::service::UniverseSelectionResult;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::{BarsBySymbol, MarketDataConnector, MarketDataPort};
use crate::ports::selection_store_port::SelectionStore;
use crate::ports::symbol_directory_port::SymbolDirectory;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS daily_bars (
        symbol TEXT NOT NULL,
        market TEXT NOT NULL,
        ts TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        PRIMARY KEY (symbol, market, ts)
    );
    CREATE TABLE IF NOT EXISTS intraday_bars (
        symbol TEXT NOT NULL,
        market TEXT NOT NULL,
        ts TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        PRIMARY KEY (symbol, market, ts)
    );
    CREATE TABLE IF NOT EXISTS symbols (
        symbol TEXT NOT NULL,
        market TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (symbol, market)
    );
    CREATE TABLE IF NOT EXISTS universe_core (
        market TEXT NOT NULL,
        as_of TEXT NOT NULL,
        rank INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        PRIMARY KEY (market, as_of, rank)
    );
    CREATE TABLE IF NOT EXISTS universe_snapshot (
        market TEXT NOT NULL,
        as_of TEXT NOT NULL,
        symbol TEXT NOT NULL,
        rank INTEGER NOT NULL,
        membership TEXT NOT NULL,
        total REAL NOT NULL,
        latest_close REAL,
        adv_value REAL,
        atr_pct REAL,
        median_intraday_range_bps REAL,
        close_volume_share REAL,
        no_trade_ratio REAL,
        efficiency_ratio REAL,
        orb_follow_through REAL,
        vwap_persistence REAL,
        PRIMARY KEY (market, as_of, symbol)
    );
    CREATE TABLE IF NOT EXISTS universe_snapshot_component (
        market TEXT NOT NULL,
        as_of TEXT NOT NULL,
        symbol TEXT NOT NULL,
        component TEXT NOT NULL,
        value REAL NOT NULL,
        PRIMARY KEY (market, as_of, symbol, component)
    );
    CREATE INDEX IF NOT EXISTS idx_universe_core_market ON universe_core(market, as_of);";

fn pool_err(e: r2d2::Error) -> SelectorError {
    SelectorError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SelectorError {
    SelectorError::DatabaseQuery {
        reason: e.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BarTable {
    Daily,
    Intraday,
}

impl BarTable {
    fn name(self) -> &'static str {
        match self {
            BarTable::Daily => "daily_bars",
            BarTable::Intraday => "intraday_bars",
        }
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    market: String,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort, market: &str) -> Result<Self, SelectorError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SelectorError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self {
            pool,
            market: market.to_string(),
        })
    }

    pub fn in_memory(market: &str) -> Result<Self, SelectorError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self {
            pool,
            market: market.to_string(),
        })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SelectorError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), SelectorError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_bars(&self, table: BarTable, bars: &[OhlcvBar]) -> Result<(), SelectorError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let sql = format!(
            "INSERT OR REPLACE INTO {} (symbol, market, ts, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            table.name()
        );
        for bar in bars {
            tx.execute(
                &sql,
                params![
                    bar.symbol,
                    self.market,
                    bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_symbols(&self, symbols: &[&str], active: bool) -> Result<(), SelectorError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for symbol in symbols {
            tx.execute(
                "INSERT OR REPLACE INTO symbols (symbol, market, active) VALUES (?1, ?2, ?3)",
                params![symbol, self.market, active],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    fn active_symbols(&self, market: &str) -> Result<Vec<String>, SelectorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol FROM symbols WHERE market = ?1 AND active = 1 ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![market], |row| row.get(0))
            .map_err(query_err)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_err)?);
        }
        Ok(symbols)
    }
}

/// Bars of the trailing `window_days` distinct dates, per symbol.
fn fetch_bars(
    conn: &Connection,
    table: BarTable,
    market: &str,
    symbols: &[String],
    window_days: usize,
) -> Result<BarsBySymbol, SelectorError> {
    let query = format!(
        "SELECT symbol, ts, open, high, low, close, volume
         FROM {t}
         WHERE symbol = ?1 AND market = ?2
           AND substr(ts, 1, 10) >= (
               SELECT MIN(d) FROM (
                   SELECT DISTINCT substr(ts, 1, 10) AS d FROM {t}
                   WHERE symbol = ?1 AND market = ?2
                   ORDER BY d DESC LIMIT ?3))
         ORDER BY ts ASC",
        t = table.name()
    );
    let mut stmt = conn.prepare(&query).map_err(query_err)?;
    let limit = i64::try_from(window_days).unwrap_or(i64::MAX);

    let mut out = BarsBySymbol::new();
    for symbol in symbols {
        let rows = stmt
            .query_map(params![symbol, market, limit], |row| {
                let ts: String = row.get(1)?;
                let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).map_err(
                    |e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            ts.len(),
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    },
                )?;
                Ok(OhlcvBar {
                    symbol: row.get(0)?,
                    timestamp,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            })
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }
        if !bars.is_empty() {
            out.insert(symbol.clone(), bars);
        }
    }
    Ok(out)
}

/// Market-data session holding one pooled connection.
pub struct SqliteSession<'a> {
    conn: Option<PooledConnection<SqliteConnectionManager>>,
    market: &'a str,
}

impl SqliteSession<'_> {
    fn fetch(
        &self,
        table: BarTable,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError> {
        let conn = self.conn.as_ref().ok_or_else(|| SelectorError::Database {
            reason: "market data session already released".into(),
        })?;
        let bars = fetch_bars(conn, table, self.market, symbols, window_days)?;
        debug!(
            table = table.name(),
            requested = symbols.len(),
            returned = bars.len(),
            "bars fetched"
        );
        Ok(bars)
    }
}

impl MarketDataPort for SqliteSession<'_> {
    fn fetch_daily_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError> {
        self.fetch(BarTable::Daily, symbols, window_days)
    }

    fn fetch_intraday_bars(
        &self,
        symbols: &[String],
        window_days: usize,
    ) -> Result<BarsBySymbol, SelectorError> {
        self.fetch(BarTable::Intraday, symbols, window_days)
    }

    fn release(&mut self) {
        if self.conn.take().is_some() {
            debug!("sqlite connection returned to pool");
        }
    }
}

impl MarketDataConnector for SqliteAdapter {
    fn connect(&self) -> Result<Box<dyn MarketDataPort + '_>, SelectorError> {
        Ok(Box::new(SqliteSession {
            conn: Some(self.conn()?),
            market: &self.market,
        }))
    }
}

impl SymbolDirectory for SqliteAdapter {
    fn load_symbols(&self, market: &str) -> Vec<String> {
        match self.active_symbols(market) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(market, error = %e, "symbol directory unavailable");
                Vec::new()
            }
        }
    }
}

impl SelectionStore for SqliteAdapter {
    fn load_previous_core(&self, market: &str) -> Result<Vec<String>, SelectorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol FROM universe_core
                 WHERE market = ?1
                   AND as_of = (SELECT MAX(as_of) FROM universe_core WHERE market = ?1)
                 ORDER BY rank ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![market], |row| row.get(0))
            .map_err(query_err)?;

        let mut core = Vec::new();
        for row in rows {
            core.push(row.map_err(query_err)?);
        }
        Ok(core)
    }

    fn save_selection(
        &self,
        market: &str,
        as_of: NaiveDateTime,
        result: &UniverseSelectionResult,
    ) -> Result<(), SelectorError> {
        let as_of = as_of.format(TIMESTAMP_FORMAT).to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for table in [
            "universe_core",
            "universe_snapshot",
            "universe_snapshot_component",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE market = ?1 AND as_of = ?2"),
                params![market, as_of],
            )
            .map_err(query_err)?;
        }

        for (i, symbol) in result.core.iter().enumerate() {
            tx.execute(
                "INSERT INTO universe_core (market, as_of, rank, symbol) VALUES (?1, ?2, ?3, ?4)",
                params![market, as_of, i as i64 + 1, symbol],
            )
            .map_err(query_err)?;
        }

        for row in &result.snapshot_rows {
            let m = row.metric_values();
            tx.execute(
                "INSERT INTO universe_snapshot (
                    market, as_of, symbol, rank, membership, total,
                    latest_close, adv_value, atr_pct, median_intraday_range_bps,
                    close_volume_share, no_trade_ratio,
                    efficiency_ratio, orb_follow_through, vwap_persistence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    market,
                    as_of,
                    row.symbol,
                    row.rank as i64,
                    row.membership.as_str(),
                    row.total,
                    m[0],
                    m[1],
                    m[2],
                    m[3],
                    m[4],
                    m[5],
                    m[6],
                    m[7],
                    m[8]
                ],
            )
            .map_err(query_err)?;

            for (component, value) in &row.components {
                tx.execute(
                    "INSERT INTO universe_snapshot_component (market, as_of, symbol, component, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![market, as_of, row.symbol, component, value],
                )
                .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        info!(
            market,
            as_of = %as_of,
            core = result.core.len(),
            rows = result.snapshot_rows.len(),
            "selection persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::SymbolMetrics;
    use crate::domain::snapshot::{Membership, SnapshotRow};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn ts(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(symbol: &str, timestamp: NaiveDateTime, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.to_string(),
            timestamp,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory("ASX").unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn result(core: &[&str]) -> UniverseSelectionResult {
        let rows = core
            .iter()
            .enumerate()
            .map(|(i, s)| SnapshotRow {
                symbol: s.to_string(),
                rank: i + 1,
                membership: Membership::Core,
                metrics: SymbolMetrics {
                    symbol: s.to_string(),
                    latest_close: 10.0,
                    adv_value: 1e7,
                    atr_pct: Some(0.03),
                    median_intraday_range_bps: 12.0,
                    close_volume_share: 0.1,
                    no_trade_ratio: 0.0,
                    efficiency_ratio: None,
                    orb_follow_through: None,
                    vwap_persistence: None,
                },
                total: 1.0 - i as f64 * 0.1,
                components: vec![("liquidity".to_string(), 0.35)],
            })
            .collect::<Vec<_>>();
        UniverseSelectionResult {
            core: core.iter().map(|s| s.to_string()).collect(),
            bench: vec![],
            scores: BTreeMap::new(),
            breakdown: BTreeMap::new(),
            total_symbols: rows.len(),
            metric_symbols: rows.len(),
            filtered_symbols: rows.len(),
            snapshot_rows: rows,
            relaxed_core: vec![],
            relaxed_bench: vec![],
        }
    }

    #[test]
    fn from_config_missing_path() {
        let result = SqliteAdapter::from_config(&EmptyConfig, "ASX");
        match result {
            Err(SelectorError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn daily_fetch_keeps_trailing_sessions() {
        let adapter = adapter();
        let bars: Vec<OhlcvBar> = (1..=5).map(|d| bar("BHP", ts(d, 0, 0), d as f64)).collect();
        adapter.insert_bars(BarTable::Daily, &bars).unwrap();

        let session = adapter.connect().unwrap();
        let fetched = session
            .fetch_daily_bars(&["BHP".into(), "CBA".into()], 3)
            .unwrap();

        assert_eq!(fetched.len(), 1);
        let closes: Vec<f64> = fetched["BHP"].iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn intraday_window_counts_dates_not_bars() {
        let adapter = adapter();
        let bars = vec![
            bar("BHP", ts(2, 10, 0), 1.0),
            bar("BHP", ts(3, 10, 0), 2.0),
            bar("BHP", ts(3, 10, 5), 3.0),
            bar("BHP", ts(3, 15, 55), 4.0),
        ];
        adapter.insert_bars(BarTable::Intraday, &bars).unwrap();

        let session = adapter.connect().unwrap();
        let fetched = session.fetch_intraday_bars(&["BHP".into()], 1).unwrap();
        assert_eq!(fetched["BHP"].len(), 3);
        assert_eq!(fetched["BHP"][2].timestamp, ts(3, 15, 55));
    }

    #[test]
    fn released_session_returns_connection() {
        let adapter = adapter();
        let mut session = adapter.connect().unwrap();
        session.release();
        assert!(session.fetch_daily_bars(&["BHP".into()], 5).is_err());
        // pool of one: the connection is available again
        adapter.insert_symbols(&["BHP"], true).unwrap();
    }

    #[test]
    fn directory_lists_active_symbols_for_market() {
        let adapter = adapter();
        adapter.insert_symbols(&["CBA", "BHP"], true).unwrap();
        adapter.insert_symbols(&["OLD"], false).unwrap();

        assert_eq!(adapter.load_symbols("ASX"), vec!["BHP", "CBA"]);
        assert!(adapter.load_symbols("NYSE").is_empty());
    }

    #[test]
    fn directory_without_schema_is_empty() {
        let adapter = SqliteAdapter::in_memory("ASX").unwrap();
        assert!(adapter.load_symbols("ASX").is_empty());
    }

    #[test]
    fn previous_core_is_latest_saved() {
        let adapter = adapter();
        assert!(adapter.load_previous_core("ASX").unwrap().is_empty());

        adapter
            .save_selection("ASX", ts(1, 17, 0), &result(&["BHP", "CBA"]))
            .unwrap();
        adapter
            .save_selection("ASX", ts(2, 17, 0), &result(&["WES", "BHP", "RIO"]))
            .unwrap();

        assert_eq!(
            adapter.load_previous_core("ASX").unwrap(),
            vec!["WES", "BHP", "RIO"]
        );
        assert!(adapter.load_previous_core("NYSE").unwrap().is_empty());
    }

    #[test]
    fn saving_same_cycle_twice_replaces_rows() {
        let adapter = adapter();
        adapter
            .save_selection("ASX", ts(1, 17, 0), &result(&["BHP", "CBA"]))
            .unwrap();
        adapter
            .save_selection("ASX", ts(1, 17, 0), &result(&["RIO"]))
            .unwrap();

        assert_eq!(adapter.load_previous_core("ASX").unwrap(), vec!["RIO"]);

        let conn = adapter.conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM universe_snapshot", [], |r| r.get(0))
            .unwrap();
        let components: i64 = conn
            .query_row("SELECT COUNT(*) FROM universe_snapshot_component", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(components, 1);
    }
}
