//! Per-symbol liquidity, volatility and trading-cost metrics.
//!
//! Two stages: daily bars for every candidate (ADV, ATR%), then 5-minute
//! bars for the most liquid `ranking_pool_size` names only (intraday range,
//! closing-volume share, zero-volume ratio). Only symbols with a complete,
//! finite set of required fields come out the other end.

use crate::domain::error::SelectorError;
use crate::domain::ohlcv::{trailing_sessions, OhlcvBar};
use crate::domain::series::{last_rolling_mean, mean, median, BarColumns};
use crate::ports::market_data_port::MarketDataPort;
use chrono::{Duration, NaiveTime};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sessions averaged for ADV (and the efficiency-ratio path).
pub const ADV_WINDOW: usize = 20;
/// Sessions averaged for ATR.
pub const ATR_PERIOD: usize = 14;
/// Fewer daily sessions than this and a symbol is dropped.
pub const MIN_DAILY_SESSIONS: usize = 20;
const MIN_DAILY_WINDOW: usize = 60;
/// Upper bound on intraday window lengths (one day).
pub const MAX_SESSION_MINUTES: i64 = 1440;
const BPS: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    pub target_atr_pct: f64,
    pub atr_tolerance: f64,
    pub ranking_pool_size: usize,
    pub close_volume_window_days: usize,
    /// Exchange-local session close.
    pub session_close: NaiveTime,
    pub close_window_minutes: i64,
    pub opening_range_minutes: i64,
    pub enable_efficiency_ratio: bool,
    pub enable_orb_follow_through: bool,
    pub enable_vwap_persistence: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            target_atr_pct: 0.03,
            atr_tolerance: 0.02,
            ranking_pool_size: 200,
            close_volume_window_days: 20,
            session_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            close_window_minutes: 5,
            opening_range_minutes: 30,
            enable_efficiency_ratio: false,
            enable_orb_follow_through: false,
            enable_vwap_persistence: false,
        }
    }
}

impl MetricConfig {
    /// Daily lookback: at least 60 sessions, never shorter than the
    /// intraday window.
    pub fn daily_window_days(&self) -> usize {
        MIN_DAILY_WINDOW.max(self.close_volume_window_days).max(30)
    }

    /// Bars starting at or after this time count as closing volume.
    /// A window reaching back past midnight starts the day.
    pub fn close_cutoff(&self) -> NaiveTime {
        let (cutoff, wrapped) = self
            .session_close
            .overflowing_sub_signed(session_minutes(self.close_window_minutes));
        if wrapped != 0 { NaiveTime::MIN } else { cutoff }
    }

    pub fn enabled_extensions(&self) -> Vec<ExtensionMetric> {
        ExtensionMetric::ALL
            .into_iter()
            .filter(|ext| match ext {
                ExtensionMetric::EfficiencyRatio => self.enable_efficiency_ratio,
                ExtensionMetric::OrbFollowThrough => self.enable_orb_follow_through,
                ExtensionMetric::VwapPersistence => self.enable_vwap_persistence,
            })
            .collect()
    }
}

/// Optional metrics computed only when switched on in [`MetricConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionMetric {
    EfficiencyRatio,
    OrbFollowThrough,
    VwapPersistence,
}

impl ExtensionMetric {
    pub const ALL: [ExtensionMetric; 3] = [
        ExtensionMetric::EfficiencyRatio,
        ExtensionMetric::OrbFollowThrough,
        ExtensionMetric::VwapPersistence,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtensionMetric::EfficiencyRatio => "efficiency_ratio",
            ExtensionMetric::OrbFollowThrough => "orb_follow_through",
            ExtensionMetric::VwapPersistence => "vwap_persistence",
        }
    }

    pub fn value(self, metrics: &SymbolMetrics) -> Option<f64> {
        match self {
            ExtensionMetric::EfficiencyRatio => metrics.efficiency_ratio,
            ExtensionMetric::OrbFollowThrough => metrics.orb_follow_through,
            ExtensionMetric::VwapPersistence => metrics.vwap_persistence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub latest_close: f64,
    pub adv_value: f64,
    pub atr_pct: Option<f64>,
    pub median_intraday_range_bps: f64,
    pub close_volume_share: f64,
    pub no_trade_ratio: f64,
    pub efficiency_ratio: Option<f64>,
    pub orb_follow_through: Option<f64>,
    pub vwap_persistence: Option<f64>,
}

/// Daily-stage output for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub latest_close: f64,
    pub adv_value: Option<f64>,
    pub atr_pct: Option<f64>,
    pub efficiency_ratio: Option<f64>,
}

/// Intraday-stage output for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntradayStats {
    pub median_range_bps: Option<f64>,
    pub close_volume_share: Option<f64>,
    pub no_trade_ratio: Option<f64>,
    pub orb_follow_through: Option<f64>,
    pub vwap_persistence: Option<f64>,
}

/// Daily metrics over ascending daily bars. `None` below
/// [`MIN_DAILY_SESSIONS`] sessions.
pub fn daily_stats(bars: &[OhlcvBar], config: &MetricConfig) -> Option<DailyStats> {
    if bars.len() < MIN_DAILY_SESSIONS {
        return None;
    }
    let cols = BarColumns::from_bars(bars);
    let latest_close = *cols.close.last()?;

    let adv_value = last_rolling_mean(&cols.traded_value(), ADV_WINDOW, ADV_WINDOW);
    let atr = last_rolling_mean(&cols.true_range(), ATR_PERIOD, ATR_PERIOD);
    let atr_pct = atr
        .filter(|_| latest_close > 0.0)
        .map(|a| a / latest_close)
        .filter(|v| v.is_finite());

    let efficiency_ratio = config
        .enable_efficiency_ratio
        .then(|| efficiency_ratio(&cols.close[cols.close.len().saturating_sub(ADV_WINDOW)..]))
        .flatten();

    Some(DailyStats {
        latest_close,
        adv_value,
        atr_pct,
        efficiency_ratio,
    })
}

/// Intraday metrics over ascending 5-minute bars.
pub fn intraday_stats(bars: &[OhlcvBar], config: &MetricConfig) -> IntradayStats {
    if bars.is_empty() {
        return IntradayStats::default();
    }

    let median_range_bps = median(
        bars.iter()
            .filter(|b| b.close > 0.0)
            .map(|b| (b.high - b.low) / b.close * BPS),
    );

    let sessions: Vec<&[OhlcvBar]> = bars.chunk_by(|a, b| a.date() == b.date()).collect();

    let cutoff = config.close_cutoff();
    let close_volume_share = mean(sessions.iter().filter_map(|session| {
        let (total, closing) = session.iter().fold((0.0, 0.0), |(t, c), b| {
            let v = b.volume as f64;
            let c = if b.timestamp.time() >= cutoff { c + v } else { c };
            (t + v, c)
        });
        (total > 0.0).then(|| closing / total)
    }));

    let zero_bars = bars.iter().filter(|b| b.volume <= 0).count();
    let no_trade_ratio = Some(zero_bars as f64 / bars.len() as f64);

    IntradayStats {
        median_range_bps,
        close_volume_share,
        no_trade_ratio,
        orb_follow_through: config
            .enable_orb_follow_through
            .then(|| orb_follow_through(&sessions, config.opening_range_minutes))
            .flatten(),
        vwap_persistence: config
            .enable_vwap_persistence
            .then(|| mean(sessions.iter().filter_map(|s| vwap_persistence(s))))
            .flatten(),
    }
}

/// Net move over path length. 0 for a flat path.
fn efficiency_ratio(closes: &[f64]) -> Option<f64> {
    let (first, last) = (closes.first()?, closes.last()?);
    let path: f64 = closes.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    let ratio = if path > 0.0 {
        (last - first).abs() / path
    } else {
        0.0
    };
    ratio.is_finite().then_some(ratio)
}

/// `minutes` clamped to `0..=MAX_SESSION_MINUTES`.
fn session_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes.clamp(0, MAX_SESSION_MINUTES)).unwrap_or(Duration::zero())
}

/// Share of opening-range breakouts whose session closes beyond the range on
/// the side of the first break.
fn orb_follow_through(sessions: &[&[OhlcvBar]], minutes: i64) -> Option<f64> {
    let mut broken = 0usize;
    let mut followed = 0usize;

    for session in sessions {
        let Some(first) = session.first() else {
            continue;
        };
        let range_end = first.timestamp + session_minutes(minutes);
        let split = session.partition_point(|b| b.timestamp < range_end);
        let (opening, rest) = session.split_at(split);
        let Some(last) = rest.last() else {
            continue;
        };

        let hi = opening.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lo = opening.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        let first_break = rest.iter().find_map(|b| {
            if b.high > hi {
                Some(true)
            } else if b.low < lo {
                Some(false)
            } else {
                None
            }
        });
        let Some(up) = first_break else {
            continue;
        };

        broken += 1;
        if (up && last.close > hi) || (!up && last.close < lo) {
            followed += 1;
        }
    }

    (broken > 0).then(|| followed as f64 / broken as f64)
}

/// Fraction of bars closing on the same side of the running VWAP as the
/// session's final bar.
fn vwap_persistence(session: &[OhlcvBar]) -> Option<f64> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    let mut sides: Vec<i8> = Vec::with_capacity(session.len());

    for bar in session {
        let v = bar.volume.max(0) as f64;
        pv += bar.typical_price() * v;
        vol += v;
        if vol > 0.0 {
            let vwap = pv / vol;
            sides.push(i8::from(bar.close > vwap) - i8::from(bar.close < vwap));
        }
    }

    let final_side = *sides.last()?;
    let matching = sides.iter().filter(|&&s| s == final_side).count();
    Some(matching as f64 / sides.len() as f64)
}

/// Symbols with a positive ADV and a defined ATR%, most liquid first, capped
/// at `size`. Ties break by symbol.
pub fn liquidity_pool(daily: &BTreeMap<String, DailyStats>, size: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = daily
        .iter()
        .filter(|(_, d)| d.atr_pct.is_some())
        .filter_map(|(s, d)| d.adv_value.filter(|a| a.is_finite() && *a > 0.0).map(|a| (s, a)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(size)
        .map(|(s, _)| s.clone())
        .collect()
}

fn assemble(symbol: &str, daily: &DailyStats, intraday: &IntradayStats) -> Option<SymbolMetrics> {
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    Some(SymbolMetrics {
        symbol: symbol.to_string(),
        latest_close: finite(Some(daily.latest_close))?,
        adv_value: finite(daily.adv_value)?,
        atr_pct: Some(finite(daily.atr_pct)?),
        median_intraday_range_bps: finite(intraday.median_range_bps)?,
        close_volume_share: finite(intraday.close_volume_share)?,
        no_trade_ratio: finite(intraday.no_trade_ratio)?,
        efficiency_ratio: finite(daily.efficiency_ratio),
        orb_follow_through: finite(intraday.orb_follow_through),
        vwap_persistence: finite(intraday.vwap_persistence),
    })
}

pub struct MetricsCalculator<'a> {
    port: &'a dyn MarketDataPort,
    config: &'a MetricConfig,
}

impl<'a> MetricsCalculator<'a> {
    pub fn new(port: &'a dyn MarketDataPort, config: &'a MetricConfig) -> Self {
        Self { port, config }
    }

    pub fn calculate(
        &self,
        symbols: &[String],
    ) -> Result<BTreeMap<String, SymbolMetrics>, SelectorError> {
        let window = self.config.daily_window_days();
        let daily = self.port.fetch_daily_bars(symbols, window)?;

        let daily_by_symbol: BTreeMap<String, DailyStats> = symbols
            .iter()
            .filter_map(|symbol| {
                let bars = daily.get(symbol)?;
                let bars = &bars[bars.len().saturating_sub(window)..];
                daily_stats(bars, self.config).map(|d| (symbol.clone(), d))
            })
            .collect();
        debug!(
            requested = symbols.len(),
            with_history = daily_by_symbol.len(),
            window,
            "daily metrics computed"
        );

        let pool = liquidity_pool(&daily_by_symbol, self.config.ranking_pool_size);
        if pool.is_empty() {
            info!("no symbols eligible for the intraday stage");
            return Ok(BTreeMap::new());
        }

        let intraday_window = self.config.close_volume_window_days;
        let intraday = self.port.fetch_intraday_bars(&pool, intraday_window)?;

        let mut result = BTreeMap::new();
        for symbol in &pool {
            let Some(bars) = intraday.get(symbol) else {
                debug!(symbol = %symbol, "no intraday bars");
                continue;
            };
            let stats = intraday_stats(trailing_sessions(bars, intraday_window), self.config);
            if let Some(metrics) = assemble(symbol, &daily_by_symbol[symbol], &stats) {
                result.insert(symbol.clone(), metrics);
            }
        }

        info!(
            candidates = symbols.len(),
            pool = pool.len(),
            complete = result.len(),
            "symbol metrics ready"
        );
        Ok(result)
    }
}
