//! Composite desirability score.
//!
//! Every factor except volatility fit is rank-normalized into [0, 1] so a
//! few outliers cannot compress the spread of the rest of the pool.
//! Volatility fit measures distance from a target level instead.

use crate::domain::metrics::{ExtensionMetric, MetricConfig, SymbolMetrics};
use std::collections::BTreeMap;

/// Prefix marking optional factors in breakdowns and audit columns.
pub const EXTENSION_PREFIX: &str = "ext_";

pub const LIQUIDITY: &str = "liquidity";
pub const VOLATILITY: &str = "volatility";
pub const COST: &str = "cost";
pub const CLOSE_LIQUIDITY: &str = "close_liquidity";
pub const ZERO_VOLUME: &str = "zero_volume";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub liquidity: f64,
    pub volatility: f64,
    pub cost: f64,
    pub close_liquidity: f64,
    pub zero_volume: f64,
    /// Extension weights keyed by [`ExtensionMetric::name`].
    pub extra: BTreeMap<String, f64>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            liquidity: 0.35,
            volatility: 0.25,
            cost: 0.20,
            close_liquidity: 0.10,
            zero_volume: 0.10,
            extra: BTreeMap::new(),
        }
    }
}

impl ScoringWeights {
    pub fn extra_weight(&self, ext: ExtensionMetric) -> f64 {
        self.extra.get(ext.name()).copied().unwrap_or(0.0)
    }
}

/// Weighted per-factor contributions; they sum to `total`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub liquidity: f64,
    pub volatility: f64,
    pub cost: f64,
    pub close_liquidity: f64,
    pub zero_volume: f64,
    /// Enabled extension factors keyed by [`ExtensionMetric::name`].
    pub extensions: BTreeMap<String, f64>,
}

impl ScoreBreakdown {
    /// Named components in a fixed order, extension keys prefixed.
    pub fn components(&self) -> Vec<(String, f64)> {
        let mut out = vec![
            (LIQUIDITY.to_string(), self.liquidity),
            (VOLATILITY.to_string(), self.volatility),
            (COST.to_string(), self.cost),
            (CLOSE_LIQUIDITY.to_string(), self.close_liquidity),
            (ZERO_VOLUME.to_string(), self.zero_volume),
        ];
        out.extend(
            self.extensions
                .iter()
                .map(|(k, v)| (format!("{EXTENSION_PREFIX}{k}"), *v)),
        );
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Rank-based score: best → 1.0, worst → 0.0, linear in rank between.
/// Exact ties break by symbol so the result never depends on input order.
pub fn rank_normalize<'a>(
    values: impl IntoIterator<Item = (&'a str, f64)>,
    direction: Direction,
) -> BTreeMap<String, f64> {
    let mut ranked: Vec<(&str, f64)> = values.into_iter().collect();
    ranked.sort_by(|a, b| {
        let by_value = match direction {
            Direction::HigherIsBetter => b.1.total_cmp(&a.1),
            Direction::LowerIsBetter => a.1.total_cmp(&b.1),
        };
        by_value.then_with(|| a.0.cmp(b.0))
    });

    let n = ranked.len();
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (symbol, _))| {
            let score = if n <= 1 {
                1.0
            } else {
                1.0 - i as f64 / (n - 1) as f64
            };
            (symbol.to_string(), score)
        })
        .collect()
}

/// `clamp(1 - |atr_pct - target| / tolerance, 0, 1)`.
pub fn volatility_fit(atr_pct: f64, target: f64, tolerance: f64) -> f64 {
    let deviation = (atr_pct - target).abs();
    if tolerance <= 0.0 {
        return if deviation == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - deviation / tolerance).clamp(0.0, 1.0)
}

pub fn score_symbols(
    metrics: &BTreeMap<String, SymbolMetrics>,
    weights: &ScoringWeights,
    config: &MetricConfig,
) -> BTreeMap<String, ScoreBreakdown> {
    let column = |f: fn(&SymbolMetrics) -> f64| {
        metrics
            .iter()
            .map(move |(s, m)| (s.as_str(), f(m)))
    };

    let liquidity = rank_normalize(column(|m| m.adv_value), Direction::HigherIsBetter);
    let cost = rank_normalize(
        column(|m| m.median_intraday_range_bps),
        Direction::LowerIsBetter,
    );
    let close_liq = rank_normalize(
        column(|m| m.close_volume_share),
        Direction::HigherIsBetter,
    );
    let zero_penalty = rank_normalize(column(|m| m.no_trade_ratio), Direction::LowerIsBetter);

    // symbols without a value for an enabled extension score 0 on it
    let extensions: Vec<(ExtensionMetric, BTreeMap<String, f64>)> = config
        .enabled_extensions()
        .into_iter()
        .map(|ext| {
            let ranks = rank_normalize(
                metrics
                    .iter()
                    .filter_map(|(s, m)| ext.value(m).map(|v| (s.as_str(), v))),
                Direction::HigherIsBetter,
            );
            (ext, ranks)
        })
        .collect();

    metrics
        .iter()
        .map(|(symbol, m)| {
            let rank = |table: &BTreeMap<String, f64>| table.get(symbol).copied().unwrap_or(0.0);
            let volfit = m
                .atr_pct
                .map(|a| volatility_fit(a, config.target_atr_pct, config.atr_tolerance))
                .unwrap_or(0.0);

            let mut b = ScoreBreakdown {
                total: 0.0,
                liquidity: weights.liquidity * rank(&liquidity),
                volatility: weights.volatility * volfit,
                cost: weights.cost * rank(&cost),
                close_liquidity: weights.close_liquidity * rank(&close_liq),
                zero_volume: weights.zero_volume * rank(&zero_penalty),
                extensions: BTreeMap::new(),
            };
            for (ext, ranks) in &extensions {
                b.extensions
                    .insert(ext.name().to_string(), weights.extra_weight(*ext) * rank(ranks));
            }
            b.total = b.liquidity
                + b.volatility
                + b.cost
                + b.close_liquidity
                + b.zero_volume
                + b.extensions.values().sum::<f64>();

            (symbol.clone(), b)
        })
        .collect()
}
