//! Audit rows: one per filtered symbol, merging metrics, score and
//! breakdown.

use crate::domain::metrics::SymbolMetrics;
use crate::domain::scoring::ScoreBreakdown;
use crate::domain::selection::Selection;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Core,
    Bench,
    Rejected,
}

impl Membership {
    pub fn as_str(self) -> &'static str {
        match self {
            Membership::Core => "core",
            Membership::Bench => "bench",
            Membership::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw metric columns in output order.
pub const METRIC_COLUMNS: [&str; 9] = [
    "latest_close",
    "adv_value",
    "atr_pct",
    "median_intraday_range_bps",
    "close_volume_share",
    "no_trade_ratio",
    "efficiency_ratio",
    "orb_follow_through",
    "vwap_persistence",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub symbol: String,
    /// 1-based position in the score ranking.
    pub rank: usize,
    pub membership: Membership,
    pub metrics: SymbolMetrics,
    pub total: f64,
    /// Weighted factor contributions; extension keys carry the `ext_` prefix.
    pub components: Vec<(String, f64)>,
}

impl SnapshotRow {
    /// Raw metrics aligned with [`METRIC_COLUMNS`].
    pub fn metric_values(&self) -> [Option<f64>; 9] {
        let m = &self.metrics;
        [
            Some(m.latest_close),
            Some(m.adv_value),
            m.atr_pct,
            Some(m.median_intraday_range_bps),
            Some(m.close_volume_share),
            Some(m.no_trade_ratio),
            m.efficiency_ratio,
            m.orb_follow_through,
            m.vwap_persistence,
        ]
    }

    pub fn component(&self, key: &str) -> Option<f64> {
        self.components
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

/// Rows in ranking order (score descending, ties by symbol).
pub fn build_snapshot(
    ranking: &[String],
    metrics: &BTreeMap<String, SymbolMetrics>,
    breakdown: &BTreeMap<String, ScoreBreakdown>,
    selection: &Selection,
) -> Vec<SnapshotRow> {
    ranking
        .iter()
        .enumerate()
        .filter_map(|(i, symbol)| {
            let m = metrics.get(symbol)?;
            let b = breakdown.get(symbol)?;
            let membership = if selection.core.contains(symbol) {
                Membership::Core
            } else if selection.bench.contains(symbol) {
                Membership::Bench
            } else {
                Membership::Rejected
            };
            Some(SnapshotRow {
                symbol: symbol.clone(),
                rank: i + 1,
                membership,
                metrics: m.clone(),
                total: b.total,
                components: b.components(),
            })
        })
        .collect()
}

/// Union of component keys across rows, first-seen order.
pub fn component_columns(rows: &[SnapshotRow]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for (key, _) in &row.components {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(symbol: &str) -> SymbolMetrics {
        SymbolMetrics {
            symbol: symbol.into(),
            latest_close: 20.0,
            adv_value: 1e6,
            atr_pct: Some(0.03),
            median_intraday_range_bps: 12.0,
            close_volume_share: 0.08,
            no_trade_ratio: 0.0,
            efficiency_ratio: Some(0.4),
            orb_follow_through: None,
            vwap_persistence: None,
        }
    }

    fn breakdown(total: f64, ext: bool) -> ScoreBreakdown {
        let mut extensions = BTreeMap::new();
        if ext {
            extensions.insert("efficiency_ratio".to_string(), 0.1);
        }
        ScoreBreakdown {
            total,
            liquidity: total,
            volatility: 0.0,
            cost: 0.0,
            close_liquidity: 0.0,
            zero_volume: 0.0,
            extensions,
        }
    }

    #[test]
    fn rows_follow_ranking_and_label_membership() {
        let ranking = vec!["B".to_string(), "A".to_string(), "C".to_string()];
        let metrics: BTreeMap<_, _> = ["A", "B", "C"]
            .iter()
            .map(|s| (s.to_string(), metrics(s)))
            .collect();
        let breakdown: BTreeMap<_, _> = [("A", 0.5), ("B", 0.9), ("C", 0.1)]
            .iter()
            .map(|(s, t)| (s.to_string(), breakdown(*t, false)))
            .collect();
        let selection = Selection {
            core: vec!["B".into()],
            bench: vec!["A".into()],
            ..Selection::default()
        };

        let rows = build_snapshot(&ranking, &metrics, &breakdown, &selection);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].symbol, "B");
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].membership, Membership::Core);
        assert_eq!(rows[1].membership, Membership::Bench);
        assert_eq!(rows[2].membership, Membership::Rejected);
        assert_eq!(rows[2].component("liquidity"), Some(0.1));
        assert_eq!(rows[0].metric_values()[2], Some(0.03));
    }

    #[test]
    fn component_columns_union_in_order() {
        let row = |ext| SnapshotRow {
            symbol: "A".into(),
            rank: 1,
            membership: Membership::Core,
            metrics: metrics("A"),
            total: 1.0,
            components: breakdown(1.0, ext).components(),
        };
        let cols = component_columns(&[row(false), row(true)]);
        assert_eq!(
            cols,
            vec![
                "liquidity",
                "volatility",
                "cost",
                "close_liquidity",
                "zero_volume",
                "ext_efficiency_ratio"
            ]
        );
    }
}
