//! Hard pass/fail filter applied before scoring.

use crate::domain::metrics::SymbolMetrics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterThresholds {
    pub adv_min: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub atr_pct_min: f64,
    pub atr_pct_max: f64,
    pub zero_volume_ratio_max: f64,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            adv_min: 10_000_000.0,
            price_min: 1.0,
            price_max: 1_000_000.0,
            atr_pct_min: 0.005,
            atr_pct_max: 0.10,
            zero_volume_ratio_max: 0.10,
        }
    }
}

/// Per-cycle replacements for individual thresholds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdOverrides {
    pub adv_min: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub atr_pct_min: Option<f64>,
    pub atr_pct_max: Option<f64>,
    pub zero_volume_ratio_max: Option<f64>,
}

impl ThresholdOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, base: &FilterThresholds) -> FilterThresholds {
        FilterThresholds {
            adv_min: self.adv_min.unwrap_or(base.adv_min),
            price_min: self.price_min.unwrap_or(base.price_min),
            price_max: self.price_max.unwrap_or(base.price_max),
            atr_pct_min: self.atr_pct_min.unwrap_or(base.atr_pct_min),
            atr_pct_max: self.atr_pct_max.unwrap_or(base.atr_pct_max),
            zero_volume_ratio_max: self
                .zero_volume_ratio_max
                .unwrap_or(base.zero_volume_ratio_max),
        }
    }
}

impl FilterThresholds {
    pub fn passes(&self, m: &SymbolMetrics) -> bool {
        let atr_ok = m
            .atr_pct
            .is_some_and(|a| a >= self.atr_pct_min && a <= self.atr_pct_max);
        m.adv_value >= self.adv_min
            && m.latest_close >= self.price_min
            && m.latest_close <= self.price_max
            && atr_ok
            && m.no_trade_ratio <= self.zero_volume_ratio_max
    }
}

pub fn apply_hard_filter(
    metrics: &BTreeMap<String, SymbolMetrics>,
    thresholds: &FilterThresholds,
) -> BTreeMap<String, SymbolMetrics> {
    metrics
        .iter()
        .filter(|(_, m)| thresholds.passes(m))
        .map(|(s, m)| (s.clone(), m.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(symbol: &str, close: f64, adv: f64, atr: Option<f64>, zero: f64) -> SymbolMetrics {
        SymbolMetrics {
            symbol: symbol.into(),
            latest_close: close,
            adv_value: adv,
            atr_pct: atr,
            median_intraday_range_bps: 10.0,
            close_volume_share: 0.05,
            no_trade_ratio: zero,
            efficiency_ratio: None,
            orb_follow_through: None,
            vwap_persistence: None,
        }
    }

    fn thresholds() -> FilterThresholds {
        FilterThresholds {
            adv_min: 1_000.0,
            price_min: 5.0,
            price_max: 100.0,
            atr_pct_min: 0.01,
            atr_pct_max: 0.05,
            zero_volume_ratio_max: 0.1,
        }
    }

    #[test]
    fn passes_when_all_thresholds_met() {
        assert!(thresholds().passes(&metrics("A", 50.0, 5_000.0, Some(0.02), 0.0)));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = thresholds();
        assert!(t.passes(&metrics("A", 5.0, 1_000.0, Some(0.01), 0.1)));
        assert!(t.passes(&metrics("A", 100.0, 1_000.0, Some(0.05), 0.1)));
    }

    #[test]
    fn each_threshold_rejects() {
        let t = thresholds();
        assert!(!t.passes(&metrics("A", 50.0, 999.0, Some(0.02), 0.0)));
        assert!(!t.passes(&metrics("A", 4.99, 5_000.0, Some(0.02), 0.0)));
        assert!(!t.passes(&metrics("A", 100.01, 5_000.0, Some(0.02), 0.0)));
        assert!(!t.passes(&metrics("A", 50.0, 5_000.0, Some(0.009), 0.0)));
        assert!(!t.passes(&metrics("A", 50.0, 5_000.0, Some(0.051), 0.0)));
        assert!(!t.passes(&metrics("A", 50.0, 5_000.0, None, 0.0)));
        assert!(!t.passes(&metrics("A", 50.0, 5_000.0, Some(0.02), 0.2)));
    }

    #[test]
    fn filter_keeps_passing_subset() {
        let mut all = BTreeMap::new();
        all.insert("AAA".to_string(), metrics("AAA", 50.0, 5_000.0, Some(0.02), 0.0));
        all.insert("BBB".to_string(), metrics("BBB", 500.0, 5_000.0, Some(0.02), 0.0));
        let kept = apply_hard_filter(&all, &thresholds());
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["AAA"]);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = ThresholdOverrides {
            price_max: Some(60.0),
            ..ThresholdOverrides::default()
        };
        let merged = overrides.apply(&thresholds());
        assert_eq!(merged.price_max, 60.0);
        assert_eq!(merged.adv_min, 1_000.0);
        assert!(!overrides.is_empty());
        assert!(ThresholdOverrides::default().is_empty());
    }
}
