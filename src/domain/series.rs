//! Columnar helpers over bar series.
//!
//! Rolling windows follow the usual dataframe semantics: a window of `w`
//! trailing observations, non-finite entries ignored, and a value emitted
//! only once at least `min_periods` finite observations are present.

use crate::domain::ohlcv::OhlcvBar;

/// Bars split into parallel `f64` columns.
#[derive(Debug, Clone, Default)]
pub struct BarColumns {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarColumns {
    pub fn from_bars(bars: &[OhlcvBar]) -> Self {
        Self {
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            close: bars.iter().map(|b| b.close).collect(),
            volume: bars.iter().map(|b| b.volume as f64).collect(),
        }
    }

    /// close × volume per row.
    pub fn traded_value(&self) -> Vec<f64> {
        self.close
            .iter()
            .zip(&self.volume)
            .map(|(c, v)| c * v)
            .collect()
    }

    /// True range per row. Row 0 has no previous close and uses high - low.
    pub fn true_range(&self) -> Vec<f64> {
        let prev_close = std::iter::once(f64::NAN).chain(self.close.iter().copied());
        self.high
            .iter()
            .zip(&self.low)
            .zip(prev_close)
            .map(|((&h, &l), pc)| {
                let hl = h - l;
                if pc.is_nan() {
                    hl
                } else {
                    hl.max((h - pc).abs()).max((l - pc).abs())
                }
            })
            .collect()
    }
}

/// Mean of the finite values among the last `window` rows, or `None` with
/// fewer than `min_periods` of them.
pub fn last_rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Option<f64> {
    let start = values.len().saturating_sub(window);
    let finite: Vec<f64> = values[start..]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if window == 0 || finite.is_empty() || finite.len() < min_periods {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Median of the finite values.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Arithmetic mean of the finite values.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn last_rolling_mean_respects_min_periods() {
        assert_eq!(last_rolling_mean(&[1.0, 2.0], 3, 3), None);
        assert_relative_eq!(last_rolling_mean(&[1.0, 2.0, 3.0], 3, 3).unwrap(), 2.0);
        assert_relative_eq!(last_rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3, 3).unwrap(), 3.0);
        assert_eq!(last_rolling_mean(&[1.0, 2.0, 3.0], 0, 0), None);
    }

    #[test]
    fn last_rolling_mean_skips_nan() {
        let values = [1.0, f64::NAN, 3.0];
        assert_relative_eq!(last_rolling_mean(&values, 3, 2).unwrap(), 2.0);
        assert_eq!(last_rolling_mean(&values, 3, 3), None);
    }

    #[test]
    fn last_rolling_mean_uses_trailing_window() {
        let values: Vec<f64> = (1..=30).map(f64::from).collect();
        assert_relative_eq!(last_rolling_mean(&values, 20, 20).unwrap(), 20.5);
    }

    #[test]
    fn true_range_first_row_is_high_low() {
        let cols = BarColumns {
            high: vec![110.0, 130.0],
            low: vec![100.0, 120.0],
            close: vec![105.0, 125.0],
            volume: vec![1.0, 1.0],
        };
        let tr = cols.true_range();
        assert_relative_eq!(tr[0], 10.0);
        // gap up: |130 - 105| = 25
        assert_relative_eq!(tr[1], 25.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median([3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median([4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(Vec::<f64>::new()), None);
        assert_eq!(median([f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn mean_ignores_non_finite() {
        assert_eq!(mean([1.0, f64::INFINITY, 3.0]), Some(2.0));
        assert_eq!(mean(Vec::<f64>::new()), None);
    }
}
