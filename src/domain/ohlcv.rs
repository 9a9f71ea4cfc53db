//! OHLCV bar representation shared by daily and intraday series.

use chrono::{NaiveDate, NaiveDateTime};

/// One OHLCV bar. Daily bars carry midnight timestamps; intraday bars carry
/// the exchange-local wall-clock start of the bar.
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Keep only the bars belonging to the last `sessions` distinct calendar
/// dates. Input must be in ascending time order.
pub fn trailing_sessions(bars: &[OhlcvBar], sessions: usize) -> &[OhlcvBar] {
    if sessions == 0 {
        return &bars[bars.len()..];
    }
    let mut seen = 0usize;
    let mut current: Option<NaiveDate> = None;
    for (i, bar) in bars.iter().enumerate().rev() {
        if current != Some(bar.date()) {
            current = Some(bar.date());
            seen += 1;
            if seen > sessions {
                return &bars[i + 1..];
            }
        }
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> OhlcvBar {
        OhlcvBar {
            symbol: "BHP".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000,
        }
    }

    fn intraday(day: u32, hour: u32, minute: u32) -> OhlcvBar {
        OhlcvBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
            ..sample_bar()
        }
    }

    #[test]
    fn typical_price() {
        let bar = sample_bar();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((bar.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn trailing_sessions_keeps_last_dates() {
        let bars = vec![
            intraday(1, 9, 30),
            intraday(1, 9, 35),
            intraday(4, 9, 30),
            intraday(5, 9, 30),
            intraday(5, 9, 35),
        ];
        let tail = trailing_sessions(&bars, 2);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn trailing_sessions_larger_than_history() {
        let bars = vec![intraday(1, 9, 30), intraday(2, 9, 30)];
        assert_eq!(trailing_sessions(&bars, 10).len(), 2);
        assert!(trailing_sessions(&bars, 0).is_empty());
    }
}
