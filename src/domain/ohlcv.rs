//! OHLCV bar representation.

use crate::domain::window::round_to;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    ///
    /// Non-finite components are skipped, so a missing previous close leaves
    /// only the high-low span.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => {
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                [hl, hc, lc]
                    .into_iter()
                    .filter(|v| v.is_finite())
                    .fold(f64::NAN, f64::max)
            }
            None => hl,
        }
    }

    /// Trimmed symbol, prices at 4 decimals, negative volume clamped to 0.
    pub fn normalized(mut self) -> Self {
        self.symbol = self.symbol.trim().to_string();
        self.open = round_to(self.open, 4);
        self.high = round_to(self.high, 4);
        self.low = round_to(self.low, 4);
        self.close = round_to(self.close, 4);
        self.volume = self.volume.max(0);
        self
    }
}

/// Coerce a raw volume reading to a non-negative integer; anything missing or
/// non-finite becomes 0.
pub fn normalize_volume(raw: Option<f64>) -> i64 {
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v as i64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> OhlcvBar {
        OhlcvBar {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000,
        }
    }

    #[test]
    fn true_range_hl_dominates() {
        let bar = sample_bar();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((bar.true_range(Some(100.0)) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bar = sample_bar();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((bar.true_range(Some(70.0)) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let bar = sample_bar();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((bar.true_range(Some(130.0)) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_without_prev_close() {
        let bar = sample_bar();
        assert!((bar.true_range(None) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn normalized_trims_and_rounds() {
        let bar = OhlcvBar {
            symbol: "  MSFT \t".into(),
            open: 10.123_456,
            high: 10.999_99,
            low: 9.000_04,
            close: 10.000_05,
            volume: -5,
            ..sample_bar()
        }
        .normalized();

        assert_eq!(bar.symbol, "MSFT");
        assert_eq!(bar.open, 10.1235);
        assert_eq!(bar.high, 11.0);
        assert_eq!(bar.low, 9.0);
        assert_eq!(bar.volume, 0);
    }

    #[test]
    fn normalize_volume_coerces_invalid() {
        assert_eq!(normalize_volume(Some(1234.9)), 1234);
        assert_eq!(normalize_volume(Some(f64::INFINITY)), 0);
        assert_eq!(normalize_volume(Some(f64::NAN)), 0);
        assert_eq!(normalize_volume(Some(-3.0)), 0);
        assert_eq!(normalize_volume(None), 0);
    }
}
