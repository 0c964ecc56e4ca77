//! Momentum transforms.

use crate::domain::panel::{Column, Panel};
use crate::domain::window::{mean, min_periods_80, rolling, round_column, shift};

/// Rows per calendar month used by every month-denominated parameter.
pub const TRADING_DAYS_PER_MONTH: usize = 21;

/// C[t - lag] / C[t - total] - 1, with both offsets in months.
///
/// A zero start price is null.
pub fn lagged_momentum(panel: &Panel, total_months: usize, lag_months: usize) -> Column {
    let start_offset = total_months * TRADING_DAYS_PER_MONTH;
    let end_offset = lag_months * TRADING_DAYS_PER_MONTH;

    let raw = panel.map_groups(&panel.close(), |s| {
        let start = shift(s, start_offset);
        let end = shift(s, end_offset);
        start
            .iter()
            .zip(&end)
            .map(|(p0, p1)| match (p0, p1) {
                (Some(p0), Some(p1)) if *p0 != 0.0 => Some(p1 / p0 - 1.0),
                _ => None,
            })
            .collect()
    });
    round_column(&raw, 6)
}

/// numerator / denominator, null when the denominator is missing or zero.
pub fn risk_adjusted(numerator: &[Option<f64>], denominator: &[Option<f64>]) -> Column {
    let raw: Column = numerator
        .iter()
        .zip(denominator)
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect();
    round_column(&raw, 6)
}

/// Share of up days over the trailing window. A missing return stays
/// missing rather than counting as a down day.
pub fn positive_return_pct(panel: &Panel, ret: &[Option<f64>], window: usize) -> Column {
    let indicator: Column = ret
        .iter()
        .map(|r| r.map(|r| if r > 0.0 { 1.0 } else { 0.0 }))
        .collect();
    let raw = panel.map_groups(&indicator, |s| rolling(s, window, min_periods_80(window), mean));
    round_column(&raw, 6)
}
