//! Mean-reversion transforms: RSI and Bollinger %B.

use crate::domain::panel::{Column, Panel};
use crate::domain::window::{diff, ewm_mean, mean, rolling, round_column, sample_std};

/// Wilder RSI over `window` rows.
///
/// Null on a symbol's first row. A window with gains and no losses reads 100.
pub fn rsi(panel: &Panel, window: usize) -> Column {
    if window == 0 {
        return vec![None; panel.len()];
    }
    let alpha = 1.0 / window as f64;

    let raw = panel.map_groups(&panel.close(), |closes| {
        let delta = diff(closes, 1);
        let gain: Column = delta.iter().map(|d| d.map(|d| d.max(0.0))).collect();
        let loss: Column = delta.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();

        let avg_gain = ewm_mean(&gain, alpha, false);
        let avg_loss = ewm_mean(&loss, alpha, false);

        avg_gain
            .iter()
            .zip(&avg_loss)
            .map(|(g, l)| match (g, l) {
                (Some(_), Some(l)) if *l == 0.0 => Some(100.0),
                (Some(g), Some(l)) => Some(100.0 - 100.0 / (1.0 + g / l)),
                _ => None,
            })
            .collect()
    });
    round_column(&raw, 2)
}

/// Position of close inside Bollinger bands of `period` rows and
/// `stddev_mult_x100 / 100` standard deviations: 0 at the lower band, 1 at
/// the upper band. Zero band width is null.
pub fn bollinger_pct_b(panel: &Panel, period: usize, stddev_mult_x100: u32) -> Column {
    let mult = stddev_mult_x100 as f64 / 100.0;

    let raw = panel.map_groups(&panel.close(), |closes| {
        let mid = rolling(closes, period, period, mean);
        let sd = rolling(closes, period, period, sample_std);

        (0..closes.len())
            .map(|i| {
                let (c, m, s) = (closes[i]?, mid[i]?, sd[i]?);
                let upper = m + s * mult;
                let lower = m - s * mult;
                let width = upper - lower;
                if width == 0.0 {
                    return None;
                }
                Some((c - lower) / width)
            })
            .collect()
    });
    round_column(&raw, 6)
}
