//! Trend transforms: moving averages, ADX, Donchian channels, distance to
//! the trailing high.

use crate::domain::panel::{Column, Panel};
use crate::domain::window::{ewm_mean, finite, max, mean, min, rolling, round_column, span_alpha};

pub fn sma(panel: &Panel, window: usize) -> Column {
    let raw = panel.map_groups(&panel.close(), |s| rolling(s, window, window, mean));
    round_column(&raw, 4)
}

/// Adjusted exponential average of close with span `window`, defined from a
/// symbol's first row.
pub fn ema(panel: &Panel, window: usize) -> Column {
    if window == 0 {
        return vec![None; panel.len()];
    }
    let alpha = span_alpha(window);
    let raw = panel.map_groups(&panel.close(), |s| ewm_mean(s, alpha, true));
    round_column(&raw, 4)
}

/// Average Directional Index with Wilder smoothing (alpha = 1 / window).
///
/// The first `window` rows of every symbol are null.
pub fn adx(panel: &Panel, window: usize) -> Column {
    if window == 0 {
        return vec![None; panel.len()];
    }
    let alpha = 1.0 / window as f64;

    let raw = panel.map_bars(|bars| {
        let n = bars.len();
        let mut tr: Column = Vec::with_capacity(n);
        let mut plus_dm: Column = Vec::with_capacity(n);
        let mut minus_dm: Column = Vec::with_capacity(n);

        for (i, bar) in bars.iter().enumerate() {
            let prev = i.checked_sub(1).map(|p| &bars[p]);
            tr.push(finite(bar.true_range(prev.map(|p| p.close))));

            let (up, down) = match prev {
                Some(p) => (bar.high - p.high, p.low - bar.low),
                None => (0.0, 0.0),
            };
            plus_dm.push(Some(if up > down && up > 0.0 { up } else { 0.0 }));
            minus_dm.push(Some(if down > up && down > 0.0 { down } else { 0.0 }));
        }

        let atr = ewm_mean(&tr, alpha, false);
        let plus_s = ewm_mean(&plus_dm, alpha, false);
        let minus_s = ewm_mean(&minus_dm, alpha, false);

        let dx: Column = (0..n)
            .map(|i| {
                let range = atr[i].filter(|a| *a != 0.0)?;
                let pdi = 100.0 * plus_s[i]? / range;
                let mdi = 100.0 * minus_s[i]? / range;
                let sum = pdi + mdi;
                if sum == 0.0 {
                    return None;
                }
                finite(100.0 * (pdi - mdi).abs() / sum)
            })
            .collect();

        ewm_mean(&dx, alpha, false)
            .into_iter()
            .enumerate()
            .map(|(i, v)| if i < window { None } else { v })
            .collect()
    });

    round_column(&raw, 2)
}

pub fn donchian_high(panel: &Panel, window: usize) -> Column {
    let raw = panel.map_groups(&panel.high(), |s| rolling(s, window, window, max));
    round_column(&raw, 4)
}

pub fn donchian_low(panel: &Panel, window: usize) -> Column {
    let raw = panel.map_groups(&panel.low(), |s| rolling(s, window, window, min));
    round_column(&raw, 4)
}

/// Midpoint of the rounded channel bounds.
pub fn donchian_median(high: &[Option<f64>], low: &[Option<f64>]) -> Column {
    let raw: Column = high
        .iter()
        .zip(low)
        .map(|(h, l)| Some((h.as_ref()? + l.as_ref()?) / 2.0))
        .collect();
    round_column(&raw, 4)
}

/// close / trailing `window`-row high. A zero high is null.
pub fn price_to_high(panel: &Panel, window: usize) -> Column {
    let highs = panel.map_groups(&panel.high(), |s| rolling(s, window, window, max));
    let raw: Column = panel
        .bars()
        .iter()
        .zip(&highs)
        .map(|(bar, high)| match high {
            Some(h) if *h != 0.0 => Some(bar.close / h),
            _ => None,
        })
        .collect();
    round_column(&raw, 4)
}
