//! Tail-risk transforms: drawdown, historical VaR / CVaR, worst return.

use super::VarParams;
use crate::domain::panel::{Column, Panel};
use crate::domain::window::{max, min, min_periods_80, quantile, rolling, round_column, tail_mean};

/// Worst peak-to-trough decline inside the trailing window, as a fraction
/// of the peak (0 or negative).
pub fn max_drawdown(panel: &Panel, window: usize) -> Column {
    let raw = panel.map_groups(&panel.close(), |closes| {
        let peaks = rolling(closes, window, 1, max);
        let drawdown: Column = closes
            .iter()
            .zip(&peaks)
            .map(|(c, p)| match (c, p) {
                (Some(c), Some(p)) if *p != 0.0 => Some((c - p) / p),
                _ => None,
            })
            .collect();
        rolling(&drawdown, window, 1, min)
    });
    round_column(&raw, 6)
}

/// Dollar loss at the `1 - confidence` quantile of trailing returns. A
/// quantile that is a gain reports no loss.
pub fn historical_var(panel: &Panel, ret: &[Option<f64>], params: &VarParams) -> Column {
    let alpha = params.alpha();
    scaled_tail(panel, ret, params, move |w| quantile(w, alpha))
}

/// Dollar mean of the returns at or beyond the VaR quantile.
pub fn historical_cvar(panel: &Panel, ret: &[Option<f64>], params: &VarParams) -> Column {
    let alpha = params.alpha();
    scaled_tail(panel, ret, params, move |w| tail_mean(w, alpha))
}

fn scaled_tail<F>(panel: &Panel, ret: &[Option<f64>], params: &VarParams, reduce: F) -> Column
where
    F: Fn(&[f64]) -> Option<f64> + Copy,
{
    let lookback = params.lookback;
    let capital = params.capital as f64;
    let raw = panel.map_groups(ret, |s| {
        rolling(s, lookback, min_periods_80(lookback), reduce)
            .into_iter()
            .map(|v| v.map(|v| loss(v, capital)))
            .collect()
    });
    round_column(&raw, 4)
}

/// Loss magnitude of a return, floored at zero. Monotone in the return, so
/// a tail mean never reports less than its quantile.
fn loss(ret: f64, capital: f64) -> f64 {
    if ret < 0.0 {
        -ret * capital
    } else {
        0.0
    }
}

/// Minimum `ret` over the trailing `lookback` rows.
pub fn worst_return(panel: &Panel, ret: &[Option<f64>], lookback: usize) -> Column {
    let raw = panel.map_groups(ret, |s| rolling(s, lookback, min_periods_80(lookback), min));
    round_column(&raw, 6)
}
