//! Return and volatility transforms.
//!
//! return(h) = ln(C[t] / C[t-h]), 6 dp, null for the first h rows of a symbol.
//! Volatility is the sample standard deviation of 1-period returns with the
//! 80% minimum-period rule; annualised by sqrt(252).

use crate::domain::panel::{Column, Panel};
use crate::domain::window::{finite, min_periods_80, rolling, round_column, round_to, sample_std};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn log_return(panel: &Panel, horizon: usize) -> Column {
    panel.map_bars(|bars| {
        (0..bars.len())
            .map(|i| {
                if i < horizon {
                    return None;
                }
                finite((bars[i].close / bars[i - horizon].close).ln()).map(|r| round_to(r, 6))
            })
            .collect()
    })
}

/// (1 + return(h))^(252 / h) - 1
pub fn annualized_return(ret: &[Option<f64>], horizon: usize) -> Column {
    if horizon == 0 {
        return vec![None; ret.len()];
    }
    let exponent = TRADING_DAYS_PER_YEAR / horizon as f64;
    let raw: Column = ret
        .iter()
        .map(|r| r.map(|r| (1.0 + r).powf(exponent) - 1.0))
        .collect();
    round_column(&raw, 6)
}

pub fn volatility(panel: &Panel, ret: &[Option<f64>], window: usize) -> Column {
    let raw = panel.map_groups(ret, |s| rolling(s, window, min_periods_80(window), sample_std));
    round_column(&raw, 6)
}

pub fn annualized_volatility(vol: &[Option<f64>]) -> Column {
    let factor = TRADING_DAYS_PER_YEAR.sqrt();
    let raw: Column = vol.iter().map(|v| v.map(|v| v * factor)).collect();
    round_column(&raw, 6)
}

/// Annualised rolling standard deviation of returns clipped at zero from
/// above; up days count as 0.
pub fn downside_volatility(panel: &Panel, ret: &[Option<f64>], window: usize) -> Column {
    let clipped: Column = ret.iter().map(|r| r.map(|r| r.min(0.0))).collect();
    let factor = TRADING_DAYS_PER_YEAR.sqrt();
    let raw = panel.map_groups(&clipped, |s| {
        rolling(s, window, min_periods_80(window), sample_std)
            .into_iter()
            .map(|v| v.map(|v| v * factor))
            .collect()
    });
    round_column(&raw, 6)
}
