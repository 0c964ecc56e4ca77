//! Liquidity transforms: volume and dollar-volume averages, Amihud ratio.

use crate::domain::panel::{Column, Panel};
use crate::domain::window::{finite, mean, median, min_periods_80, rolling, round_column, round_to};

pub fn avg_volume(panel: &Panel, volume: &[Option<f64>], window: usize) -> Column {
    let raw = panel.map_groups(volume, |s| rolling(s, window, window, mean));
    round_column(&raw, 0)
}

pub fn median_volume(panel: &Panel, volume: &[Option<f64>], window: usize) -> Column {
    let raw = panel.map_groups(volume, |s| rolling(s, window, window, median));
    round_column(&raw, 0)
}

/// close * volume at 2 dp. Always present: non-finite products become 0.
pub fn dollar_volume(panel: &Panel) -> Column {
    panel
        .bars()
        .iter()
        .map(|b| {
            let dv = finite(b.close * b.volume as f64).unwrap_or(0.0);
            Some(round_to(dv, 2))
        })
        .collect()
}

pub fn avg_dollar_volume(panel: &Panel, dollar_volume: &[Option<f64>], window: usize) -> Column {
    let raw = panel.map_groups(dollar_volume, |s| rolling(s, window, window, mean));
    round_column(&raw, 2)
}

pub fn median_dollar_volume(
    panel: &Panel,
    dollar_volume: &[Option<f64>],
    window: usize,
) -> Column {
    let raw = panel.map_groups(dollar_volume, |s| rolling(s, window, window, median));
    round_column(&raw, 2)
}

/// Rolling mean of |return| / dollar_volume * 1e6.
///
/// A day with zero dollar volume is missing, not infinitely illiquid.
pub fn amihud(
    panel: &Panel,
    ret: &[Option<f64>],
    dollar_volume: &[Option<f64>],
    window: usize,
) -> Column {
    let daily: Column = ret
        .iter()
        .zip(dollar_volume)
        .map(|(r, dv)| match (r, dv) {
            (Some(r), Some(dv)) if *dv != 0.0 => finite(r.abs() / dv * 1e6),
            _ => None,
        })
        .collect();

    let raw = panel.map_groups(&daily, |s| rolling(s, window, min_periods_80(window), mean));
    round_column(&raw, 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::returns::log_return;
    use crate::domain::ohlcv::OhlcvBar;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn make_bars(symbol: &str, rows: &[(f64, i64)]) -> Vec<OhlcvBar> {
        rows.iter()
            .enumerate()
            .map(|(i, &(close, volume))| OhlcvBar {
                symbol: symbol.into(),
                date: NaiveDate::from_ymd_opt(2024, 3, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    #[test]
    fn avg_and_median_volume_need_full_window() {
        let panel = Panel::new(make_bars(
            "TEST",
            &[(10.0, 100), (10.0, 300), (10.0, 200), (10.0, 1000)],
        ))
        .unwrap();

        let avg = avg_volume(&panel, &panel.volume(), 3);
        assert_eq!(avg, vec![None, None, Some(200.0), Some(500.0)]);

        let med = median_volume(&panel, &panel.volume(), 3);
        assert_eq!(med, vec![None, None, Some(200.0), Some(300.0)]);
    }

    #[test]
    fn avg_volume_rounds_to_unit() {
        let panel = Panel::new(make_bars("TEST", &[(1.0, 1), (1.0, 2)])).unwrap();
        // mean 1.5 rounds half to even
        assert_eq!(avg_volume(&panel, &panel.volume(), 2)[1], Some(2.0));
    }

    #[test]
    fn dollar_volume_rounds_to_cents() {
        let panel = Panel::new(make_bars("TEST", &[(12.3456, 3), (5.0, 0)])).unwrap();
        let dv = dollar_volume(&panel);
        assert_eq!(dv, vec![Some(37.04), Some(0.0)]);
    }

    #[test]
    fn avg_and_median_dollar_volume() {
        let panel =
            Panel::new(make_bars("TEST", &[(10.0, 10), (20.0, 10), (30.0, 10)])).unwrap();
        let dv = dollar_volume(&panel);
        assert_eq!(avg_dollar_volume(&panel, &dv, 2)[2], Some(250.0));
        assert_eq!(median_dollar_volume(&panel, &dv, 3)[2], Some(200.0));
    }

    #[test]
    fn amihud_zero_dollar_volume_is_missing() {
        let panel = Panel::new(make_bars(
            "TEST",
            &[(10.0, 1000), (11.0, 0), (12.0, 1000), (11.0, 1000), (12.0, 1000)],
        ))
        .unwrap();
        let ret = log_return(&panel, 1);
        let dv = dollar_volume(&panel);

        let out = amihud(&panel, &ret, &dv, 4);
        assert!(out.iter().flatten().all(|v| v.is_finite()));

        // window 4 → min periods 3; rows 2..=4 are the only usable days
        assert_eq!(out[3], None);
        let expected = [2usize, 3, 4]
            .iter()
            .map(|&i| ret[i].unwrap().abs() / dv[i].unwrap() * 1e6)
            .sum::<f64>()
            / 3.0;
        assert_abs_diff_eq!(out[4].unwrap(), round_to(expected, 10), epsilon = 1e-12);
    }
}
