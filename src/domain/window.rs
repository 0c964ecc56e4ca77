//! Slice-level window primitives shared by every factor transform.
//!
//! All functions operate on a single symbol's ordered values. `None` marks a
//! missing observation: rolling reducers skip it and count only present
//! values against `min_periods`.

/// Multiply, round half to even, divide back.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// `Some(value)` when finite; infinities and NaN become `None`.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Round every present value, dropping anything non-finite.
pub fn round_column(values: &[Option<f64>], decimals: i32) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| v.and_then(finite).map(|x| round_to(x, decimals)))
        .collect()
}

/// Tolerates up to 20% missing observations in a window.
pub fn min_periods_80(window: usize) -> usize {
    (window as f64 * 0.8) as usize
}

/// Lag values by `periods` rows; the first `periods` rows become `None`.
pub fn shift(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= periods { values[i - periods] } else { None })
        .collect()
}

/// values[i] - values[i - periods]
pub fn diff(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                return None;
            }
            match (values[i], values[i - periods]) {
                (Some(cur), Some(prev)) => Some(cur - prev),
                _ => None,
            }
        })
        .collect()
}

/// Trailing window reducer.
///
/// For row `i` the window covers rows `i + 1 - window ..= i` (clipped at the
/// start of the slice). The reducer sees only present values and runs when
/// at least `max(min_periods, 1)` of them exist.
pub fn rolling<F>(
    values: &[Option<f64>],
    window: usize,
    min_periods: usize,
    reduce: F,
) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    if window == 0 {
        return vec![None; values.len()];
    }

    let required = min_periods.max(1);
    let mut buf: Vec<f64> = Vec::with_capacity(window);

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            buf.clear();
            buf.extend(values[start..=i].iter().flatten().copied());
            if buf.len() < required {
                None
            } else {
                reduce(&buf).and_then(finite)
            }
        })
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (divides by n - 1).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let avg = values.iter().sum::<f64>() / n;
    let ss: f64 = values
        .iter()
        .map(|v| {
            let d = v - avg;
            d * d
        })
        .sum();
    Some((ss / (n - 1.0)).max(0.0).sqrt())
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Linear-interpolated quantile: position `q * (n - 1)` between order
/// statistics.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64)
}

/// Mean of the observations at or below the `q` quantile.
pub fn tail_mean(values: &[f64], q: f64) -> Option<f64> {
    let threshold = quantile(values, q)?;
    let tail: Vec<f64> = values.iter().copied().filter(|v| *v <= threshold).collect();
    mean(&tail)
}

/// Smoothing factor for a span parameterisation: 2 / (span + 1).
pub fn span_alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// Exponentially weighted mean.
///
/// `adjust = true` normalises by the sum of weights `(1 - alpha)^i`;
/// `adjust = false` is the recursive form `y = (1 - alpha) * y + alpha * x`
/// (Wilder smoothing when `alpha = 1 / n`). The average is seeded by the
/// first present value. A missing value carries the previous average forward
/// while the decay of older weights keeps counting.
pub fn ewm_mean(values: &[Option<f64>], alpha: f64, adjust: bool) -> Vec<Option<f64>> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return vec![None; values.len()];
    }

    let decay = 1.0 - alpha;
    let new_wt = if adjust { 1.0 } else { alpha };
    let mut old_wt = 1.0;
    let mut weighted: Option<f64> = None;
    let mut out = Vec::with_capacity(values.len());

    for value in values {
        match (weighted, *value) {
            (None, Some(cur)) => {
                weighted = Some(cur);
                old_wt = 1.0;
            }
            (Some(avg), cur) => {
                old_wt *= decay;
                if let Some(cur) = cur {
                    if avg != cur {
                        weighted = Some((old_wt * avg + new_wt * cur) / (old_wt + new_wt));
                    }
                    if adjust {
                        old_wt += new_wt;
                    } else {
                        old_wt = 1.0;
                    }
                }
            }
            (None, None) => {}
        }
        out.push(weighted);
    }

    out
}
