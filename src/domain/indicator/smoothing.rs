//! Smoothing primitives shared by the indicators.
//!
//! All functions take and return columns of `Option<f64>`. An undefined input
//! yields an undefined output at that position.

use super::Column;

/// Simple moving average. Undefined unless the whole window is defined.
pub fn sma(values: &[Option<f64>], period: usize) -> Column {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let sum: Option<f64> = window.iter().copied().sum();
        out[i] = sum.map(|s| s / period as f64);
    }
    out
}

/// Exponential moving average with alpha = 2 / (period + 1), seeded with the
/// SMA of the first fully defined window.
pub fn ema(values: &[Option<f64>], period: usize) -> Column {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seeds = sma(values, period);
    let mut state: Option<f64> = None;
    for (i, value) in values.iter().enumerate() {
        match (state, *value) {
            (None, _) => {
                state = seeds[i];
                out[i] = state;
            }
            (Some(prev), Some(x)) => {
                state = Some(prev + alpha * (x - prev));
                out[i] = state;
            }
            (Some(_), None) => {}
        }
    }
    out
}

/// Wilder's recursive smoothing `s = s + (x - s) / period`, seeded with the
/// first defined input. Output is withheld until `period` defined inputs have
/// been consumed.
pub fn wilder(values: &[Option<f64>], period: usize) -> Column {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let p = period as f64;
    let mut state: Option<f64> = None;
    let mut seen = 0usize;
    for (i, value) in values.iter().enumerate() {
        let Some(x) = *value else { continue };
        state = Some(match state {
            None => x,
            Some(s) => s + (x - s) / p,
        });
        seen += 1;
        if seen >= period {
            out[i] = state;
        }
    }
    out
}

/// Population standard deviation over a rolling window.
pub fn rolling_stddev(values: &[Option<f64>], period: usize) -> Column {
    let means = sma(values, period);
    let mut out = vec![None; values.len()];
    for (i, mean) in means.iter().enumerate() {
        let Some(mean) = *mean else { continue };
        let window = &values[i + 1 - period..=i];
        let variance = window
            .iter()
            .flatten()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / period as f64;
        out[i] = Some(variance.sqrt());
    }
    out
}
