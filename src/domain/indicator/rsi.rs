//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for the average gain/loss:
//! - First average: simple mean of the first n price changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100, or 50 when there were no gains either.
//!
//! Warmup: the first n bars are undefined. A missing close makes the two
//! adjacent changes undefined; those bars report `None` and leave the running
//! averages untouched.

use super::Column;
use crate::domain::ohlcv::OhlcvBar;

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> Column {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < 2 {
        return out;
    }

    let p = period as f64;
    let mut seed_gains = 0.0;
    let mut seed_losses = 0.0;
    let mut seen = 0usize;
    let mut averages: Option<(f64, f64)> = None;

    for i in 1..bars.len() {
        let (prev, cur) = (bars[i - 1].close, bars[i].close);
        if !prev.is_finite() || !cur.is_finite() {
            continue;
        }
        let change = cur - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        averages = match averages {
            Some((avg_gain, avg_loss)) => Some((
                (avg_gain * (p - 1.0) + gain) / p,
                (avg_loss * (p - 1.0) + loss) / p,
            )),
            None => {
                seed_gains += gain;
                seed_losses += loss;
                seen += 1;
                (seen == period).then(|| (seed_gains / p, seed_losses / p))
            }
        };

        out[i] = averages.map(|(g, l)| rsi_value(g, l));
    }
    out
}
