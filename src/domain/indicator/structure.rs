//! Market-structure trend code.
//!
//! Over a rolling `lookback` window the swing high H and swing low L are
//! found. If H came after L the current leg is up and the retracement is
//! `(H - close) / (H - L)`; otherwise the leg is down and the retracement is
//! `(close - L) / (H - L)`. Shallow retracements mean a strong trend:
//!
//! | retracement | code |
//! |-------------|------|
//! | < 0.382     | ±2   |
//! | < 0.618     | ±1   |
//! | otherwise   | 0    |
//!
//! Positive codes are up legs. A flat window (H == L) reports 0.

use super::Column;
use crate::domain::ohlcv::OhlcvBar;

const SHALLOW: f64 = 0.382;
const DEEP: f64 = 0.618;

fn code_for(window: &[OhlcvBar]) -> Option<f64> {
    let mut hi = (0usize, f64::NEG_INFINITY);
    let mut lo = (0usize, f64::INFINITY);
    for (k, bar) in window.iter().enumerate() {
        if !bar.high.is_finite() || !bar.low.is_finite() {
            return None;
        }
        if bar.high >= hi.1 {
            hi = (k, bar.high);
        }
        if bar.low <= lo.1 {
            lo = (k, bar.low);
        }
    }
    let close = window.last()?.close;
    if !close.is_finite() {
        return None;
    }
    let range = hi.1 - lo.1;
    if range <= 0.0 {
        return Some(0.0);
    }

    let up_leg = match hi.0.cmp(&lo.0) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => close >= (hi.1 + lo.1) / 2.0,
    };
    let retracement = if up_leg {
        (hi.1 - close) / range
    } else {
        (close - lo.1) / range
    };
    let magnitude = if retracement < SHALLOW {
        2.0
    } else if retracement < DEEP {
        1.0
    } else {
        0.0
    };
    Some(if up_leg { magnitude } else { -magnitude })
}

pub fn calculate_structure_trend(bars: &[OhlcvBar], lookback: usize) -> Column {
    let mut out = vec![None; bars.len()];
    if lookback == 0 {
        return out;
    }
    for i in (lookback - 1)..bars.len() {
        out[i] = code_for(&bars[i + 1 - lookback..=i]);
    }
    out
}
