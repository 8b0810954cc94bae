//! Pivot-point trailing stop.
//!
//! A pivot high at bar j is a high strictly above the `strength` highs before
//! it and at least as high as the `strength` highs after it (pivot lows
//! mirror this). A pivot is only registered at bar j + strength, once the
//! bars that confirm it exist, so the line never looks ahead.
//!
//! Each confirmed pivot pulls a centre line: `centre = (2 × centre + pivot) / 3`
//! (the first pivot seeds it). Bands sit at `centre ∓ factor × ATR`:
//! - the up-level only rises while the previous close stays above it
//! - the down-level only falls while the previous close stays below it
//!
//! Trend flips to +1 when the close breaks above the previous down-level and
//! to -1 when it breaks below the previous up-level. The reported level is the
//! up-level in an uptrend and the down-level in a downtrend.

use super::atr::calculate_atr;
use super::{Column, TrailingSpec};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStopLine {
    pub level: Column,
    /// +1.0 or -1.0 once defined.
    pub trend: Column,
}

fn is_pivot_high(bars: &[OhlcvBar], j: usize, strength: usize) -> bool {
    let h = bars[j].high;
    h.is_finite()
        && bars[j - strength..j].iter().all(|b| b.high.is_finite() && h > b.high)
        && bars[j + 1..=j + strength].iter().all(|b| b.high.is_finite() && h >= b.high)
}

fn is_pivot_low(bars: &[OhlcvBar], j: usize, strength: usize) -> bool {
    let l = bars[j].low;
    l.is_finite()
        && bars[j - strength..j].iter().all(|b| b.low.is_finite() && l < b.low)
        && bars[j + 1..=j + strength].iter().all(|b| b.low.is_finite() && l <= b.low)
}

pub fn calculate_trailing_stop(bars: &[OhlcvBar], spec: TrailingSpec) -> TrailingStopLine {
    let n = bars.len();
    let mut level = vec![None; n];
    let mut trend_out = vec![None; n];
    let strength = spec.pivot_strength;
    if strength == 0 || spec.atr_period == 0 {
        return TrailingStopLine {
            level,
            trend: trend_out,
        };
    }

    let atr = calculate_atr(bars, spec.atr_period);
    let factor = spec.factor();

    let mut centre: Option<f64> = None;
    let mut up_level: Option<f64> = None;
    let mut down_level: Option<f64> = None;
    let mut trend: Option<f64> = None;

    for i in 0..n {
        if i >= 2 * strength {
            let j = i - strength;
            let pivot = if is_pivot_high(bars, j, strength) {
                Some(bars[j].high)
            } else if is_pivot_low(bars, j, strength) {
                Some(bars[j].low)
            } else {
                None
            };
            if let Some(p) = pivot {
                centre = Some(centre.map_or(p, |c| (c * 2.0 + p) / 3.0));
            }
        }

        let close = bars[i].close;
        let (Some(c), Some(a)) = (centre, atr[i]) else {
            continue;
        };
        if !close.is_finite() {
            continue;
        }
        let prev_close = if i > 0 { bars[i - 1].close } else { f64::NAN };

        let basic_up = c - factor * a;
        let basic_down = c + factor * a;
        let new_up = match up_level {
            Some(prev) if prev_close > prev => basic_up.max(prev),
            _ => basic_up,
        };
        let new_down = match down_level {
            Some(prev) if prev_close < prev => basic_down.min(prev),
            _ => basic_down,
        };

        let new_trend = match (down_level, up_level) {
            (Some(down), _) if close > down => 1.0,
            (_, Some(up)) if close < up => -1.0,
            _ => trend.unwrap_or(1.0),
        };

        up_level = Some(new_up);
        down_level = Some(new_down);
        trend = Some(new_trend);
        trend_out[i] = Some(new_trend);
        level[i] = Some(if new_trend > 0.0 { new_up } else { new_down });
    }

    TrailingStopLine {
        level,
        trend: trend_out,
    }
}
