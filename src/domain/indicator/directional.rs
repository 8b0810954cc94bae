//! Directional movement: +DI, -DI, DX and ADX.
//!
//! 1. +DM = max(high - prev_high, 0) when it beats the down move, else 0;
//!    -DM = max(prev_low - low, 0) when it beats the up move, else 0.
//! 2. Wilder-smooth +DM, -DM and TR.
//! 3. DI± = 100 × smoothed DM / smoothed TR (undefined while TR smoothing
//!    warms up or when it is zero).
//! 4. DX = 100 × |DI+ - DI-| / (DI+ + DI-), 0 when both are 0.
//! 5. ADX = SMA(DX, period).
//!
//! DI is first defined at position `period`, ADX at `2 * period - 1`.

use super::Column;
use super::atr::true_range;
use super::smoothing::{sma, wilder};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct Directional {
    pub plus_di: Column,
    pub minus_di: Column,
    pub dx: Column,
    pub adx: Column,
}

/// Raw +DM / -DM. Position 0 has no previous bar and is undefined.
pub fn directional_movement(bars: &[OhlcvBar]) -> (Column, Column) {
    let n = bars.len();
    let mut plus = vec![None; n];
    let mut minus = vec![None; n];
    for i in 1..n {
        let (cur, prev) = (&bars[i], &bars[i - 1]);
        if ![cur.high, cur.low, prev.high, prev.low].iter().all(|v| v.is_finite()) {
            continue;
        }
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        plus[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }
    (plus, minus)
}

pub fn calculate_directional(bars: &[OhlcvBar], period: usize) -> Directional {
    let n = bars.len();
    let (plus_dm, minus_dm) = directional_movement(bars);
    let smooth_tr = wilder(&true_range(bars), period);
    let smooth_plus = wilder(&plus_dm, period);
    let smooth_minus = wilder(&minus_dm, period);

    let mut plus_di = vec![None; n];
    let mut minus_di = vec![None; n];
    let mut dx = vec![None; n];
    for i in 0..n {
        let (Some(tr), Some(p), Some(m)) = (smooth_tr[i], smooth_plus[i], smooth_minus[i]) else {
            continue;
        };
        if tr == 0.0 {
            continue;
        }
        let pdi = 100.0 * p / tr;
        let mdi = 100.0 * m / tr;
        let sum = pdi + mdi;
        plus_di[i] = Some(pdi);
        minus_di[i] = Some(mdi);
        dx[i] = Some(if sum == 0.0 { 0.0 } else { 100.0 * (pdi - mdi).abs() / sum });
    }

    let adx = sma(&dx, period);
    Directional {
        plus_di,
        minus_di,
        dx,
        adx,
    }
}
