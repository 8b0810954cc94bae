//! Heiken-ashi candles.
//!
//! - HA_close = (open + high + low + close) / 4
//! - HA_open[0] = (open + close) / 2, HA_open[i] = (HA_open[i-1] + HA_close[i-1]) / 2
//! - HA_high = max(high, HA_open, HA_close), HA_low = min(low, HA_open, HA_close)
//!
//! An incomplete bar leaves all four values undefined; the next complete bar
//! reseeds HA_open from its own open and close.

use super::Column;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct HeikenAshi {
    pub open: Column,
    pub high: Column,
    pub low: Column,
    pub close: Column,
}

pub fn calculate_heiken_ashi(bars: &[OhlcvBar]) -> HeikenAshi {
    let n = bars.len();
    let mut ha = HeikenAshi {
        open: vec![None; n],
        high: vec![None; n],
        low: vec![None; n],
        close: vec![None; n],
    };

    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_complete() {
            continue;
        }
        let close = bar.average_price();
        let prev = if i > 0 {
            ha.open[i - 1].zip(ha.close[i - 1])
        } else {
            None
        };
        let open = match prev {
            Some((o, c)) => (o + c) / 2.0,
            None => (bar.open + bar.close) / 2.0,
        };
        ha.open[i] = Some(open);
        ha.close[i] = Some(close);
        ha.high[i] = Some(bar.high.max(open).max(close));
        ha.low[i] = Some(bar.low.min(open).min(close));
    }
    ha
}
