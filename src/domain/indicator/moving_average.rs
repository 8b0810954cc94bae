//! SMA and EMA over a selectable price field.
//!
//! Warmup: the first (period - 1) positions are undefined.

use super::smoothing::{ema, sma};
use super::{Column, PriceField, source_values};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize, source: PriceField) -> Column {
    sma(&source_values(bars, source), period)
}

pub fn calculate_ema(bars: &[OhlcvBar], period: usize, source: PriceField) -> Column {
    ema(&source_values(bars, source), period)
}
