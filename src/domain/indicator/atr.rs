//! True range, ATR and ATR%.
//!
//! TR[0] = high - low; TR[i] uses the previous close. ATR is the Wilder
//! smoothing of TR and is undefined for the first (period - 1) bars.

use super::Column;
use super::smoothing::wilder;
use crate::domain::ohlcv::OhlcvBar;

pub fn true_range(bars: &[OhlcvBar]) -> Column {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if !bar.high.is_finite() || !bar.low.is_finite() {
                return None;
            }
            if i == 0 {
                return Some(bar.high - bar.low);
            }
            let prev_close = bars[i - 1].close;
            prev_close.is_finite().then(|| bar.true_range(prev_close))
        })
        .collect()
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> Column {
    wilder(&true_range(bars), period)
}

/// ATR as a percentage of the close (5.0 means 5%).
pub fn atr_pct(bars: &[OhlcvBar], atr: &[Option<f64>]) -> Column {
    bars.iter()
        .zip(atr)
        .map(|(bar, atr)| match atr {
            Some(a) if bar.close.is_finite() && bar.close != 0.0 => Some(a / bar.close * 100.0),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_hlc;

    #[test]
    fn first_true_range_is_high_minus_low() {
        let bars = make_hlc(&[(12.0, 9.0, 10.0), (15.0, 11.0, 14.0)]);
        let tr = true_range(&bars);
        assert!((tr[0].unwrap() - 3.0).abs() < f64::EPSILON);
        // max(4, |15-10|, |11-10|) = 5
        assert!((tr[1].unwrap() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn atr_warmup_and_constant_range() {
        let rows: Vec<(f64, f64, f64)> = (0..10).map(|_| (11.0, 9.0, 10.0)).collect();
        let atr = calculate_atr(&make_hlc(&rows), 4);
        assert!(atr[2].is_none());
        for v in atr.iter().skip(3) {
            assert!((v.unwrap() - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn atr_pct_scales_by_close() {
        let rows: Vec<(f64, f64, f64)> = (0..5).map(|_| (11.0, 9.0, 10.0)).collect();
        let bars = make_hlc(&rows);
        let atr = calculate_atr(&bars, 2);
        let pct = atr_pct(&bars, &atr);
        assert!((pct[4].unwrap() - 20.0).abs() < 1e-12);
        assert!(pct[0].is_none());
    }

    #[test]
    fn missing_bar_has_no_true_range() {
        let mut bars = make_hlc(&[(12.0, 9.0, 10.0), (15.0, 11.0, 14.0)]);
        bars[1].high = f64::NAN;
        assert!(true_range(&bars)[1].is_none());
    }
}
