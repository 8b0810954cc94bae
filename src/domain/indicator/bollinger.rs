//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//! - Width: (Upper - Lower) / Middle, undefined when Middle is zero
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Works on any source column, so the same code produces the raw-close bands
//! and the heiken-ashi bands.

use super::smoothing::{rolling_stddev, sma};
use super::{BandSpec, Column};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Column,
    pub middle: Column,
    pub lower: Column,
    pub width: Column,
}

pub fn calculate_bollinger(values: &[Option<f64>], spec: BandSpec) -> BollingerBands {
    let mult = spec.multiplier();
    let middle = sma(values, spec.period);
    let stddev = rolling_stddev(values, spec.period);

    let n = values.len();
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];
    let mut width = vec![None; n];
    for i in 0..n {
        let (Some(m), Some(sd)) = (middle[i], stddev[i]) else {
            continue;
        };
        let u = m + mult * sd;
        let l = m - mult * sd;
        upper[i] = Some(u);
        lower[i] = Some(l);
        width[i] = (m != 0.0).then(|| (u - l) / m);
    }

    BollingerBands {
        upper,
        middle,
        lower,
        width,
    }
}
