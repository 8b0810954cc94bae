//! OHLCV bar representation.
//!
//! Prices are plain `f64`. A non-finite price is treated as a missing value
//! and flows through the indicator engine as "undefined"; a finite but
//! impossible bar (high below low, negative prices) is a structural error.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (open + high + low + close) / 4
    pub fn average_price(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// True when all four prices are finite.
    pub fn is_complete(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }

    /// Checks the OHLC relationship. Missing (non-finite) values are tolerated.
    pub fn check_structure(&self) -> Result<(), String> {
        if self.high.is_finite() && self.low.is_finite() && self.high < self.low {
            return Err(format!("high {} < low {}", self.high, self.low));
        }
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (field, value) in prices {
            if value.is_finite() && value < 0.0 {
                return Err(format!("negative {field} {value}"));
            }
        }
        Ok(())
    }
}
