//! Bollinger/RSI mean-reversion detector.
//!
//! BUY when the price closes below the lower band while RSI is oversold;
//! SELL when it closes above the upper band while RSI is overbought. With
//! `use_heiken_ashi` the heiken-ashi close is tested against bands built on
//! heiken-ashi closes, which filters out single-bar noise.
//!
//! Score = 50 + RSI extremeness × 1.5 (≤ 25) + distance outside the band as a
//! percentage of band width (≤ 25).
//!
//! Exit on the profit target or when the close reverts to the middle band.

use super::{Detector, check_period, check_positive, check_range, exit_now, levels};
use crate::domain::error::TrendscreenError;
use crate::domain::indicator::{BandSpec, IndicatorType};
use crate::domain::series::Timeframes;
use crate::domain::signal::{Direction, ExitReason, ExitSignal, Signal};

pub const NAME: &str = "mean_reversion";

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversionParams {
    pub bb_period: usize,
    pub bb_stddev: f64,
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    /// Profit target as a fraction of the entry price (0.05 = 5%).
    pub profit_target: f64,
    pub atr_period: usize,
    pub stop_atr_multiple: f64,
    pub use_heiken_ashi: bool,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_stddev: 2.0,
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            profit_target: 0.05,
            atr_period: 14,
            stop_atr_multiple: 1.5,
            use_heiken_ashi: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeanReversion {
    params: MeanReversionParams,
    bands: BandSpec,
}

struct Bands {
    upper: IndicatorType,
    middle: IndicatorType,
    lower: IndicatorType,
    price: Option<IndicatorType>,
}

impl MeanReversion {
    pub fn new(params: MeanReversionParams) -> Result<Self, TrendscreenError> {
        check_period("bb_period", params.bb_period)?;
        check_period("rsi_period", params.rsi_period)?;
        check_period("atr_period", params.atr_period)?;
        check_positive("bb_stddev", params.bb_stddev)?;
        check_range("oversold", params.oversold, 0.0, 100.0)?;
        check_range("overbought", params.overbought, 0.0, 100.0)?;
        if params.oversold >= params.overbought {
            return Err(TrendscreenError::invalid_config(
                "strategy",
                "oversold",
                "must be below overbought",
            ));
        }
        check_positive("profit_target", params.profit_target)?;
        check_positive("stop_atr_multiple", params.stop_atr_multiple)?;
        let bands = BandSpec::new(params.bb_period, params.bb_stddev);
        Ok(Self { params, bands })
    }

    pub fn params(&self) -> &MeanReversionParams {
        &self.params
    }

    fn band_types(&self) -> Bands {
        let b = self.bands;
        if self.params.use_heiken_ashi {
            Bands {
                upper: IndicatorType::HaBollingerUpper(b),
                middle: IndicatorType::HaBollingerMiddle(b),
                lower: IndicatorType::HaBollingerLower(b),
                price: Some(IndicatorType::HaClose),
            }
        } else {
            Bands {
                upper: IndicatorType::BollingerUpper(b),
                middle: IndicatorType::BollingerMiddle(b),
                lower: IndicatorType::BollingerLower(b),
                price: None,
            }
        }
    }

    fn rsi(&self) -> IndicatorType {
        IndicatorType::Rsi(self.params.rsi_period)
    }

    fn atr(&self) -> IndicatorType {
        IndicatorType::Atr(self.params.atr_period)
    }
}

impl Detector for MeanReversion {
    fn name(&self) -> &'static str {
        NAME
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        let bands = self.band_types();
        let mut types = vec![bands.upper, bands.middle, bands.lower, self.rsi(), self.atr()];
        types.extend(bands.price);
        types
    }

    fn analyze(
        &self,
        data: &Timeframes<'_>,
        instrument: &str,
        target_reward_risk: f64,
        spread: f64,
    ) -> Option<Signal> {
        let view = &data.base;
        let p = &self.params;
        if view.len() < self.min_bars() {
            return None;
        }

        let bands = self.band_types();
        let upper = view.latest(&bands.upper)?;
        let lower = view.latest(&bands.lower)?;
        let rsi = view.latest(&self.rsi())?;
        let atr = view.latest(&self.atr())?;
        let close = view.close();
        let price = match &bands.price {
            Some(ty) => view.latest(ty)?,
            None => close,
        };
        if !close.is_finite() {
            return None;
        }

        let below = price < lower;
        let above = price > upper;
        let oversold = rsi < p.oversold;
        let overbought = rsi > p.overbought;
        let (direction, extremeness, outside) = if below && oversold {
            (Direction::Buy, p.oversold - rsi, lower - price)
        } else if above && overbought {
            (Direction::Sell, rsi - p.overbought, price - upper)
        } else {
            return None;
        };

        let width = upper - lower;
        let band_distance = if width > 0.0 { outside / width * 100.0 } else { 0.0 };
        let score = 50.0 + (extremeness * 1.5).min(25.0) + band_distance.min(25.0);

        let risk = atr * p.stop_atr_multiple + spread;
        let (stop, target) = levels(direction, close, risk, target_reward_risk);

        Some(
            Signal::new(instrument, NAME, direction, score, view.timestamp(), close)
                .with_stop_loss(stop)
                .with_take_profit(target)
                .with_indicators(view.snapshot(&self.required_indicators()))
                .with_conditions([
                    ("outside_band", true),
                    ("rsi_extreme", true),
                    ("heiken_ashi", p.use_heiken_ashi),
                ]),
        )
    }

    fn check_exit(
        &self,
        data: &Timeframes<'_>,
        direction: Direction,
        entry_price: f64,
    ) -> Option<ExitSignal> {
        let view = &data.base;
        let close = view.close();
        if !close.is_finite() || entry_price <= 0.0 {
            return None;
        }
        let sign = direction.sign();
        if sign == 0.0 {
            return None;
        }
        let gain = (close - entry_price) / entry_price * sign;
        if gain >= self.params.profit_target {
            return Some(exit_now(view, ExitReason::ProfitTarget));
        }
        let middle = view.latest(&self.band_types().middle)?;
        let reverted = (close - middle) * sign >= 0.0;
        reverted.then(|| exit_now(view, ExitReason::MeanReversion))
    }
}
