//! Bollinger squeeze breakout with higher-timeframe confirmation.
//!
//! Setup: during the `squeeze_window` bars before the current one, band width
//! came within `squeeze_tolerance` of its minimum over `squeeze_lookback`
//! bars. Trigger: the current close crosses outside the band it was inside of
//! on the previous bar. Confirmation: on the higher timeframe ADX is at least
//! `htf_adx_threshold` and the DI lines agree with the breakout.
//!
//! Risk is the distance from entry to the middle band, floored at
//! `min_stop_distance` of the entry and padded with the spread.

use super::{
    Detector, check_non_negative, check_period, check_positive, check_range, exit_now, levels,
};
use crate::domain::error::TrendscreenError;
use crate::domain::indicator::{BandSpec, IndicatorType};
use crate::domain::series::Timeframes;
use crate::domain::signal::{Direction, ExitReason, ExitSignal, Signal};

pub const NAME: &str = "squeeze_breakout";

#[derive(Debug, Clone, PartialEq)]
pub struct SqueezeBreakoutParams {
    pub bb_period: usize,
    pub bb_stddev: f64,
    pub squeeze_lookback: usize,
    pub squeeze_window: usize,
    /// Allowed excess over the rolling minimum width, as a fraction.
    pub squeeze_tolerance: f64,
    pub higher_timeframe: String,
    pub htf_adx_period: usize,
    pub htf_adx_threshold: f64,
    /// Without higher-timeframe data the signal is dropped unless this is false.
    pub require_higher_timeframe: bool,
    /// Smallest stop distance as a fraction of the entry price.
    pub min_stop_distance: f64,
}

impl Default for SqueezeBreakoutParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_stddev: 2.0,
            squeeze_lookback: 60,
            squeeze_window: 5,
            squeeze_tolerance: 0.10,
            higher_timeframe: "1w".to_string(),
            htf_adx_period: 14,
            htf_adx_threshold: 20.0,
            require_higher_timeframe: true,
            min_stop_distance: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqueezeBreakout {
    params: SqueezeBreakoutParams,
    bands: BandSpec,
}

impl SqueezeBreakout {
    pub fn new(params: SqueezeBreakoutParams) -> Result<Self, TrendscreenError> {
        check_period("bb_period", params.bb_period)?;
        check_period("squeeze_lookback", params.squeeze_lookback)?;
        check_period("squeeze_window", params.squeeze_window)?;
        check_period("htf_adx_period", params.htf_adx_period)?;
        check_positive("bb_stddev", params.bb_stddev)?;
        check_non_negative("squeeze_tolerance", params.squeeze_tolerance)?;
        check_range("htf_adx_threshold", params.htf_adx_threshold, 0.0, 100.0)?;
        check_positive("min_stop_distance", params.min_stop_distance)?;
        if params.squeeze_window >= params.squeeze_lookback {
            return Err(TrendscreenError::invalid_config(
                "strategy",
                "squeeze_window",
                "must be shorter than squeeze_lookback",
            ));
        }
        if params.higher_timeframe.trim().is_empty() {
            return Err(TrendscreenError::invalid_config(
                "strategy",
                "higher_timeframe",
                "must name a timeframe",
            ));
        }
        let bands = BandSpec::new(params.bb_period, params.bb_stddev);
        Ok(Self { params, bands })
    }

    pub fn params(&self) -> &SqueezeBreakoutParams {
        &self.params
    }

    fn upper(&self) -> IndicatorType {
        IndicatorType::BollingerUpper(self.bands)
    }

    fn middle(&self) -> IndicatorType {
        IndicatorType::BollingerMiddle(self.bands)
    }

    fn lower(&self) -> IndicatorType {
        IndicatorType::BollingerLower(self.bands)
    }

    fn width(&self) -> IndicatorType {
        IndicatorType::BollingerWidth(self.bands)
    }

    /// (recent minimum, lookback minimum, lookback mean) of band width,
    /// all measured before the current bar.
    fn width_stats(&self, widths: &[f64]) -> (f64, f64, f64) {
        let history = &widths[..widths.len() - 1];
        let recent = &history[history.len() - self.params.squeeze_window..];
        let recent_min = recent.iter().copied().fold(f64::INFINITY, f64::min);
        let lookback_min = history.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        (recent_min, lookback_min, mean)
    }
}

impl Detector for SqueezeBreakout {
    fn name(&self) -> &'static str {
        NAME
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        vec![self.upper(), self.middle(), self.lower(), self.width()]
    }

    fn higher_timeframe(&self) -> Option<&str> {
        Some(&self.params.higher_timeframe)
    }

    fn higher_timeframe_indicators(&self) -> Vec<IndicatorType> {
        let p = self.params.htf_adx_period;
        vec![
            IndicatorType::PlusDi(p),
            IndicatorType::MinusDi(p),
            IndicatorType::Adx(p),
        ]
    }

    fn min_bars(&self) -> usize {
        self.params.bb_period + self.params.squeeze_lookback
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

        let widths = view.window(&self.width(), p.squeeze_lookback + 1)?;
        let (recent_min, lookback_min, mean_width) = self.width_stats(&widths);
        let squeezed = recent_min <= lookback_min * (1.0 + p.squeeze_tolerance);
        if !squeezed {
            return None;
        }

        let upper = view.latest(&self.upper())?;
        let lower = view.latest(&self.lower())?;
        let middle = view.latest(&self.middle())?;
        let prev_upper = view.back(&self.upper(), 1)?;
        let prev_lower = view.back(&self.lower(), 1)?;
        let close = view.close();
        let prev_close = view.bar_back(1)?.close;
        if !close.is_finite() || !prev_close.is_finite() {
            return None;
        }

        let direction = if close > upper && prev_close <= prev_upper {
            Direction::Buy
        } else if close < lower && prev_close >= prev_lower {
            Direction::Sell
        } else {
            return None;
        };

        let htf_adx = match data.higher(&p.higher_timeframe) {
            Some(h) => {
                let q = p.htf_adx_period;
                let adx = h.latest(&IndicatorType::Adx(q))?;
                let plus = h.latest(&IndicatorType::PlusDi(q))?;
                let minus = h.latest(&IndicatorType::MinusDi(q))?;
                let agrees = match direction {
                    Direction::Buy => plus > minus,
                    _ => minus > plus,
                };
                if adx < p.htf_adx_threshold || !agrees {
                    return None;
                }
                Some(adx)
            }
            None if p.require_higher_timeframe => return None,
            None => None,
        };

        let tightness = if mean_width > 0.0 { 1.0 - recent_min / mean_width } else { 0.0 };
        let band = if direction == Direction::Buy { upper } else { lower };
        let excess_pct = (close - band).abs() / close * 100.0;
        let mut score = 50.0;
        score += (tightness * 30.0).clamp(0.0, 20.0);
        score += (excess_pct * 10.0).min(15.0);
        if let Some(adx) = htf_adx {
            score += ((adx - p.htf_adx_threshold) * 0.5).clamp(0.0, 15.0);
        }

        let risk = (close - middle).abs().max(close * p.min_stop_distance) + spread;
        let (stop, target) = levels(direction, close, risk, target_reward_risk);

        let mut snapshot = view.snapshot(&self.required_indicators());
        if let Some(adx) = htf_adx {
            snapshot.insert(format!("{}:ADX({})", p.higher_timeframe, p.htf_adx_period), adx);
        }

        Some(
            Signal::new(instrument, NAME, direction, score, view.timestamp(), close)
                .with_stop_loss(stop)
                .with_take_profit(target)
                .with_indicators(snapshot)
                .with_conditions([
                    ("squeeze", true),
                    ("band_breakout", true),
                    ("higher_timeframe_confirmed", htf_adx.is_some()),
                ]),
        )
    }

    fn check_exit(
        &self,
        data: &Timeframes<'_>,
        direction: Direction,
        _entry_price: f64,
    ) -> Option<ExitSignal> {
        let view = &data.base;
        let middle = view.latest(&self.middle())?;
        let close = view.close();
        let failed = match direction {
            Direction::Buy => close < middle,
            Direction::Sell => close > middle,
            Direction::Hold => false,
        };
        failed.then(|| exit_now(view, ExitReason::TrendReversal))
    }
}
