//! Triple-confirmation detector.
//!
//! BUY requires all of (SELL mirrored):
//! 1. market-structure code of +1 or +2
//! 2. pivot trailing-stop trend flipped to +1 within the last `flip_window` bars
//! 3. short RSI crossed above the midline within the last `cross_window` bars
//!
//! When `higher_timeframe` is set, the trailing trend on that timeframe must
//! also be +1. The stop sits at the trailing level padded by the spread.

use super::{Detector, check_period, check_positive, check_range, exit_now, levels};
use crate::domain::error::TrendscreenError;
use crate::domain::indicator::{IndicatorType, TrailingSpec};
use crate::domain::series::{SeriesView, Timeframes};
use crate::domain::signal::{Direction, ExitReason, ExitSignal, Signal};

pub const NAME: &str = "triple_confirmation";

#[derive(Debug, Clone, PartialEq)]
pub struct TripleConfirmationParams {
    pub structure_lookback: usize,
    pub pivot_strength: usize,
    pub trail_atr_period: usize,
    pub trail_factor: f64,
    pub flip_window: usize,
    pub rsi_period: usize,
    pub rsi_midline: f64,
    pub cross_window: usize,
    pub higher_timeframe: Option<String>,
}

impl Default for TripleConfirmationParams {
    fn default() -> Self {
        Self {
            structure_lookback: 50,
            pivot_strength: 2,
            trail_atr_period: 10,
            trail_factor: 3.0,
            flip_window: 3,
            rsi_period: 5,
            rsi_midline: 50.0,
            cross_window: 3,
            higher_timeframe: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TripleConfirmation {
    params: TripleConfirmationParams,
    trail: TrailingSpec,
}

impl TripleConfirmation {
    pub fn new(params: TripleConfirmationParams) -> Result<Self, TrendscreenError> {
        check_period("structure_lookback", params.structure_lookback)?;
        check_period("pivot_strength", params.pivot_strength)?;
        check_period("trail_atr_period", params.trail_atr_period)?;
        check_period("flip_window", params.flip_window)?;
        check_period("rsi_period", params.rsi_period)?;
        check_period("cross_window", params.cross_window)?;
        check_positive("trail_factor", params.trail_factor)?;
        check_range("rsi_midline", params.rsi_midline, 0.0, 100.0)?;
        let trail = TrailingSpec::new(params.pivot_strength, params.trail_atr_period, params.trail_factor);
        Ok(Self { params, trail })
    }

    pub fn params(&self) -> &TripleConfirmationParams {
        &self.params
    }

    fn structure(&self) -> IndicatorType {
        IndicatorType::StructureTrend(self.params.structure_lookback)
    }

    fn trend(&self) -> IndicatorType {
        IndicatorType::TrailingTrend(self.trail)
    }

    fn level(&self) -> IndicatorType {
        IndicatorType::TrailingStop(self.trail)
    }

    fn rsi(&self) -> IndicatorType {
        IndicatorType::Rsi(self.params.rsi_period)
    }

    /// Trend switched to `sign` on one of the last `flip_window` bars.
    fn recent_flip(&self, view: &SeriesView<'_>, sign: f64) -> bool {
        (0..self.params.flip_window).any(|k| {
            matches!(
                (view.back(&self.trend(), k), view.back(&self.trend(), k + 1)),
                (Some(now), Some(before)) if now == sign && before == -sign
            )
        })
    }

    /// RSI crossed the midline towards `sign` on one of the last `cross_window` bars.
    fn recent_cross(&self, view: &SeriesView<'_>, sign: f64) -> bool {
        let mid = self.params.rsi_midline;
        (0..self.params.cross_window).any(|k| {
            match (view.back(&self.rsi(), k), view.back(&self.rsi(), k + 1)) {
                (Some(now), Some(before)) => {
                    (now - mid) * sign > 0.0 && (before - mid) * sign <= 0.0
                }
                _ => false,
            }
        })
    }
}

impl Detector for TripleConfirmation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        vec![self.structure(), self.trend(), self.level(), self.rsi()]
    }

    fn higher_timeframe(&self) -> Option<&str> {
        self.params.higher_timeframe.as_deref()
    }

    fn higher_timeframe_indicators(&self) -> Vec<IndicatorType> {
        match self.params.higher_timeframe {
            Some(_) => vec![self.trend()],
            None => Vec::new(),
        }
    }

    fn analyze(
        &self,
        data: &Timeframes<'_>,
        instrument: &str,
        target_reward_risk: f64,
        spread: f64,
    ) -> Option<Signal> {
        let view = &data.base;
        if view.len() < self.min_bars() {
            return None;
        }

        let code = view.latest(&self.structure())?;
        let trend = view.latest(&self.trend())?;
        let level = view.latest(&self.level())?;
        let rsi = view.latest(&self.rsi())?;
        let close = view.close();
        if !close.is_finite() {
            return None;
        }

        let direction = if code >= 1.0 && trend > 0.0 {
            Direction::Buy
        } else if code <= -1.0 && trend < 0.0 {
            Direction::Sell
        } else {
            return None;
        };
        let sign = direction.sign();

        if !self.recent_flip(view, sign) || !self.recent_cross(view, sign) {
            return None;
        }

        let htf_agrees = match &self.params.higher_timeframe {
            Some(label) => {
                let h = data.higher(label)?;
                if h.latest(&self.trend())? != sign {
                    return None;
                }
                true
            }
            None => false,
        };

        let risk = (close - level) * sign + spread;
        if risk <= 0.0 {
            return None;
        }
        let (stop, target) = levels(direction, close, risk, target_reward_risk);

        let mut score = 50.0;
        score += if code.abs() >= 2.0 { 20.0 } else { 10.0 };
        if htf_agrees {
            score += 15.0;
        }
        score += ((rsi - self.params.rsi_midline) * sign * 0.5).clamp(0.0, 15.0);

        Some(
            Signal::new(instrument, NAME, direction, score, view.timestamp(), close)
                .with_stop_loss(stop)
                .with_take_profit(target)
                .with_indicators(view.snapshot(&self.required_indicators()))
                .with_conditions([
                    ("structure_aligned", true),
                    ("trailing_flip", true),
                    ("rsi_cross", true),
                    ("higher_timeframe_aligned", htf_agrees),
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
        let trend = view.latest(&self.trend())?;
        let against = match direction {
            Direction::Buy => trend < 0.0,
            Direction::Sell => trend > 0.0,
            Direction::Hold => false,
        };
        against.then(|| exit_now(view, ExitReason::TrendReversal))
    }
}
