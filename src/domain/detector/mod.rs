//! Strategy detectors.
//!
//! A detector looks at an instrument's augmented history up to the current
//! bar and either emits a `Signal` or nothing. Parameters are validated and
//! bound when the detector is built, so evaluation never fails: missing
//! history or an undefined indicator value simply yields `None`.
//!
//! The set of detectors is closed; `StrategyKind` dispatches over all of them.

pub mod mean_reversion;
pub mod squeeze_breakout;
pub mod trend_following;
pub mod triple_confirmation;

pub use mean_reversion::{MeanReversion, MeanReversionParams};
pub use squeeze_breakout::{SqueezeBreakout, SqueezeBreakoutParams};
pub use trend_following::{TrendFollowing, TrendFollowingParams};
pub use triple_confirmation::{TripleConfirmation, TripleConfirmationParams};

use crate::domain::error::TrendscreenError;
use crate::domain::indicator::IndicatorType;
use crate::domain::series::{SeriesView, Timeframes};
use crate::domain::signal::{Direction, ExitReason, ExitSignal, Signal};

pub trait Detector {
    fn name(&self) -> &'static str;

    /// Indicators the base timeframe must carry.
    fn required_indicators(&self) -> Vec<IndicatorType>;

    /// Label of the higher timeframe this detector consults, if any.
    fn higher_timeframe(&self) -> Option<&str> {
        None
    }

    fn higher_timeframe_indicators(&self) -> Vec<IndicatorType> {
        Vec::new()
    }

    /// Fewest base bars for which `analyze` can produce anything.
    fn min_bars(&self) -> usize {
        self.required_indicators()
            .iter()
            .map(IndicatorType::lookback)
            .max()
            .unwrap_or(1)
    }

    fn analyze(
        &self,
        data: &Timeframes<'_>,
        instrument: &str,
        target_reward_risk: f64,
        spread: f64,
    ) -> Option<Signal>;

    fn check_exit(
        &self,
        data: &Timeframes<'_>,
        direction: Direction,
        entry_price: f64,
    ) -> Option<ExitSignal>;
}

#[derive(Debug, Clone)]
pub enum StrategyKind {
    TrendFollowing(TrendFollowing),
    MeanReversion(MeanReversion),
    SqueezeBreakout(SqueezeBreakout),
    TripleConfirmation(TripleConfirmation),
}

impl StrategyKind {
    pub const NAMES: [&'static str; 4] = [
        trend_following::NAME,
        mean_reversion::NAME,
        squeeze_breakout::NAME,
        triple_confirmation::NAME,
    ];

    fn inner(&self) -> &dyn Detector {
        match self {
            StrategyKind::TrendFollowing(d) => d,
            StrategyKind::MeanReversion(d) => d,
            StrategyKind::SqueezeBreakout(d) => d,
            StrategyKind::TripleConfirmation(d) => d,
        }
    }
}

impl Detector for StrategyKind {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        self.inner().required_indicators()
    }

    fn higher_timeframe(&self) -> Option<&str> {
        self.inner().higher_timeframe()
    }

    fn higher_timeframe_indicators(&self) -> Vec<IndicatorType> {
        self.inner().higher_timeframe_indicators()
    }

    fn min_bars(&self) -> usize {
        self.inner().min_bars()
    }

    fn analyze(
        &self,
        data: &Timeframes<'_>,
        instrument: &str,
        target_reward_risk: f64,
        spread: f64,
    ) -> Option<Signal> {
        self.inner().analyze(data, instrument, target_reward_risk, spread)
    }

    fn check_exit(
        &self,
        data: &Timeframes<'_>,
        direction: Direction,
        entry_price: f64,
    ) -> Option<ExitSignal> {
        self.inner().check_exit(data, direction, entry_price)
    }
}

impl From<TrendFollowing> for StrategyKind {
    fn from(d: TrendFollowing) -> Self {
        StrategyKind::TrendFollowing(d)
    }
}

impl From<MeanReversion> for StrategyKind {
    fn from(d: MeanReversion) -> Self {
        StrategyKind::MeanReversion(d)
    }
}

impl From<SqueezeBreakout> for StrategyKind {
    fn from(d: SqueezeBreakout) -> Self {
        StrategyKind::SqueezeBreakout(d)
    }
}

impl From<TripleConfirmation> for StrategyKind {
    fn from(d: TripleConfirmation) -> Self {
        StrategyKind::TripleConfirmation(d)
    }
}

const SECTION: &str = "strategy";

pub(crate) fn check_period(key: &str, value: usize) -> Result<(), TrendscreenError> {
    if value == 0 {
        return Err(TrendscreenError::invalid_config(SECTION, key, "must be a positive integer"));
    }
    Ok(())
}

pub(crate) fn check_positive(key: &str, value: f64) -> Result<(), TrendscreenError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrendscreenError::invalid_config(
            SECTION,
            key,
            format!("must be a positive number, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_non_negative(key: &str, value: f64) -> Result<(), TrendscreenError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrendscreenError::invalid_config(
            SECTION,
            key,
            format!("must be zero or more, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_range(key: &str, value: f64, low: f64, high: f64) -> Result<(), TrendscreenError> {
    if !value.is_finite() || value < low || value > high {
        return Err(TrendscreenError::invalid_config(
            SECTION,
            key,
            format!("must be between {low} and {high}, got {value}"),
        ));
    }
    Ok(())
}

/// Stop and target for an entry given the risk distance (already padded).
pub(crate) fn levels(direction: Direction, entry: f64, risk: f64, reward_risk: f64) -> (f64, f64) {
    let sign = direction.sign();
    (entry - sign * risk, entry + sign * risk * reward_risk)
}

pub(crate) fn exit_now(view: &SeriesView<'_>, reason: ExitReason) -> ExitSignal {
    ExitSignal {
        reason,
        price: view.close(),
        timestamp: view.timestamp(),
    }
}
