//! Trading signals, exit signals and ranking.
//!
//! Signals are values: once a detector hands one out it is never changed.
//! Every signal carries the indicator snapshot and the boolean conditions it
//! was based on, so a report can explain why it fired.

use crate::domain::series::IndicatorSnapshot;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    /// +1 for BUY, -1 for SELL, 0 for HOLD.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
            Direction::Hold => 0.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
            Direction::Hold => Direction::Hold,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
            Direction::Hold => "HOLD",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    ProfitTarget,
    TrendReversal,
    MeanReversion,
    StopLoss,
    TimeLimit,
    EndOfBacktest,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::TrendReversal => "trend_reversal",
            ExitReason::MeanReversion => "mean_reversion",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TimeLimit => "time_limit",
            ExitReason::EndOfBacktest => "end_of_backtest",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub strategy: String,
    pub direction: Direction,
    /// Confidence in [0, 100].
    pub score: f64,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub indicators: IndicatorSnapshot,
    pub conditions: BTreeMap<String, bool>,
}

impl Signal {
    pub fn new(
        instrument: impl Into<String>,
        strategy: impl Into<String>,
        direction: Direction,
        score: f64,
        timestamp: NaiveDateTime,
        price: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            strategy: strategy.into(),
            direction,
            score: score.clamp(0.0, 100.0),
            timestamp,
            price,
            stop_loss: None,
            take_profit: None,
            indicators: IndicatorSnapshot::new(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn with_stop_loss(mut self, stop: f64) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    pub fn with_take_profit(mut self, target: f64) -> Self {
        self.take_profit = Some(target);
        self
    }

    pub fn with_indicators(mut self, indicators: IndicatorSnapshot) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn with_conditions<I, K>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        self.conditions
            .extend(conditions.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Distance from entry to stop, if a stop is set.
    pub fn risk(&self) -> Option<f64> {
        self.stop_loss.map(|s| (self.price - s).abs())
    }

    /// Reward-to-risk ratio implied by the stop and target.
    pub fn reward_risk(&self) -> Option<f64> {
        let risk = self.risk()?;
        let target = self.take_profit?;
        (risk > 0.0).then(|| (target - self.price).abs() / risk)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub price: f64,
    pub timestamp: NaiveDateTime,
}

/// Sorts by descending score; exact ties go to the lower instrument
/// identifier, then the lower strategy name.
pub fn rank_signals(signals: &mut [Signal]) {
    signals.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.instrument.cmp(&b.instrument))
            .then_with(|| a.strategy.cmp(&b.strategy))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn signal(instrument: &str, score: f64) -> Signal {
        Signal::new(instrument, "trend_following", Direction::Buy, score, ts(), 100.0)
    }

    #[test]
    fn score_is_clamped() {
        assert!((signal("A", 140.0).score - 100.0).abs() < f64::EPSILON);
        assert!(signal("A", -3.0).score.abs() < f64::EPSILON);
    }

    #[test]
    fn builders_set_levels() {
        let s = signal("A", 60.0).with_stop_loss(95.0).with_take_profit(110.0);
        assert_eq!(s.risk(), Some(5.0));
        assert_eq!(s.reward_risk(), Some(2.0));
    }

    #[test]
    fn reward_risk_needs_nonzero_risk() {
        let s = signal("A", 60.0).with_stop_loss(100.0).with_take_profit(110.0);
        assert_eq!(s.reward_risk(), None);
    }

    #[test]
    fn conditions_are_recorded() {
        let s = signal("A", 60.0).with_conditions([("adx_strong", true), ("rising", false)]);
        assert_eq!(s.conditions.get("adx_strong"), Some(&true));
        assert_eq!(s.conditions.get("rising"), Some(&false));
    }

    #[test]
    fn rank_by_score_then_instrument() {
        let mut signals = vec![signal("RIO", 70.0), signal("BHP", 70.0), signal("CBA", 90.0)];
        rank_signals(&mut signals);
        let order: Vec<&str> = signals.iter().map(|s| s.instrument.as_str()).collect();
        assert_eq!(order, vec!["CBA", "BHP", "RIO"]);
    }

    #[test]
    fn rank_ties_fall_back_to_strategy() {
        let mut a = signal("BHP", 50.0);
        a.strategy = "squeeze_breakout".into();
        let b = signal("BHP", 50.0);
        let mut signals = vec![a, b];
        rank_signals(&mut signals);
        assert_eq!(signals[0].strategy, "squeeze_breakout");
    }

    #[test]
    fn direction_helpers() {
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert!((Direction::Sell.sign() + 1.0).abs() < f64::EPSILON);
        assert_eq!(Direction::Hold.to_string(), "HOLD");
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ExitReason::EndOfBacktest).unwrap();
        assert_eq!(json, "\"end_of_backtest\"");
        assert_eq!(ExitReason::StopLoss.to_string(), "stop_loss");
    }
}
