//! Open positions and closed trades.
//!
//! Sizes are whole units. A short position escrows its entry notional, so
//! its market value is `size × (2 × entry - price)`: the escrow plus the
//! running profit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::ohlcv::OhlcvBar;
use crate::domain::series::IndicatorSnapshot;
use crate::domain::signal::{Direction, ExitReason};

/// Positions are unique per (instrument, strategy).
pub type PositionKey = (String, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub strategy: String,
    pub direction: Direction,
    pub size: u64,
    pub entry_timestamp: NaiveDateTime,
    /// Fill price after slippage.
    pub entry_price: f64,
    pub entry_commission: f64,
    /// fill × size + commission, taken from cash at entry.
    pub entry_cost: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_score: f64,
    pub entry_indicators: IndicatorSnapshot,
    pub bars_held: usize,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        (self.instrument.clone(), self.strategy.clone())
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Buy
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Sell
    }

    pub fn market_value(&self, price: f64) -> f64 {
        let size = self.size as f64;
        if self.is_short() {
            size * (2.0 * self.entry_price - price)
        } else {
            size * price
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * self.size as f64 * (price - self.entry_price)
    }

    /// Pre-slippage fill when the bar's range reaches the stop. A bar that
    /// opens beyond the stop fills at the open.
    pub fn stop_fill(&self, bar: &OhlcvBar) -> Option<f64> {
        let stop = self.stop_loss?;
        if self.is_long() {
            (bar.low <= stop).then(|| if bar.open < stop { bar.open } else { stop })
        } else {
            (bar.high >= stop).then(|| if bar.open > stop { bar.open } else { stop })
        }
    }

    /// Pre-slippage fill when the bar's range reaches the target.
    pub fn target_fill(&self, bar: &OhlcvBar) -> Option<f64> {
        let target = self.take_profit?;
        if self.is_long() {
            (bar.high >= target).then(|| if bar.open > target { bar.open } else { target })
        } else {
            (bar.low <= target).then(|| if bar.open < target { bar.open } else { target })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub instrument: String,
    pub strategy: String,
    pub direction: Direction,
    pub size: u64,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_cost: f64,
    pub exit_proceeds: f64,
    pub commission: f64,
    /// exit_proceeds - entry_cost
    pub pnl: f64,
    /// pnl / entry_cost × 100
    pub pnl_pct: f64,
    pub holding_bars: usize,
    pub holding_days: f64,
    pub exit_reason: ExitReason,
    pub entry_score: f64,
    /// Indicator values the entry signal was generated from.
    pub entry_indicators: IndicatorSnapshot,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}
