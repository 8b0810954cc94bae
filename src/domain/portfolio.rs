//! Portfolio state and equity tracking.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::position::{ClosedTrade, Position, PositionKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub timestamp: NaiveDateTime,
    pub total_value: f64,
    pub cash: f64,
    pub positions_value: f64,
    /// Decline from the running peak, as a positive percentage.
    pub drawdown_pct: f64,
    pub open_positions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<PositionKey, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityCurvePoint>,
    peak_equity: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: initial_capital,
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.key(), position);
    }

    pub fn get_position(&self, instrument: &str, strategy: &str) -> Option<&Position> {
        self.positions
            .get(&(instrument.to_string(), strategy.to_string()))
    }

    pub fn has_position(&self, instrument: &str, strategy: &str) -> bool {
        self.get_position(instrument, strategy).is_some()
    }

    pub fn remove_position(&mut self, key: &PositionKey) -> Option<Position> {
        self.positions.remove(key)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    /// Value of open positions; instruments without a price are carried at entry.
    pub fn positions_value(&self, price_map: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|pos| {
                let price = price_map
                    .get(&pos.instrument)
                    .copied()
                    .unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum()
    }

    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        self.cash + self.positions_value(price_map)
    }

    /// Marks the portfolio at `timestamp` and appends an equity point.
    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price_map: &HashMap<String, f64>) -> &EquityCurvePoint {
        let positions_value = self.positions_value(price_map);
        let total_value = self.cash + positions_value;
        if total_value > self.peak_equity {
            self.peak_equity = total_value;
        }
        let drawdown_pct = if self.peak_equity > 0.0 {
            (self.peak_equity - total_value) / self.peak_equity * 100.0
        } else {
            0.0
        };
        self.equity_curve.push(EquityCurvePoint {
            timestamp,
            total_value,
            cash: self.cash,
            positions_value,
            drawdown_pct,
            open_positions: self.positions.len(),
        });
        &self.equity_curve[self.equity_curve.len() - 1]
    }
}
