//! Trade execution and fill simulation.
//!
//! Cost model:
//! - BUY fill = price × (1 + slippage); cost = fill × size + commission
//! - SELL fill = price × (1 - slippage); proceeds = fill × size - commission
//! - size = floor((available × position_size_pct - commission) / fill)
//!
//! Realized P&L is exactly `exit proceeds - entry cost`. Shorts escrow the
//! entry cost; buying to cover returns the escrow plus the price difference.

use chrono::NaiveDateTime;

use super::error::TrendscreenError;
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Position, PositionKey};
use super::signal::{Direction, ExitReason, Signal};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Fixed fee per fill.
    pub commission: f64,
    /// Fraction of price (0.001 = 0.1%).
    pub slippage_pct: f64,
    /// Fraction of available cash committed per entry.
    pub position_size_pct: f64,
    pub allow_shorting: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission: 0.0,
            slippage_pct: 0.0,
            position_size_pct: 0.1,
            allow_shorting: false,
        }
    }
}

pub fn buy_fill(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct)
}

pub fn sell_fill(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct)
}

/// Whole units affordable from `available × pct` after the commission.
pub fn position_size(available: f64, position_size_pct: f64, commission: f64, fill_price: f64) -> u64 {
    let budget = available * position_size_pct - commission;
    if !budget.is_finite() || budget <= 0.0 || !fill_price.is_finite() || fill_price <= 0.0 {
        return 0;
    }
    (budget / fill_price).floor() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryFill {
    pub size: u64,
    pub fill_price: f64,
    pub cost: f64,
    pub commission: f64,
}

fn capital_error(instrument: &str, reason: impl Into<String>) -> TrendscreenError {
    TrendscreenError::Capital {
        instrument: instrument.to_string(),
        reason: reason.into(),
    }
}

/// Opens a position for `signal` at its price.
///
/// 1. Apply slippage in the direction of the trade
/// 2. Size from available cash, whole units only
/// 3. Reject a zero size or a cost above available cash
/// 4. Deduct cost from cash and add the position
pub fn enter_position(
    portfolio: &mut Portfolio,
    signal: &Signal,
    config: &ExecutionConfig,
) -> Result<EntryFill, TrendscreenError> {
    let instrument = signal.instrument.as_str();
    let fill_price = match signal.direction {
        Direction::Buy => buy_fill(signal.price, config.slippage_pct),
        Direction::Sell if config.allow_shorting => sell_fill(signal.price, config.slippage_pct),
        Direction::Sell => return Err(capital_error(instrument, "shorting is disabled")),
        Direction::Hold => return Err(capital_error(instrument, "HOLD opens nothing")),
    };
    if !fill_price.is_finite() || fill_price <= 0.0 {
        return Err(capital_error(instrument, format!("unusable fill price {fill_price}")));
    }

    let size = position_size(portfolio.cash, config.position_size_pct, config.commission, fill_price);
    if size == 0 {
        return Err(capital_error(
            instrument,
            format!("{:.2} available does not buy one unit at {fill_price:.4}", portfolio.cash),
        ));
    }

    let cost = fill_price * size as f64 + config.commission;
    if cost > portfolio.cash {
        return Err(capital_error(
            instrument,
            format!("cost {cost:.2} exceeds available {:.2}", portfolio.cash),
        ));
    }

    portfolio.cash -= cost;
    portfolio.add_position(Position {
        instrument: signal.instrument.clone(),
        strategy: signal.strategy.clone(),
        direction: signal.direction,
        size,
        entry_timestamp: signal.timestamp,
        entry_price: fill_price,
        entry_commission: config.commission,
        entry_cost: cost,
        stop_loss: signal.stop_loss,
        take_profit: signal.take_profit,
        entry_score: signal.score,
        entry_indicators: signal.indicators.clone(),
        bars_held: 0,
    });

    Ok(EntryFill {
        size,
        fill_price,
        cost,
        commission: config.commission,
    })
}

/// Closes the position under `key` at `market_price` (pre-slippage) and
/// records the trade. Returns `None` when no such position is open.
pub fn exit_position(
    portfolio: &mut Portfolio,
    key: &PositionKey,
    market_price: f64,
    timestamp: NaiveDateTime,
    reason: ExitReason,
    config: &ExecutionConfig,
) -> Option<ClosedTrade> {
    let position = portfolio.remove_position(key)?;
    let size = position.size as f64;

    let exit_price = if position.is_short() {
        buy_fill(market_price, config.slippage_pct)
    } else {
        sell_fill(market_price, config.slippage_pct)
    };
    let exit_proceeds = if position.is_short() {
        (2.0 * position.entry_price - exit_price) * size - config.commission
    } else {
        exit_price * size - config.commission
    };
    portfolio.cash += exit_proceeds;

    let pnl = exit_proceeds - position.entry_cost;
    let pnl_pct = if position.entry_cost > 0.0 {
        pnl / position.entry_cost * 100.0
    } else {
        0.0
    };
    let holding_days = (timestamp - position.entry_timestamp).num_seconds() as f64 / 86_400.0;

    let trade = ClosedTrade {
        instrument: position.instrument,
        strategy: position.strategy,
        direction: position.direction,
        size: position.size,
        entry_timestamp: position.entry_timestamp,
        exit_timestamp: timestamp,
        entry_price: position.entry_price,
        exit_price,
        entry_cost: position.entry_cost,
        exit_proceeds,
        commission: position.entry_commission + config.commission,
        pnl,
        pnl_pct,
        holding_bars: position.bars_held,
        holding_days,
        exit_reason: reason,
        entry_score: position.entry_score,
        entry_indicators: position.entry_indicators,
    };
    portfolio.record_trade(trade.clone());
    Some(trade)
}
