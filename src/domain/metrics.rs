//! Performance metrics over closed trades and the equity curve.
//!
//! Every function here is total: an empty trade set or a short equity curve
//! yields zeros (and `distribution: None`), never an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::portfolio::EquityCurvePoint;
use super::position::ClosedTrade;
use super::signal::ExitReason;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub initial_capital: f64,
    /// Annual rate as a fraction (0.05 = 5%).
    pub risk_free_rate: f64,
    /// Equity-curve steps per year, used to annualize.
    pub steps_per_year: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            initial_capital: 100_000.0,
            risk_free_rate: 0.0,
            steps_per_year: 252.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitReasonStats {
    pub count: usize,
    pub avg_pnl: f64,
    pub avg_pnl_pct: f64,
    pub avg_holding_bars: f64,
    pub avg_holding_days: f64,
}

/// Summary statistics over trade P&L percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlDistribution {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; zero for a single trade.
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentBreakdown {
    pub instrument: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,
    pub loss_rate: f64,
    pub avg_win: f64,
    /// Magnitude of the average losing trade.
    pub avg_loss: f64,
    pub expectancy: f64,
    /// Infinite when there are no losses and a positive profit.
    pub profit_factor: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// Longest run of steps spent below a prior peak.
    pub max_drawdown_steps: usize,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub avg_holding_bars: f64,
    pub avg_holding_days: f64,
    pub exit_reasons: BTreeMap<ExitReason, ExitReasonStats>,
    pub distribution: Option<PnlDistribution>,
    pub per_instrument: Vec<InstrumentBreakdown>,
}

impl PerformanceMetrics {
    pub fn compute(trades: &[ClosedTrade], equity_curve: &[EquityCurvePoint], config: &MetricsConfig) -> Self {
        let initial = config.initial_capital;
        let final_equity = equity_curve.last().map(|p| p.total_value).unwrap_or(initial);
        let total_return = if initial > 0.0 {
            (final_equity - initial) / initial
        } else {
            0.0
        };

        let years = if config.steps_per_year > 0.0 {
            equity_curve.len() as f64 / config.steps_per_year
        } else {
            0.0
        };
        let annualized_return = if years > 0.0 && total_return.is_finite() {
            if total_return > -1.0 {
                (1.0 + total_return).powf(1.0 / years) - 1.0
            } else {
                -1.0
            }
        } else {
            0.0
        };

        let (max_drawdown_pct, max_drawdown_steps) = compute_drawdown(equity_curve, initial);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, config);

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        for trade in trades {
            if trade.is_win() {
                winning_trades += 1;
                gross_profit += trade.pnl;
                largest_win = largest_win.max(trade.pnl);
            } else if trade.is_loss() {
                losing_trades += 1;
                gross_loss += trade.pnl.abs();
                largest_loss = largest_loss.max(trade.pnl.abs());
            }
        }

        let total_trades = trades.len();
        let breakeven_trades = total_trades - winning_trades - losing_trades;
        let win_rate = ratio(winning_trades as f64, total_trades);
        let loss_rate = ratio(losing_trades as f64, total_trades);
        let avg_win = ratio(gross_profit, winning_trades);
        let avg_loss = ratio(gross_loss, losing_trades);

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        PerformanceMetrics {
            total_trades,
            winning_trades,
            losing_trades,
            breakeven_trades,
            win_rate,
            loss_rate,
            avg_win,
            avg_loss,
            expectancy: win_rate * avg_win - loss_rate * avg_loss,
            profit_factor,
            gross_profit,
            gross_loss,
            largest_win,
            largest_loss,
            total_return_pct: total_return * 100.0,
            annualized_return_pct: annualized_return * 100.0,
            max_drawdown_pct,
            max_drawdown_steps,
            sharpe_ratio,
            sortino_ratio,
            avg_holding_bars: ratio(trades.iter().map(|t| t.holding_bars as f64).sum(), total_trades),
            avg_holding_days: ratio(trades.iter().map(|t| t.holding_days).sum(), total_trades),
            exit_reasons: exit_reason_breakdown(trades),
            distribution: pnl_distribution(trades),
            per_instrument: instrument_breakdown(trades),
        }
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count > 0 { total / count as f64 } else { 0.0 }
}

/// Deepest decline from the running peak (as a percentage) and the longest
/// stretch of steps spent under water.
fn compute_drawdown(equity_curve: &[EquityCurvePoint], initial_capital: f64) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.total_value.max(initial_capital);
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut longest = 0usize;
    for point in equity_curve {
        if point.total_value >= peak {
            peak = point.total_value;
            underwater = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.total_value) / peak);
            underwater += 1;
            longest = longest.max(underwater);
        }
    }
    (max_dd * 100.0, longest)
}

fn compute_risk_adjusted(equity_curve: &[EquityCurvePoint], config: &MetricsConfig) -> (f64, f64) {
    if equity_curve.len() < 2 || config.steps_per_year <= 0.0 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].total_value;
            if prev > 0.0 {
                (w[1].total_value - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let step_rf = config.risk_free_rate / config.steps_per_year;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let excess = mean - step_rf;
    let annualizer = config.steps_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        excess / stddev * annualizer
    } else {
        0.0
    };

    let downside = (returns
        .iter()
        .filter(|&&r| r < step_rf)
        .map(|&r| (r - step_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let sortino = if downside > 0.0 {
        excess / downside * annualizer
    } else {
        0.0
    };

    (sharpe, sortino)
}

fn exit_reason_breakdown(trades: &[ClosedTrade]) -> BTreeMap<ExitReason, ExitReasonStats> {
    let mut groups: BTreeMap<ExitReason, Vec<&ClosedTrade>> = BTreeMap::new();
    for trade in trades {
        groups.entry(trade.exit_reason).or_default().push(trade);
    }
    groups
        .into_iter()
        .map(|(reason, group)| {
            let count = group.len();
            let stats = ExitReasonStats {
                count,
                avg_pnl: ratio(group.iter().map(|t| t.pnl).sum(), count),
                avg_pnl_pct: ratio(group.iter().map(|t| t.pnl_pct).sum(), count),
                avg_holding_bars: ratio(group.iter().map(|t| t.holding_bars as f64).sum(), count),
                avg_holding_days: ratio(group.iter().map(|t| t.holding_days).sum(), count),
            };
            (reason, stats)
        })
        .collect()
}

/// Linear interpolation between closest ranks over sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn pnl_distribution(trades: &[ClosedTrade]) -> Option<PnlDistribution> {
    let mut values: Vec<f64> = trades.iter().map(|t| t.pnl_pct).filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std_dev = if n > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    Some(PnlDistribution {
        mean,
        median: quantile(&values, 0.5),
        std_dev,
        q1: quantile(&values, 0.25),
        q3: quantile(&values, 0.75),
    })
}

fn instrument_breakdown(trades: &[ClosedTrade]) -> Vec<InstrumentBreakdown> {
    let mut by_instrument: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
    for trade in trades {
        let entry = by_instrument.entry(trade.instrument.as_str()).or_default();
        entry.0 += 1;
        if trade.is_win() {
            entry.1 += 1;
        }
        entry.2 += trade.pnl;
    }
    by_instrument
        .into_iter()
        .map(|(instrument, (total, wins, pnl))| InstrumentBreakdown {
            instrument: instrument.to_string(),
            total_trades: total,
            winning_trades: wins,
            win_rate: ratio(wins as f64, total),
            total_pnl: pnl,
        })
        .collect()
}
