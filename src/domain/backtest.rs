//! Backtest engine and event loop.
//!
//! One iteration per step of the unified timeline:
//! 1. exit pass: stop, target, holding limit, then the detector's own exit
//! 2. entry pass: evaluate, rank and open up to `max_positions`
//! 3. equity update: mark open positions to the last close at or before the step
//!
//! All history is loaded and augmented before the loop starts. An instrument
//! that fails preparation is recorded in the run's error list and left out.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::cooldown::CooldownTracker;
use super::detector::Detector;
use super::error::TrendscreenError;
use super::execution::{ExecutionConfig, enter_position, exit_position};
use super::indicator::compute_indicators;
use super::metrics::{MetricsConfig, PerformanceMetrics};
use super::portfolio::{EquityCurvePoint, Portfolio};
use super::position::{ClosedTrade, PositionKey};
use super::series::{AugmentedSeries, InstrumentData, PriceSeries, build_unified_timeline};
use super::signal::{Direction, ExitReason, Signal, rank_signals};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub initial_capital: f64,
    /// Fraction of available cash per entry.
    pub position_size_pct: f64,
    pub max_positions: usize,
    pub commission: f64,
    pub slippage_pct: f64,
    pub allow_shorting: bool,
    pub risk_free_rate: f64,
    pub steps_per_year: f64,
    pub max_holding_bars: Option<usize>,
    pub target_reward_risk: f64,
    pub spread: f64,
    /// Steps after an entry before the same (instrument, strategy) may enter again.
    pub cooldown_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start: None,
            end: None,
            initial_capital: 100_000.0,
            position_size_pct: 0.1,
            max_positions: 10,
            commission: 0.0,
            slippage_pct: 0.0,
            allow_shorting: false,
            risk_free_rate: 0.0,
            steps_per_year: 252.0,
            max_holding_bars: None,
            target_reward_risk: 2.0,
            spread: 0.0,
            cooldown_bars: 0,
        }
    }
}

impl BacktestConfig {
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            commission: self.commission,
            slippage_pct: self.slippage_pct,
            position_size_pct: self.position_size_pct,
            allow_shorting: self.allow_shorting,
        }
    }

    pub fn metrics(&self) -> MetricsConfig {
        MetricsConfig {
            initial_capital: self.initial_capital,
            risk_free_rate: self.risk_free_rate,
            steps_per_year: self.steps_per_year,
        }
    }
}

/// Raw price history for one instrument, before indicators are attached.
#[derive(Debug, Clone)]
pub struct InstrumentHistory {
    pub series: PriceSeries,
    pub higher: BTreeMap<String, PriceSeries>,
}

impl InstrumentHistory {
    pub fn new(series: PriceSeries) -> Self {
        InstrumentHistory {
            series,
            higher: BTreeMap::new(),
        }
    }

    pub fn with_higher(mut self, label: impl Into<String>, series: PriceSeries) -> Self {
        self.higher.insert(label.into(), series);
        self
    }

    pub fn instrument(&self) -> &str {
        self.series.instrument()
    }
}

/// An instrument that could not be processed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentError {
    pub instrument: String,
    pub error: String,
}

impl InstrumentError {
    pub fn new(instrument: impl Into<String>, error: &TrendscreenError) -> Self {
        InstrumentError {
            instrument: instrument.into(),
            error: error.to_string(),
        }
    }
}

/// Mutable state owned by a single run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub cooldown: CooldownTracker,
    pub errors: Vec<InstrumentError>,
}

impl RunContext {
    pub fn new(cooldown_bars: usize) -> Self {
        RunContext {
            cooldown: CooldownTracker::new(cooldown_bars),
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, instrument: &str, error: &TrendscreenError) {
        warn!(instrument, %error, "instrument excluded");
        self.errors.push(InstrumentError::new(instrument, error));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub instruments: usize,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityCurvePoint>,
    pub metrics: PerformanceMetrics,
    pub errors: Vec<InstrumentError>,
    pub final_cash: f64,
}

/// Attaches the detector's indicators to the base series and, when the
/// detector consults one, its higher timeframe.
pub fn prepare_instrument<D: Detector + ?Sized>(
    history: &InstrumentHistory,
    detector: &D,
) -> Result<InstrumentData, TrendscreenError> {
    let instrument = history.instrument();
    let minimum = detector.min_bars();
    if history.series.len() < minimum {
        return Err(TrendscreenError::InsufficientData {
            instrument: instrument.to_string(),
            bars: history.series.len(),
            minimum,
        });
    }

    let base = compute_indicators(&history.series, &detector.required_indicators())?;
    let mut data = InstrumentData::new(AugmentedSeries::new(history.series.clone(), base));

    if let Some((label, series)) = detector
        .higher_timeframe()
        .and_then(|label| history.higher.get(label).map(|series| (label, series)))
    {
        let set = compute_indicators(series, &detector.higher_timeframe_indicators())?;
        data.higher
            .insert(label.to_string(), AugmentedSeries::new(series.clone(), set));
    }
    Ok(data)
}

/// Prepares every instrument; failures go to `ctx.errors`.
pub fn prepare_universe<D: Detector + ?Sized>(
    histories: &[InstrumentHistory],
    detector: &D,
    ctx: &mut RunContext,
) -> Vec<InstrumentData> {
    histories
        .iter()
        .filter_map(|history| match prepare_instrument(history, detector) {
            Ok(data) => Some(data),
            Err(e) => {
                ctx.record_error(history.instrument(), &e);
                None
            }
        })
        .collect()
}

/// Last finite close at or before `timestamp`.
fn mark_price(data: &InstrumentData, timestamp: NaiveDateTime) -> Option<f64> {
    let series = data.base.series();
    let end = series.index_at_or_before(timestamp)?;
    series.bars()[..=end]
        .iter()
        .rev()
        .map(|bar| bar.close)
        .find(|close| close.is_finite())
}

fn exit_pass<D: Detector + ?Sized>(
    portfolio: &mut Portfolio,
    by_name: &HashMap<&str, &InstrumentData>,
    detector: &D,
    config: &BacktestConfig,
    execution: &ExecutionConfig,
    timestamp: NaiveDateTime,
) {
    let keys: Vec<PositionKey> = portfolio.positions.keys().cloned().collect();
    for key in keys {
        let Some(data) = by_name.get(key.0.as_str()) else {
            continue;
        };
        // no bar this step: instrument inactive
        let Some(frames) = data.timeframes_on(timestamp) else {
            continue;
        };
        let bar = frames.base.last_bar();

        let Some(position) = portfolio.positions.get_mut(&key) else {
            continue;
        };
        position.bars_held += 1;

        let trigger = if let Some(fill) = position.stop_fill(bar) {
            Some((fill, ExitReason::StopLoss))
        } else if let Some(fill) = position.target_fill(bar) {
            Some((fill, ExitReason::ProfitTarget))
        } else if config
            .max_holding_bars
            .is_some_and(|limit| position.bars_held >= limit)
        {
            Some((bar.close, ExitReason::TimeLimit))
        } else {
            detector
                .check_exit(&frames, position.direction, position.entry_price)
                .map(|exit| (exit.price, exit.reason))
        };

        let Some((price, reason)) = trigger.filter(|(price, _)| price.is_finite()) else {
            continue;
        };
        if let Some(trade) = exit_position(portfolio, &key, price, timestamp, reason, execution) {
            debug!(
                instrument = %trade.instrument,
                %reason,
                pnl = trade.pnl,
                "closed position"
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn entry_pass<D: Detector + ?Sized>(
    portfolio: &mut Portfolio,
    instruments: &[InstrumentData],
    detector: &D,
    config: &BacktestConfig,
    execution: &ExecutionConfig,
    ctx: &mut RunContext,
    step: usize,
    timestamp: NaiveDateTime,
) {
    let strategy = detector.name();
    let mut candidates: Vec<Signal> = instruments
        .iter()
        .filter(|data| !portfolio.has_position(data.instrument(), strategy))
        .filter(|data| !ctx.cooldown.is_cooling(data.instrument(), strategy, step))
        .filter_map(|data| {
            let frames = data.timeframes_on(timestamp)?;
            detector.analyze(&frames, data.instrument(), config.target_reward_risk, config.spread)
        })
        .filter(|signal| match signal.direction {
            Direction::Buy => true,
            Direction::Sell => config.allow_shorting,
            Direction::Hold => false,
        })
        .collect();
    rank_signals(&mut candidates);

    for signal in &candidates {
        if portfolio.position_count() >= config.max_positions {
            break;
        }
        match enter_position(portfolio, signal, execution) {
            Ok(fill) => {
                ctx.cooldown.record(&signal.instrument, strategy, step);
                debug!(
                    instrument = %signal.instrument,
                    direction = %signal.direction,
                    score = signal.score,
                    size = fill.size,
                    price = fill.fill_price,
                    "opened position"
                );
            }
            Err(e) => debug!(instrument = %signal.instrument, error = %e, "entry skipped"),
        }
    }
}

/// Runs the event loop over prepared instruments and returns the final portfolio.
pub fn simulate<D: Detector + ?Sized>(
    instruments: &[InstrumentData],
    detector: &D,
    config: &BacktestConfig,
    ctx: &mut RunContext,
) -> Portfolio {
    let mut portfolio = Portfolio::new(config.initial_capital);
    let execution = config.execution();
    let timeline = build_unified_timeline(
        instruments.iter().map(|data| data.base.series()),
        config.start,
        config.end,
    );
    let by_name: HashMap<&str, &InstrumentData> = instruments
        .iter()
        .map(|data| (data.instrument(), data))
        .collect();

    info!(
        strategy = detector.name(),
        instruments = instruments.len(),
        steps = timeline.len(),
        "starting backtest"
    );

    let last_step = timeline.len().saturating_sub(1);
    for (step, &timestamp) in timeline.iter().enumerate() {
        exit_pass(&mut portfolio, &by_name, detector, config, &execution, timestamp);

        if step < last_step && portfolio.position_count() < config.max_positions {
            entry_pass(
                &mut portfolio,
                instruments,
                detector,
                config,
                &execution,
                ctx,
                step,
                timestamp,
            );
        }

        let mut prices: HashMap<String, f64> = HashMap::new();
        for position in portfolio.positions.values() {
            if let Some(price) = by_name
                .get(position.instrument.as_str())
                .and_then(|data| mark_price(data, timestamp))
            {
                prices.insert(position.instrument.clone(), price);
            }
        }

        if step == last_step {
            let keys: Vec<PositionKey> = portfolio.positions.keys().cloned().collect();
            for key in keys {
                let price = match prices.get(&key.0) {
                    Some(&price) => price,
                    None => match portfolio.positions.get(&key) {
                        Some(position) => position.entry_price,
                        None => continue,
                    },
                };
                exit_position(
                    &mut portfolio,
                    &key,
                    price,
                    timestamp,
                    ExitReason::EndOfBacktest,
                    &execution,
                );
            }
        }

        portfolio.record_equity(timestamp, &prices);
    }

    portfolio
}

/// Prepares the universe, simulates and computes metrics.
pub fn run_backtest<D: Detector + ?Sized>(
    histories: &[InstrumentHistory],
    detector: &D,
    config: &BacktestConfig,
) -> BacktestResult {
    let mut ctx = RunContext::new(config.cooldown_bars);
    let instruments = prepare_universe(histories, detector, &mut ctx);
    let portfolio = simulate(&instruments, detector, config, &mut ctx);
    let metrics = PerformanceMetrics::compute(&portfolio.closed_trades, &portfolio.equity_curve, &config.metrics());

    info!(
        trades = metrics.total_trades,
        total_return_pct = metrics.total_return_pct,
        max_drawdown_pct = metrics.max_drawdown_pct,
        errors = ctx.errors.len(),
        "backtest finished"
    );

    BacktestResult {
        strategy: detector.name().to_string(),
        instruments: instruments.len(),
        final_cash: portfolio.cash,
        trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
        metrics,
        errors: ctx.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorType;
    use crate::domain::indicator::test_support::day;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::series::Timeframes;
    use crate::domain::signal::ExitSignal;

    /// Buys every instrument on bar `entry_bar` with a 5% stop and a 10% target.
    struct Scripted {
        entry_bar: usize,
        exit_bar: Option<usize>,
        scores: HashMap<String, f64>,
        direction: Direction,
    }

    impl Scripted {
        fn new(entry_bar: usize) -> Self {
            Scripted {
                entry_bar,
                exit_bar: None,
                scores: HashMap::new(),
                direction: Direction::Buy,
            }
        }
    }

    impl Detector for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn required_indicators(&self) -> Vec<IndicatorType> {
            Vec::new()
        }

        fn analyze(&self, data: &Timeframes<'_>, instrument: &str, _rr: f64, _spread: f64) -> Option<Signal> {
            let view = &data.base;
            if view.end() != self.entry_bar {
                return None;
            }
            let close = view.close();
            let sign = self.direction.sign();
            let score = self.scores.get(instrument).copied().unwrap_or(60.0);
            Some(
                Signal::new(instrument, "scripted", self.direction, score, view.timestamp(), close)
                    .with_stop_loss(close * (1.0 - 0.05 * sign))
                    .with_take_profit(close * (1.0 + 0.10 * sign)),
            )
        }

        fn check_exit(&self, data: &Timeframes<'_>, _direction: Direction, _entry: f64) -> Option<ExitSignal> {
            let view = &data.base;
            (Some(view.end()) == self.exit_bar).then(|| ExitSignal {
                reason: ExitReason::TrendReversal,
                price: view.close(),
                timestamp: view.timestamp(),
            })
        }
    }

    fn flat_bars(n: usize, price: f64) -> Vec<OhlcvBar> {
        (0..n)
            .map(|i| OhlcvBar {
                timestamp: day(i),
                open: price,
                high: price + 0.5,
                low: price - 0.5,
                close: price,
                volume: 1000.0,
            })
            .collect()
    }

    fn history(name: &str, bars: Vec<OhlcvBar>) -> InstrumentHistory {
        InstrumentHistory::new(PriceSeries::new(name, bars).unwrap())
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            initial_capital: 100_000.0,
            position_size_pct: 0.2,
            max_positions: 5,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn empty_universe_gives_empty_result() {
        let result = run_backtest(&[], &Scripted::new(0), &config());
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.metrics.total_trades, 0);
    }

    #[test]
    fn forced_close_at_end_of_range() {
        let histories = vec![history("AAA", flat_bars(10, 100.0))];
        let result = run_backtest(&histories, &Scripted::new(2), &config());
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfBacktest);
        assert_eq!(trade.entry_timestamp, day(2));
        assert_eq!(trade.exit_timestamp, day(9));
        assert_eq!(trade.holding_bars, 7);
        assert_eq!(result.equity_curve.len(), 10);
        assert_eq!(result.equity_curve[9].open_positions, 0);
    }

    #[test]
    fn detector_exit_closes_position() {
        let histories = vec![history("AAA", flat_bars(10, 100.0))];
        let detector = Scripted {
            exit_bar: Some(5),
            ..Scripted::new(2)
        };
        let result = run_backtest(&histories, &detector, &config());
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::TrendReversal);
        assert_eq!(result.trades[0].exit_timestamp, day(5));
    }

    #[test]
    fn holding_limit_exits_with_time_limit() {
        let histories = vec![history("AAA", flat_bars(10, 100.0))];
        let cfg = BacktestConfig {
            max_holding_bars: Some(3),
            ..config()
        };
        let result = run_backtest(&histories, &Scripted::new(1), &cfg);
        assert_eq!(result.trades[0].exit_reason, ExitReason::TimeLimit);
        assert_eq!(result.trades[0].exit_timestamp, day(4));
    }

    #[test]
    fn target_hit_closes_at_target() {
        let mut bars = flat_bars(8, 100.0);
        bars[4].high = 112.0;
        bars[4].close = 111.0;
        let histories = vec![history("AAA", bars)];
        let result = run_backtest(&histories, &Scripted::new(2), &config());
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::ProfitTarget);
        assert!((trade.exit_price - 110.0).abs() < 1e-9);
        assert!(trade.pnl > 0.0);
    }

    #[test]
    fn capacity_limits_entries_by_rank() {
        let names = ["A", "B", "C", "D", "E", "F", "G"];
        let histories: Vec<InstrumentHistory> =
            names.iter().map(|n| history(n, flat_bars(6, 50.0))).collect();
        let mut detector = Scripted::new(1);
        for (i, name) in names.iter().enumerate() {
            detector.scores.insert(name.to_string(), 50.0 + i as f64);
        }
        let cfg = BacktestConfig {
            max_positions: 3,
            ..config()
        };
        let result = run_backtest(&histories, &detector, &cfg);
        let mut traded: Vec<&str> = result.trades.iter().map(|t| t.instrument.as_str()).collect();
        traded.sort();
        assert_eq!(traded, vec!["E", "F", "G"]);
        assert!(result.equity_curve.iter().all(|p| p.open_positions <= 3));
    }

    #[test]
    fn shorts_need_permission() {
        let histories = vec![history("AAA", flat_bars(6, 100.0))];
        let detector = Scripted {
            direction: Direction::Sell,
            ..Scripted::new(1)
        };
        assert!(run_backtest(&histories, &detector, &config()).trades.is_empty());

        let cfg = BacktestConfig {
            allow_shorting: true,
            ..config()
        };
        let result = run_backtest(&histories, &detector, &cfg);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].direction, Direction::Sell);
    }

    #[test]
    fn cooldown_blocks_reentry() {
        let histories = vec![history("AAA", flat_bars(10, 100.0))];
        let mut ctx = RunContext::new(5);
        let detector = Scripted {
            exit_bar: Some(2),
            ..Scripted::new(1)
        };
        let data = prepare_universe(&histories, &detector, &mut ctx);
        simulate(&data, &detector, &config(), &mut ctx);
        assert!(ctx.cooldown.is_cooling("AAA", "scripted", 3));
    }

    #[test]
    fn broken_instrument_is_recorded_and_skipped() {
        let mut bad = flat_bars(6, 100.0);
        bad[3].high = 90.0;
        let histories = vec![history("BAD", bad), history("GOOD", flat_bars(6, 100.0))];
        let result = run_backtest(&histories, &Scripted::new(1), &config());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].instrument, "BAD");
        assert_eq!(result.instruments, 1);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].instrument, "GOOD");
    }

    #[test]
    fn date_range_restricts_timeline() {
        let histories = vec![history("AAA", flat_bars(10, 100.0))];
        let cfg = BacktestConfig {
            start: Some(day(3)),
            end: Some(day(6)),
            ..config()
        };
        let result = run_backtest(&histories, &Scripted::new(4), &cfg);
        let stamps: Vec<NaiveDateTime> = result.equity_curve.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![day(3), day(4), day(5), day(6)]);
        assert_eq!(result.trades[0].exit_timestamp, day(6));
    }
}
