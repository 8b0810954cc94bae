//! Configuration validation.
//!
//! Reads the `[backtest]` and `[strategy]` sections through a `ConfigPort`
//! and builds typed settings, rejecting bad values before any run starts.
//! Unset keys take the documented defaults.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::backtest::BacktestConfig;
use crate::domain::detector::{
    MeanReversion, MeanReversionParams, SqueezeBreakout, SqueezeBreakoutParams, StrategyKind,
    TrendFollowing, TrendFollowingParams, TripleConfirmation, TripleConfirmationParams,
    mean_reversion, squeeze_breakout, trend_following, triple_confirmation,
};
use crate::domain::error::TrendscreenError;
use crate::ports::config_port::ConfigPort;

pub const BACKTEST: &str = "backtest";
pub const STRATEGY: &str = "strategy";

/// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`. A bare date used as an end bound
/// covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
            if end_of_day {
                date.and_hms_opt(23, 59, 59)
            } else {
                date.and_hms_opt(0, 0, 0)
            }
        })
}

fn date_key(config: &dyn ConfigPort, key: &str, end_of_day: bool) -> Result<Option<NaiveDateTime>, TrendscreenError> {
    match config.get_string(BACKTEST, key) {
        None => Ok(None),
        Some(raw) => parse_bound(&raw, end_of_day).map(Some).ok_or_else(|| {
            TrendscreenError::invalid_config(BACKTEST, key, format!("expected YYYY-MM-DD, got {raw:?}"))
        }),
    }
}

fn ensure(ok: bool, key: &str, reason: &str) -> Result<(), TrendscreenError> {
    if ok {
        Ok(())
    } else {
        Err(TrendscreenError::invalid_config(BACKTEST, key, reason))
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, TrendscreenError> {
    let defaults = BacktestConfig::default();

    let start = date_key(config, "start_date", false)?;
    let end = date_key(config, "end_date", true)?;
    if let (Some(s), Some(e)) = (start, end) {
        ensure(s < e, "start_date", "start_date must be before end_date")?;
    }

    let initial_capital = config.get_double(BACKTEST, "initial_capital", defaults.initial_capital)?;
    ensure(
        initial_capital.is_finite() && initial_capital > 0.0,
        "initial_capital",
        "initial_capital must be positive",
    )?;

    let position_size_pct = config.get_double(BACKTEST, "position_size_pct", defaults.position_size_pct)?;
    ensure(
        position_size_pct > 0.0 && position_size_pct <= 1.0,
        "position_size_pct",
        "position_size_pct must be a fraction in (0, 1]",
    )?;

    let max_positions = config.get_usize(BACKTEST, "max_positions", defaults.max_positions)?;
    ensure(max_positions >= 1, "max_positions", "max_positions must be at least 1")?;

    let commission = config.get_double(BACKTEST, "commission", defaults.commission)?;
    ensure(commission >= 0.0, "commission", "commission must be non-negative")?;

    let slippage_pct = config.get_double(BACKTEST, "slippage_pct", defaults.slippage_pct)?;
    ensure(
        (0.0..1.0).contains(&slippage_pct),
        "slippage_pct",
        "slippage_pct must be a fraction in [0, 1)",
    )?;

    let risk_free_rate = config.get_double(BACKTEST, "risk_free_rate", defaults.risk_free_rate)?;
    ensure(
        (0.0..1.0).contains(&risk_free_rate),
        "risk_free_rate",
        "risk_free_rate must be between 0 and 1",
    )?;

    let steps_per_year = config.get_double(BACKTEST, "steps_per_year", defaults.steps_per_year)?;
    ensure(steps_per_year > 0.0, "steps_per_year", "steps_per_year must be positive")?;

    let max_holding_bars = match config.get_usize(BACKTEST, "max_holding_bars", 0)? {
        0 => None,
        bars => Some(bars),
    };

    let target_reward_risk = config.get_double(BACKTEST, "target_reward_risk", defaults.target_reward_risk)?;
    ensure(
        target_reward_risk > 0.0,
        "target_reward_risk",
        "target_reward_risk must be positive",
    )?;

    let spread = config.get_double(BACKTEST, "spread", defaults.spread)?;
    ensure(spread >= 0.0, "spread", "spread must be non-negative")?;

    Ok(BacktestConfig {
        start,
        end,
        initial_capital,
        position_size_pct,
        max_positions,
        commission,
        slippage_pct,
        allow_shorting: config.get_bool(BACKTEST, "allow_shorting", defaults.allow_shorting)?,
        risk_free_rate,
        steps_per_year,
        max_holding_bars,
        target_reward_risk,
        spread,
        cooldown_bars: config.get_usize(BACKTEST, "cooldown_bars", defaults.cooldown_bars)?,
    })
}

fn trend_following_params(config: &dyn ConfigPort) -> Result<TrendFollowingParams, TrendscreenError> {
    let d = TrendFollowingParams::default();
    Ok(TrendFollowingParams {
        adx_period: config.get_usize(STRATEGY, "adx_period", d.adx_period)?,
        adx_threshold: config.get_double(STRATEGY, "adx_threshold", d.adx_threshold)?,
        ema_period: config.get_usize(STRATEGY, "ema_period", d.ema_period)?,
        long_sma_period: config.get_usize(STRATEGY, "long_sma_period", d.long_sma_period)?,
        proximity: config.get_double(STRATEGY, "proximity", d.proximity)?,
        atr_period: config.get_usize(STRATEGY, "atr_period", d.atr_period)?,
        stop_atr_multiple: config.get_double(STRATEGY, "stop_atr_multiple", d.stop_atr_multiple)?,
    })
}

fn mean_reversion_params(config: &dyn ConfigPort) -> Result<MeanReversionParams, TrendscreenError> {
    let d = MeanReversionParams::default();
    Ok(MeanReversionParams {
        bb_period: config.get_usize(STRATEGY, "bb_period", d.bb_period)?,
        bb_stddev: config.get_double(STRATEGY, "bb_stddev", d.bb_stddev)?,
        rsi_period: config.get_usize(STRATEGY, "rsi_period", d.rsi_period)?,
        oversold: config.get_double(STRATEGY, "oversold", d.oversold)?,
        overbought: config.get_double(STRATEGY, "overbought", d.overbought)?,
        profit_target: config.get_double(STRATEGY, "profit_target", d.profit_target)?,
        atr_period: config.get_usize(STRATEGY, "atr_period", d.atr_period)?,
        stop_atr_multiple: config.get_double(STRATEGY, "stop_atr_multiple", d.stop_atr_multiple)?,
        use_heiken_ashi: config.get_bool(STRATEGY, "use_heiken_ashi", d.use_heiken_ashi)?,
    })
}

fn squeeze_breakout_params(config: &dyn ConfigPort) -> Result<SqueezeBreakoutParams, TrendscreenError> {
    let d = SqueezeBreakoutParams::default();
    Ok(SqueezeBreakoutParams {
        bb_period: config.get_usize(STRATEGY, "bb_period", d.bb_period)?,
        bb_stddev: config.get_double(STRATEGY, "bb_stddev", d.bb_stddev)?,
        squeeze_lookback: config.get_usize(STRATEGY, "squeeze_lookback", d.squeeze_lookback)?,
        squeeze_window: config.get_usize(STRATEGY, "squeeze_window", d.squeeze_window)?,
        squeeze_tolerance: config.get_double(STRATEGY, "squeeze_tolerance", d.squeeze_tolerance)?,
        higher_timeframe: config
            .get_string(STRATEGY, "higher_timeframe")
            .unwrap_or(d.higher_timeframe),
        htf_adx_period: config.get_usize(STRATEGY, "htf_adx_period", d.htf_adx_period)?,
        htf_adx_threshold: config.get_double(STRATEGY, "htf_adx_threshold", d.htf_adx_threshold)?,
        require_higher_timeframe: config.get_bool(
            STRATEGY,
            "require_higher_timeframe",
            d.require_higher_timeframe,
        )?,
        min_stop_distance: config.get_double(STRATEGY, "min_stop_distance", d.min_stop_distance)?,
    })
}

fn triple_confirmation_params(config: &dyn ConfigPort) -> Result<TripleConfirmationParams, TrendscreenError> {
    let d = TripleConfirmationParams::default();
    Ok(TripleConfirmationParams {
        structure_lookback: config.get_usize(STRATEGY, "structure_lookback", d.structure_lookback)?,
        pivot_strength: config.get_usize(STRATEGY, "pivot_strength", d.pivot_strength)?,
        trail_atr_period: config.get_usize(STRATEGY, "trail_atr_period", d.trail_atr_period)?,
        trail_factor: config.get_double(STRATEGY, "trail_factor", d.trail_factor)?,
        flip_window: config.get_usize(STRATEGY, "flip_window", d.flip_window)?,
        rsi_period: config.get_usize(STRATEGY, "rsi_period", d.rsi_period)?,
        rsi_midline: config.get_double(STRATEGY, "rsi_midline", d.rsi_midline)?,
        cross_window: config.get_usize(STRATEGY, "cross_window", d.cross_window)?,
        higher_timeframe: config.get_string(STRATEGY, "higher_timeframe"),
    })
}

/// Builds the detector named by `[strategy] kind`.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<StrategyKind, TrendscreenError> {
    let kind = config.require_string(STRATEGY, "kind")?;
    let detector: StrategyKind = match kind.as_str() {
        trend_following::NAME => TrendFollowing::new(trend_following_params(config)?)?.into(),
        mean_reversion::NAME => MeanReversion::new(mean_reversion_params(config)?)?.into(),
        squeeze_breakout::NAME => SqueezeBreakout::new(squeeze_breakout_params(config)?)?.into(),
        triple_confirmation::NAME => {
            TripleConfirmation::new(triple_confirmation_params(config)?)?.into()
        }
        other => {
            return Err(TrendscreenError::invalid_config(
                STRATEGY,
                "kind",
                format!("unknown strategy {other:?}, expected one of {}", StrategyKind::NAMES.join(", ")),
            ));
        }
    };
    Ok(detector)
}
