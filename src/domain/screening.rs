//! One-shot screening across a universe and signal diffs between screens.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::backtest::{InstrumentError, InstrumentHistory, RunContext, prepare_universe};
use super::detector::Detector;
use super::series::{InstrumentData, Timeframes};
use super::signal::{Direction, Signal, rank_signals};

#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRequest {
    pub target_reward_risk: f64,
    pub spread: f64,
    pub generated_at: NaiveDateTime,
    /// Evaluate at the last bar at or before this time; latest bar when unset.
    pub as_of: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub strategy: String,
    pub generated_at: NaiveDateTime,
    pub instruments_scanned: usize,
    pub signal_count: usize,
    pub signals: Vec<Signal>,
    pub errors: Vec<InstrumentError>,
}

fn frames_for(data: &InstrumentData, as_of: Option<NaiveDateTime>) -> Option<Timeframes<'_>> {
    match as_of {
        Some(ts) => {
            let end = data.base.series().index_at_or_before(ts)?;
            data.timeframes_at(end)
        }
        None => data.latest_timeframes(),
    }
}

/// Runs the detector once per instrument and ranks whatever fires.
/// HOLD signals are dropped.
pub fn screen<D: Detector + ?Sized>(
    histories: &[InstrumentHistory],
    detector: &D,
    request: &ScreeningRequest,
) -> ScreeningReport {
    let mut ctx = RunContext::default();
    let instruments = prepare_universe(histories, detector, &mut ctx);

    let mut signals: Vec<Signal> = instruments
        .iter()
        .filter_map(|data| {
            let frames = frames_for(data, request.as_of)?;
            detector.analyze(&frames, data.instrument(), request.target_reward_risk, request.spread)
        })
        .filter(|signal| signal.direction != Direction::Hold)
        .collect();
    rank_signals(&mut signals);

    info!(
        strategy = detector.name(),
        scanned = histories.len(),
        signals = signals.len(),
        errors = ctx.errors.len(),
        "screen finished"
    );

    ScreeningReport {
        strategy: detector.name().to_string(),
        generated_at: request.generated_at,
        instruments_scanned: histories.len(),
        signal_count: signals.len(),
        signals,
        errors: ctx.errors,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reversal {
    pub previous: Signal,
    pub current: Signal,
}

/// Changes between two screens, keyed by instrument. A signal that
/// disappeared is an implicit exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalDiff {
    pub new: Vec<Signal>,
    pub reversed: Vec<Reversal>,
    pub disappeared: Vec<Signal>,
}

impl SignalDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.reversed.is_empty() && self.disappeared.is_empty()
    }
}

/// Compares two signal lists. Output is ordered by instrument; when a list
/// holds several signals for one instrument, the first one counts.
pub fn diff_signals(previous: &[Signal], current: &[Signal]) -> SignalDiff {
    fn by_instrument(signals: &[Signal]) -> BTreeMap<&str, &Signal> {
        let mut map = BTreeMap::new();
        for signal in signals {
            map.entry(signal.instrument.as_str()).or_insert(signal);
        }
        map
    }

    let before = by_instrument(previous);
    let after = by_instrument(current);
    let mut diff = SignalDiff::default();

    for (instrument, &now) in &after {
        match before.get(instrument) {
            None => diff.new.push(now.clone()),
            Some(&then) if then.direction != now.direction => diff.reversed.push(Reversal {
                previous: then.clone(),
                current: now.clone(),
            }),
            Some(_) => {}
        }
    }
    diff.disappeared = before
        .iter()
        .filter(|(instrument, _)| !after.contains_key(*instrument))
        .map(|(_, &signal)| signal.clone())
        .collect();
    diff
}
