#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Write;
use trendscreen::domain::backtest::InstrumentHistory;
use trendscreen::domain::detector::Detector;
use trendscreen::domain::error::TrendscreenError;
use trendscreen::domain::indicator::IndicatorType;
pub use trendscreen::domain::ohlcv::OhlcvBar;
use trendscreen::domain::series::{PriceSeries, Timeframes};
use trendscreen::domain::signal::{Direction, ExitReason, ExitSignal, Signal};
use trendscreen::ports::data_port::DataPort;

pub fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

/// Bars with high/low at ±0.5% of the close, opening at the previous close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp: day(i),
            open: if i == 0 { close } else { closes[i - 1] },
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 10_000.0,
        })
        .collect()
}

pub fn flat_bars(n: usize, price: f64) -> Vec<OhlcvBar> {
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

pub fn rising(n: usize, rate: f64) -> Vec<f64> {
    (0..n).map(|i| 100.0 * (1.0 + rate).powi(i as i32)).collect()
}

pub fn history(name: &str, bars: Vec<OhlcvBar>) -> InstrumentHistory {
    InstrumentHistory::new(PriceSeries::new(name, bars).unwrap())
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// In-memory price source keyed by (instrument, timeframe).
#[derive(Default)]
pub struct MockDataPort {
    pub data: HashMap<(String, String), Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, code: &str, timeframe: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert((code.to_string(), timeframe.to_string()), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        instrument: &str,
        timeframe: &str,
        _start: Option<NaiveDateTime>,
        _end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, TrendscreenError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(TrendscreenError::DataSource { reason: reason.clone() });
        }
        match self.data.get(&(instrument.to_string(), timeframe.to_string())) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(TrendscreenError::NoData {
                instrument: instrument.to_string(),
            }),
        }
    }

    fn list_symbols(&self, timeframe: &str) -> Result<Vec<String>, TrendscreenError> {
        let mut symbols: Vec<String> = self
            .data
            .keys()
            .filter(|(_, tf)| tf == timeframe)
            .map(|(code, _)| code.clone())
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Enters every instrument on bar `entry_bar` with a 5% stop and a 10% target.
pub struct Scripted {
    pub entry_bar: usize,
    pub exit_bar: Option<usize>,
    pub scores: HashMap<String, f64>,
    pub direction: Direction,
}

impl Scripted {
    pub fn new(entry_bar: usize) -> Self {
        Scripted {
            entry_bar,
            exit_bar: None,
            scores: HashMap::new(),
            direction: Direction::Buy,
        }
    }

    pub fn with_score(mut self, instrument: &str, score: f64) -> Self {
        self.scores.insert(instrument.to_string(), score);
        self
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
