//! CSV price files, one per instrument and timeframe: `{instrument}_{timeframe}.csv`.
//!
//! Header row required. The first column is `timestamp` (or `date`) as
//! `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`; then open, high, low, close and an
//! optional volume. Blank price cells load as NaN and propagate as undefined.
//!
//! Files for higher timeframes (`BHP_1w.csv`) must stamp each bar with the
//! close of its period, e.g. the Friday of a week. The backtest treats a bar
//! stamped `T` as complete at `T`.

use crate::domain::error::TrendscreenError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug)]
pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}_{timeframe}.csv"))
    }

    fn read_bars(&self, instrument: &str, timeframe: &str) -> Result<Vec<OhlcvBar>, TrendscreenError> {
        let path = self.csv_path(instrument, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrendscreenError::NoData {
                instrument: instrument.to_string(),
            },
            _ => TrendscreenError::DataSource {
                reason: format!("failed to read {}: {e}", path.display()),
            },
        })?;

        let invalid = |reason: String| TrendscreenError::InvalidData {
            instrument: instrument.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, row) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| invalid(format!("row {}: {e}", line + 1)))?;
            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| invalid(format!("row {}: bad timestamp {:?}", line + 1, row.timestamp)))?;
            bars.push(OhlcvBar {
                timestamp,
                open: row.open.unwrap_or(f64::NAN),
                high: row.high.unwrap_or(f64::NAN),
                low: row.low.unwrap_or(f64::NAN),
                close: row.close.unwrap_or(f64::NAN),
                volume: row.volume.unwrap_or(0.0),
            });
        }
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        instrument: &str,
        timeframe: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, TrendscreenError> {
        let bars: Vec<OhlcvBar> = self
            .read_bars(instrument, timeframe)?
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s) && end.is_none_or(|e| b.timestamp <= e))
            .collect();
        if bars.is_empty() {
            return Err(TrendscreenError::NoData {
                instrument: instrument.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self, timeframe: &str) -> Result<Vec<String>, TrendscreenError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TrendscreenError::DataSource {
            reason: format!("failed to read directory {}: {e}", self.base_path.display()),
        })?;

        let suffix = format!("_{timeframe}.csv");
        let mut symbols: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(&suffix).map(str::to_string)
            })
            .filter(|symbol| !symbol.is_empty())
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}
