//! JSON report writer. Writes to a file, or to stdout when no path is given.
//!
//! Infinite floats (an unbounded profit factor) serialize as `null`.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TrendscreenError;
use crate::domain::screening::{ScreeningReport, SignalDiff};
use crate::ports::report_port::ReportPort;

#[derive(Debug)]
pub struct JsonReportAdapter {
    output: Option<PathBuf>,
}

impl JsonReportAdapter {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<(), TrendscreenError> {
        let json = serde_json::to_string_pretty(value)?;
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json)?;
                info!(path = %path.display(), "report written");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{json}")?;
            }
        }
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_backtest(&self, result: &BacktestResult) -> Result<(), TrendscreenError> {
        self.emit(result)
    }

    fn write_screening(&self, report: &ScreeningReport) -> Result<(), TrendscreenError> {
        self.emit(report)
    }

    fn write_diff(&self, diff: &SignalDiff) -> Result<(), TrendscreenError> {
        self.emit(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Direction, Signal};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn report() -> ScreeningReport {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let signal = Signal::new("BHP", "trend_following", Direction::Buy, 72.5, ts, 45.0)
            .with_stop_loss(43.0)
            .with_take_profit(49.0);
        ScreeningReport {
            strategy: "trend_following".into(),
            generated_at: ts,
            instruments_scanned: 3,
            signal_count: 1,
            signals: vec![signal],
            errors: Vec::new(),
        }
    }

    #[test]
    fn writes_screening_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/screen.json");
        JsonReportAdapter::new(Some(path.clone()))
            .write_screening(&report())
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["instruments_scanned"], 3);
        assert_eq!(value["signals"][0]["direction"], "BUY");
        assert_eq!(value["signals"][0]["stop_loss"], 43.0);
    }

    #[test]
    fn round_trips_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("screen.json");
        JsonReportAdapter::new(Some(path.clone()))
            .write_screening(&report())
            .unwrap();
        let back: ScreeningReport = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, report());
    }
}
