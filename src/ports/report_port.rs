//! Result persistence port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TrendscreenError;
use crate::domain::screening::{ScreeningReport, SignalDiff};

pub trait ReportPort {
    fn write_backtest(&self, result: &BacktestResult) -> Result<(), TrendscreenError>;

    fn write_screening(&self, report: &ScreeningReport) -> Result<(), TrendscreenError>;

    /// Diffs are only useful to a notifier; writers that have nowhere to put
    /// them ignore them.
    fn write_diff(&self, _diff: &SignalDiff) -> Result<(), TrendscreenError> {
        Ok(())
    }
}
