//! Price history acquisition port.

use crate::domain::error::TrendscreenError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for `instrument` on `timeframe`, ascending, restricted to
    /// `[start, end]` where given. An instrument with no bars in range is
    /// `NoData`.
    ///
    /// Higher-timeframe bars must be stamped at the close of their period. A
    /// bar stamped `T` is visible to detectors from base time `T` onward, so a
    /// weekly bar stamped on its Monday would leak the rest of that week.
    fn fetch_ohlcv(
        &self,
        instrument: &str,
        timeframe: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, TrendscreenError>;

    /// Instruments available on `timeframe`, sorted.
    fn list_symbols(&self, timeframe: &str) -> Result<Vec<String>, TrendscreenError>;

    /// First timestamp, last timestamp and bar count, if any data exists.
    fn get_data_range(
        &self,
        instrument: &str,
        timeframe: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, TrendscreenError> {
        let bars = match self.fetch_ohlcv(instrument, timeframe, None, None) {
            Ok(bars) => bars,
            Err(TrendscreenError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, bars.len())),
            _ => None,
        })
    }
}
