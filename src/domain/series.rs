//! Price series, augmented series and the unified timeline.
//!
//! A `SeriesView` is the only way detectors see data: it exposes positions
//! `0..=end` and nothing later, so strategy code cannot peek past the bar
//! being evaluated.

use crate::domain::error::TrendscreenError;
use crate::domain::indicator::{IndicatorSet, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Indicator values captured at one bar, keyed by indicator display name.
pub type IndicatorSnapshot = BTreeMap<String, f64>;

/// Time-ordered bars for one instrument. Timestamps are strictly increasing.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    instrument: String,
    bars: Vec<OhlcvBar>,
    index: HashMap<NaiveDateTime, usize>,
}

impl PriceSeries {
    pub fn new(instrument: impl Into<String>, bars: Vec<OhlcvBar>) -> Result<Self, TrendscreenError> {
        let instrument = instrument.into();
        if bars.is_empty() {
            return Err(TrendscreenError::NoData { instrument });
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(TrendscreenError::InvalidData {
                reason: format!(
                    "timestamps not strictly increasing at {} -> {}",
                    pair[0].timestamp, pair[1].timestamp
                ),
                instrument,
            });
        }
        let index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.timestamp, i))
            .collect();
        Ok(Self {
            instrument,
            bars,
            index,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get_bar(&self, timestamp: NaiveDateTime) -> Option<&OhlcvBar> {
        self.index_of(timestamp).map(|i| &self.bars[i])
    }

    pub fn index_of(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.index.get(&timestamp).copied()
    }

    /// Position of the last bar whose timestamp is `<= timestamp`.
    pub fn index_at_or_before(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.bars
            .partition_point(|bar| bar.timestamp <= timestamp)
            .checked_sub(1)
    }

    pub fn first_timestamp(&self) -> NaiveDateTime {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> NaiveDateTime {
        self.bars[self.bars.len() - 1].timestamp
    }
}

/// A price series with its indicator columns attached.
#[derive(Debug, Clone)]
pub struct AugmentedSeries {
    series: PriceSeries,
    indicators: IndicatorSet,
}

impl AugmentedSeries {
    pub fn new(series: PriceSeries, indicators: IndicatorSet) -> Self {
        Self { series, indicators }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    pub fn instrument(&self) -> &str {
        self.series.instrument()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// View ending at position `end`, or `None` when out of range.
    pub fn view(&self, end: usize) -> Option<SeriesView<'_>> {
        (end < self.len()).then_some(SeriesView { data: self, end })
    }

    /// View ending at the bar stamped exactly `timestamp`.
    pub fn view_on(&self, timestamp: NaiveDateTime) -> Option<SeriesView<'_>> {
        self.series.index_of(timestamp).and_then(|i| self.view(i))
    }

    /// View ending at the last bar stamped at or before `timestamp`.
    pub fn view_at_or_before(&self, timestamp: NaiveDateTime) -> Option<SeriesView<'_>> {
        self.series
            .index_at_or_before(timestamp)
            .and_then(|i| self.view(i))
    }

    pub fn latest_view(&self) -> Option<SeriesView<'_>> {
        self.len().checked_sub(1).and_then(|i| self.view(i))
    }
}

/// Read-only window over an augmented series ending at `end` (inclusive).
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    data: &'a AugmentedSeries,
    end: usize,
}

impl<'a> SeriesView<'a> {
    pub fn instrument(&self) -> &'a str {
        self.data.instrument()
    }

    /// Number of visible bars.
    pub fn len(&self) -> usize {
        self.end + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn bars(&self) -> &'a [OhlcvBar] {
        &self.data.series.bars()[..=self.end]
    }

    pub fn last_bar(&self) -> &'a OhlcvBar {
        &self.data.series.bars()[self.end]
    }

    /// The bar `back` positions before the last visible one.
    pub fn bar_back(&self, back: usize) -> Option<&'a OhlcvBar> {
        self.end
            .checked_sub(back)
            .map(|i| &self.data.series.bars()[i])
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.last_bar().timestamp
    }

    pub fn close(&self) -> f64 {
        self.last_bar().close
    }

    /// Indicator value at position `i`, `None` if undefined or not visible.
    pub fn value(&self, ty: &IndicatorType, i: usize) -> Option<f64> {
        if i > self.end {
            return None;
        }
        self.data.indicators.get(ty, i)
    }

    pub fn latest(&self, ty: &IndicatorType) -> Option<f64> {
        self.value(ty, self.end)
    }

    /// Indicator value `back` bars before the last visible one.
    pub fn back(&self, ty: &IndicatorType, back: usize) -> Option<f64> {
        self.end.checked_sub(back).and_then(|i| self.value(ty, i))
    }

    /// Visible part of an indicator column.
    pub fn column(&self, ty: &IndicatorType) -> Option<&'a [Option<f64>]> {
        self.data
            .indicators
            .column(ty)
            .map(|col| &col[..=self.end])
    }

    /// The last `n` values of a column, all defined, oldest first.
    pub fn window(&self, ty: &IndicatorType, n: usize) -> Option<Vec<f64>> {
        if n == 0 || n > self.len() {
            return None;
        }
        let col = self.column(ty)?;
        col[col.len() - n..].iter().copied().collect()
    }

    /// Defined values of `types` at the last visible bar.
    pub fn snapshot(&self, types: &[IndicatorType]) -> IndicatorSnapshot {
        types
            .iter()
            .filter_map(|ty| self.latest(ty).map(|v| (ty.to_string(), v)))
            .collect()
    }
}

/// Detector input: the base-timeframe view plus any higher-timeframe views,
/// keyed by timeframe label ("1w", "4h", ...).
#[derive(Debug, Clone)]
pub struct Timeframes<'a> {
    pub base: SeriesView<'a>,
    higher: BTreeMap<String, SeriesView<'a>>,
}

impl<'a> Timeframes<'a> {
    pub fn new(base: SeriesView<'a>) -> Self {
        Self {
            base,
            higher: BTreeMap::new(),
        }
    }

    pub fn with_higher(mut self, label: impl Into<String>, view: SeriesView<'a>) -> Self {
        self.higher.insert(label.into(), view);
        self
    }

    pub fn higher(&self, label: &str) -> Option<&SeriesView<'a>> {
        self.higher.get(label)
    }
}

/// One instrument's augmented history on every timeframe it was loaded for.
///
/// Higher-timeframe bars are stamped at the close of their period, so a bar
/// stamped `T` is visible from base time `T` onward.
#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub base: AugmentedSeries,
    pub higher: BTreeMap<String, AugmentedSeries>,
}

impl InstrumentData {
    pub fn new(base: AugmentedSeries) -> Self {
        Self {
            base,
            higher: BTreeMap::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        self.base.instrument()
    }

    fn attach_higher<'a>(&'a self, base: SeriesView<'a>) -> Timeframes<'a> {
        let now = base.timestamp();
        self.higher
            .iter()
            .filter_map(|(label, series)| series.view_at_or_before(now).map(|v| (label, v)))
            .fold(Timeframes::new(base), |tf, (label, v)| tf.with_higher(label.as_str(), v))
    }

    /// Views ending at the base bar stamped exactly `timestamp`; `None` when
    /// the instrument has no bar at that step.
    pub fn timeframes_on(&self, timestamp: NaiveDateTime) -> Option<Timeframes<'_>> {
        self.base.view_on(timestamp).map(|v| self.attach_higher(v))
    }

    /// Views ending at the base bar at position `end`.
    pub fn timeframes_at(&self, end: usize) -> Option<Timeframes<'_>> {
        self.base.view(end).map(|v| self.attach_higher(v))
    }

    pub fn latest_timeframes(&self) -> Option<Timeframes<'_>> {
        self.base.latest_view().map(|v| self.attach_higher(v))
    }
}

/// Sorted union of all bar timestamps, restricted to `[start, end]`.
pub fn build_unified_timeline<'a, I>(
    series: I,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Vec<NaiveDateTime>
where
    I: IntoIterator<Item = &'a PriceSeries>,
{
    let unique: BTreeSet<NaiveDateTime> = series
        .into_iter()
        .flat_map(|s| s.bars().iter().map(|bar| bar.timestamp))
        .filter(|ts| start.is_none_or(|s| *ts >= s) && end.is_none_or(|e| *ts <= e))
        .collect();
    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn make_bar(date: NaiveDateTime, close: f64) -> OhlcvBar {
        OhlcvBar {
            timestamp: date,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000.0,
        }
    }

    fn series(code: &str, days: &[u32]) -> PriceSeries {
        let bars = days
            .iter()
            .enumerate()
            .map(|(i, d)| make_bar(ts(2024, 1, *d), 100.0 + i as f64))
            .collect();
        PriceSeries::new(code, bars).unwrap()
    }

    #[test]
    fn new_rejects_empty() {
        let err = PriceSeries::new("BHP", vec![]).unwrap_err();
        assert!(matches!(err, TrendscreenError::NoData { .. }));
    }

    #[test]
    fn new_rejects_unordered_timestamps() {
        let bars = vec![make_bar(ts(2024, 1, 3), 1.0), make_bar(ts(2024, 1, 1), 2.0)];
        let err = PriceSeries::new("BHP", bars).unwrap_err();
        assert!(matches!(err, TrendscreenError::InvalidData { .. }));
    }

    #[test]
    fn new_rejects_duplicate_timestamps() {
        let bars = vec![make_bar(ts(2024, 1, 1), 1.0), make_bar(ts(2024, 1, 1), 2.0)];
        assert!(PriceSeries::new("BHP", bars).is_err());
    }

    #[test]
    fn lookup_by_timestamp() {
        let s = series("BHP", &[1, 2, 5]);
        assert_eq!(s.index_of(ts(2024, 1, 2)), Some(1));
        assert!((s.get_bar(ts(2024, 1, 5)).unwrap().close - 102.0).abs() < f64::EPSILON);
        assert!(s.get_bar(ts(2024, 1, 3)).is_none());
    }

    #[test]
    fn index_at_or_before_handles_gaps() {
        let s = series("BHP", &[2, 5]);
        assert_eq!(s.index_at_or_before(ts(2024, 1, 1)), None);
        assert_eq!(s.index_at_or_before(ts(2024, 1, 2)), Some(0));
        assert_eq!(s.index_at_or_before(ts(2024, 1, 4)), Some(0));
        assert_eq!(s.index_at_or_before(ts(2024, 1, 9)), Some(1));
    }

    #[test]
    fn view_hides_future_bars() {
        let aug = AugmentedSeries::new(series("BHP", &[1, 2, 3, 4]), IndicatorSet::new(4));
        let view = aug.view(1).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.bars().len(), 2);
        assert_eq!(view.timestamp(), ts(2024, 1, 2));
        assert!(view.bar_back(2).is_none());
        assert!(aug.view(4).is_none());
    }

    #[test]
    fn view_value_masks_positions_after_end() {
        let mut set = IndicatorSet::new(3);
        set.insert(IndicatorType::Rsi(2), vec![Some(1.0), Some(2.0), Some(3.0)]);
        let aug = AugmentedSeries::new(series("BHP", &[1, 2, 3]), set);
        let view = aug.view(1).unwrap();
        assert_eq!(view.latest(&IndicatorType::Rsi(2)), Some(2.0));
        assert_eq!(view.value(&IndicatorType::Rsi(2), 2), None);
        assert_eq!(view.column(&IndicatorType::Rsi(2)).unwrap().len(), 2);
        assert_eq!(view.window(&IndicatorType::Rsi(2), 2), Some(vec![1.0, 2.0]));
        assert_eq!(view.window(&IndicatorType::Rsi(2), 3), None);
    }

    #[test]
    fn window_requires_all_defined() {
        let mut set = IndicatorSet::new(3);
        set.insert(IndicatorType::Rsi(2), vec![None, Some(2.0), Some(3.0)]);
        let aug = AugmentedSeries::new(series("BHP", &[1, 2, 3]), set);
        let view = aug.latest_view().unwrap();
        assert_eq!(view.window(&IndicatorType::Rsi(2), 3), None);
        assert_eq!(view.window(&IndicatorType::Rsi(2), 2), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn snapshot_skips_undefined() {
        let mut set = IndicatorSet::new(2);
        set.insert(IndicatorType::Rsi(2), vec![Some(1.0), Some(55.0)]);
        set.insert(IndicatorType::Atr(2), vec![None, None]);
        let aug = AugmentedSeries::new(series("BHP", &[1, 2]), set);
        let snap = aug
            .latest_view()
            .unwrap()
            .snapshot(&[IndicatorType::Rsi(2), IndicatorType::Atr(2)]);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("RSI(2)"), Some(&55.0));
    }

    #[test]
    fn higher_timeframe_is_cut_at_base_time() {
        let base = AugmentedSeries::new(series("BHP", &[1, 2, 3, 4, 5, 6, 7, 8]), IndicatorSet::new(8));
        let weekly = AugmentedSeries::new(series("BHP", &[5, 12]), IndicatorSet::new(2));
        let mut data = InstrumentData::new(base);
        data.higher.insert("1w".into(), weekly);

        let early = data.timeframes_on(ts(2024, 1, 3)).unwrap();
        assert!(early.higher("1w").is_none());

        let later = data.timeframes_on(ts(2024, 1, 8)).unwrap();
        let w = later.higher("1w").unwrap();
        assert_eq!(w.len(), 1);
        assert_eq!(w.timestamp(), ts(2024, 1, 5));

        assert!(data.timeframes_on(ts(2024, 1, 20)).is_none());
        assert_eq!(data.latest_timeframes().unwrap().base.timestamp(), ts(2024, 1, 8));
    }

    #[test]
    fn higher_timeframe_bar_visible_from_its_own_stamp() {
        let base = AugmentedSeries::new(series("BHP", &[1, 2, 3, 4, 5, 8]), IndicatorSet::new(6));
        let weekly = AugmentedSeries::new(series("BHP", &[5]), IndicatorSet::new(1));
        let mut data = InstrumentData::new(base);
        data.higher.insert("1w".into(), weekly);

        assert!(data.timeframes_on(ts(2024, 1, 4)).unwrap().higher("1w").is_none());
        let on_close = data.timeframes_on(ts(2024, 1, 5)).unwrap();
        assert_eq!(on_close.higher("1w").unwrap().timestamp(), ts(2024, 1, 5));
    }

    #[test]
    fn unified_timeline_merges_and_sorts() {
        let bhp = series("BHP", &[2, 5]);
        let rio = series("RIO", &[1, 3, 5]);
        let timeline = build_unified_timeline([&bhp, &rio], None, None);
        assert_eq!(
            timeline,
            vec![ts(2024, 1, 1), ts(2024, 1, 2), ts(2024, 1, 3), ts(2024, 1, 5)]
        );
    }

    #[test]
    fn unified_timeline_respects_range() {
        let bhp = series("BHP", &[1, 2, 3, 4, 5]);
        let timeline =
            build_unified_timeline([&bhp], Some(ts(2024, 1, 2)), Some(ts(2024, 1, 4)));
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0], ts(2024, 1, 2));
        assert_eq!(timeline[2], ts(2024, 1, 4));
    }

    #[test]
    fn unified_timeline_empty() {
        let timeline = build_unified_timeline(std::iter::empty::<&PriceSeries>(), None, None);
        assert!(timeline.is_empty());
    }
}
