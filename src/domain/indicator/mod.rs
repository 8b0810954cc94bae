//! Technical indicator engine.
//!
//! Every indicator is a pure, causal function of the bars up to and
//! including position `i`. Columns are `Vec<Option<f64>>` aligned 1:1 with the
//! series; `None` marks an undefined value (warmup, missing input or a zero
//! denominator). Indicators are keyed by `IndicatorType`, which carries the
//! parameters and serves as the `HashMap` key.

pub mod atr;
pub mod bollinger;
pub mod directional;
pub mod heiken_ashi;
pub mod moving_average;
pub mod rsi;
pub mod smoothing;
pub mod structure;
pub mod trailing_stop;

use crate::domain::error::TrendscreenError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::series::PriceSeries;
use std::collections::HashMap;
use std::fmt;

pub type Column = Vec<Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Typical,
}

impl PriceField {
    pub fn extract(self, bar: &OhlcvBar) -> f64 {
        match self {
            PriceField::Open => bar.open,
            PriceField::High => bar.high,
            PriceField::Low => bar.low,
            PriceField::Close => bar.close,
            PriceField::Typical => bar.typical_price(),
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Typical => "typical",
        };
        f.write_str(name)
    }
}

/// Float parameters are keyed by their bit pattern so specs stay `Eq + Hash`
/// without rounding. `-0.0` is folded into `0.0`.
fn key_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

/// Bollinger parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BandSpec {
    pub period: usize,
    multiplier_bits: u64,
}

impl BandSpec {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            period,
            multiplier_bits: key_bits(multiplier),
        }
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier_bits)
    }
}

/// Pivot trailing-stop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrailingSpec {
    pub pivot_strength: usize,
    pub atr_period: usize,
    factor_bits: u64,
}

impl TrailingSpec {
    pub fn new(pivot_strength: usize, atr_period: usize, factor: f64) -> Self {
        Self {
            pivot_strength,
            atr_period,
            factor_bits: key_bits(factor),
        }
    }

    pub fn factor(&self) -> f64 {
        f64::from_bits(self.factor_bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma { period: usize, source: PriceField },
    Ema { period: usize, source: PriceField },
    Rsi(usize),
    Atr(usize),
    AtrPct(usize),
    PlusDi(usize),
    MinusDi(usize),
    Adx(usize),
    BollingerUpper(BandSpec),
    BollingerMiddle(BandSpec),
    BollingerLower(BandSpec),
    BollingerWidth(BandSpec),
    HaOpen,
    HaHigh,
    HaLow,
    HaClose,
    HaBollingerUpper(BandSpec),
    HaBollingerMiddle(BandSpec),
    HaBollingerLower(BandSpec),
    TrailingStop(TrailingSpec),
    TrailingTrend(TrailingSpec),
    StructureTrend(usize),
}

impl IndicatorType {
    pub fn sma(period: usize) -> Self {
        IndicatorType::Sma {
            period,
            source: PriceField::Close,
        }
    }

    pub fn ema(period: usize) -> Self {
        IndicatorType::Ema {
            period,
            source: PriceField::Close,
        }
    }

    /// Largest parameter window, used for minimum-history checks.
    pub fn lookback(&self) -> usize {
        match self {
            IndicatorType::Sma { period, .. }
            | IndicatorType::Ema { period, .. }
            | IndicatorType::Rsi(period)
            | IndicatorType::Atr(period)
            | IndicatorType::AtrPct(period)
            | IndicatorType::PlusDi(period)
            | IndicatorType::MinusDi(period)
            | IndicatorType::StructureTrend(period) => *period,
            IndicatorType::Adx(period) => period * 2,
            IndicatorType::BollingerUpper(b)
            | IndicatorType::BollingerMiddle(b)
            | IndicatorType::BollingerLower(b)
            | IndicatorType::BollingerWidth(b)
            | IndicatorType::HaBollingerUpper(b)
            | IndicatorType::HaBollingerMiddle(b)
            | IndicatorType::HaBollingerLower(b) => b.period,
            IndicatorType::HaOpen
            | IndicatorType::HaHigh
            | IndicatorType::HaLow
            | IndicatorType::HaClose => 1,
            IndicatorType::TrailingStop(t) | IndicatorType::TrailingTrend(t) => {
                t.atr_period.max(t.pivot_strength * 2 + 1)
            }
        }
    }
}

fn fmt_source(f: &mut fmt::Formatter<'_>, name: &str, period: usize, source: PriceField) -> fmt::Result {
    match source {
        PriceField::Close => write!(f, "{name}({period})"),
        other => write!(f, "{name}({period},{other})"),
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma { period, source } => fmt_source(f, "SMA", *period, *source),
            IndicatorType::Ema { period, source } => fmt_source(f, "EMA", *period, *source),
            IndicatorType::Rsi(p) => write!(f, "RSI({p})"),
            IndicatorType::Atr(p) => write!(f, "ATR({p})"),
            IndicatorType::AtrPct(p) => write!(f, "ATR_PCT({p})"),
            IndicatorType::PlusDi(p) => write!(f, "DI+({p})"),
            IndicatorType::MinusDi(p) => write!(f, "DI-({p})"),
            IndicatorType::Adx(p) => write!(f, "ADX({p})"),
            IndicatorType::BollingerUpper(b) => write!(f, "BB_UPPER({},{})", b.period, b.multiplier()),
            IndicatorType::BollingerMiddle(b) => write!(f, "BB_MIDDLE({},{})", b.period, b.multiplier()),
            IndicatorType::BollingerLower(b) => write!(f, "BB_LOWER({},{})", b.period, b.multiplier()),
            IndicatorType::BollingerWidth(b) => write!(f, "BB_WIDTH({},{})", b.period, b.multiplier()),
            IndicatorType::HaOpen => write!(f, "HA_OPEN"),
            IndicatorType::HaHigh => write!(f, "HA_HIGH"),
            IndicatorType::HaLow => write!(f, "HA_LOW"),
            IndicatorType::HaClose => write!(f, "HA_CLOSE"),
            IndicatorType::HaBollingerUpper(b) => {
                write!(f, "HA_BB_UPPER({},{})", b.period, b.multiplier())
            }
            IndicatorType::HaBollingerMiddle(b) => {
                write!(f, "HA_BB_MIDDLE({},{})", b.period, b.multiplier())
            }
            IndicatorType::HaBollingerLower(b) => {
                write!(f, "HA_BB_LOWER({},{})", b.period, b.multiplier())
            }
            IndicatorType::TrailingStop(t) => {
                write!(f, "TRAIL_STOP({},{},{})", t.pivot_strength, t.atr_period, t.factor())
            }
            IndicatorType::TrailingTrend(t) => {
                write!(f, "TRAIL_TREND({},{},{})", t.pivot_strength, t.atr_period, t.factor())
            }
            IndicatorType::StructureTrend(p) => write!(f, "STRUCTURE({p})"),
        }
    }
}

/// Indicator columns for one series, all of the same length as the series.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    len: usize,
    columns: HashMap<IndicatorType, Column>,
}

impl IndicatorSet {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Adds a column. Columns of the wrong length are padded or cut to the series length.
    pub fn insert(&mut self, ty: IndicatorType, mut column: Column) {
        column.resize(self.len, None);
        self.columns.insert(ty, column);
    }

    pub fn contains(&self, ty: &IndicatorType) -> bool {
        self.columns.contains_key(ty)
    }

    pub fn column(&self, ty: &IndicatorType) -> Option<&[Option<f64>]> {
        self.columns.get(ty).map(Vec::as_slice)
    }

    pub fn get(&self, ty: &IndicatorType, i: usize) -> Option<f64> {
        self.columns.get(ty).and_then(|col| col.get(i).copied().flatten())
    }

    pub fn types(&self) -> impl Iterator<Item = &IndicatorType> {
        self.columns.keys()
    }
}

/// Finite values of one price field; non-finite prices become `None`.
pub fn source_values(bars: &[OhlcvBar], field: PriceField) -> Column {
    bars.iter()
        .map(|bar| Some(field.extract(bar)).filter(|v| v.is_finite()))
        .collect()
}

/// Validates every bar, then computes each requested indicator (and its
/// siblings from the same calculation) over the whole series.
pub fn compute_indicators(
    series: &PriceSeries,
    types: &[IndicatorType],
) -> Result<IndicatorSet, TrendscreenError> {
    let bars = series.bars();
    for bar in bars {
        bar.check_structure()
            .map_err(|reason| TrendscreenError::Computation {
                instrument: series.instrument().to_string(),
                timestamp: bar.timestamp,
                reason,
            })?;
    }

    let mut set = IndicatorSet::new(bars.len());
    for ty in types {
        if set.contains(ty) {
            continue;
        }
        compute_into(&mut set, bars, *ty);
    }
    Ok(set)
}

fn compute_into(set: &mut IndicatorSet, bars: &[OhlcvBar], ty: IndicatorType) {
    match ty {
        IndicatorType::Sma { period, source } => {
            set.insert(ty, moving_average::calculate_sma(bars, period, source));
        }
        IndicatorType::Ema { period, source } => {
            set.insert(ty, moving_average::calculate_ema(bars, period, source));
        }
        IndicatorType::Rsi(period) => set.insert(ty, rsi::calculate_rsi(bars, period)),
        IndicatorType::Atr(period) | IndicatorType::AtrPct(period) => {
            let atr = atr::calculate_atr(bars, period);
            set.insert(IndicatorType::AtrPct(period), atr::atr_pct(bars, &atr));
            set.insert(IndicatorType::Atr(period), atr);
        }
        IndicatorType::PlusDi(period) | IndicatorType::MinusDi(period) | IndicatorType::Adx(period) => {
            let dm = directional::calculate_directional(bars, period);
            set.insert(IndicatorType::PlusDi(period), dm.plus_di);
            set.insert(IndicatorType::MinusDi(period), dm.minus_di);
            set.insert(IndicatorType::Adx(period), dm.adx);
        }
        IndicatorType::BollingerUpper(spec)
        | IndicatorType::BollingerMiddle(spec)
        | IndicatorType::BollingerLower(spec)
        | IndicatorType::BollingerWidth(spec) => {
            let bands = bollinger::calculate_bollinger(&source_values(bars, PriceField::Close), spec);
            set.insert(IndicatorType::BollingerUpper(spec), bands.upper);
            set.insert(IndicatorType::BollingerMiddle(spec), bands.middle);
            set.insert(IndicatorType::BollingerLower(spec), bands.lower);
            set.insert(IndicatorType::BollingerWidth(spec), bands.width);
        }
        IndicatorType::HaOpen | IndicatorType::HaHigh | IndicatorType::HaLow | IndicatorType::HaClose => {
            let ha = heiken_ashi::calculate_heiken_ashi(bars);
            set.insert(IndicatorType::HaOpen, ha.open);
            set.insert(IndicatorType::HaHigh, ha.high);
            set.insert(IndicatorType::HaLow, ha.low);
            set.insert(IndicatorType::HaClose, ha.close);
        }
        IndicatorType::HaBollingerUpper(spec)
        | IndicatorType::HaBollingerMiddle(spec)
        | IndicatorType::HaBollingerLower(spec) => {
            let ha = heiken_ashi::calculate_heiken_ashi(bars);
            let bands = bollinger::calculate_bollinger(&ha.close, spec);
            set.insert(IndicatorType::HaBollingerUpper(spec), bands.upper);
            set.insert(IndicatorType::HaBollingerMiddle(spec), bands.middle);
            set.insert(IndicatorType::HaBollingerLower(spec), bands.lower);
        }
        IndicatorType::TrailingStop(spec) | IndicatorType::TrailingTrend(spec) => {
            let line = trailing_stop::calculate_trailing_stop(bars, spec);
            set.insert(IndicatorType::TrailingStop(spec), line.level);
            set.insert(IndicatorType::TrailingTrend(spec), line.trend);
        }
        IndicatorType::StructureTrend(lookback) => {
            set.insert(ty, structure::calculate_structure_trend(bars, lookback));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    pub fn day(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i as i64)
    }

    /// Bars with high = close + 1, low = close - 1, open = previous close.
    pub fn make_bars(closes: &[f64]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                timestamp: day(i),
                open: if i == 0 { close } else { closes[i - 1] },
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    pub fn make_hlc(rows: &[(f64, f64, f64)]) -> Vec<OhlcvBar> {
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| OhlcvBar {
                timestamp: day(i),
                open: close,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }
}
