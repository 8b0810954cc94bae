//! Domain error types.
//!
//! Four categories matter to callers: data problems (missing, empty or
//! malformed history), computation problems (structurally invalid bars),
//! capital problems (an entry cannot be funded) and configuration problems.
//! Only configuration errors are fatal to a run; the others are recorded per
//! instrument and the run carries on.

use chrono::NaiveDateTime;

#[derive(Debug, thiserror::Error)]
pub enum TrendscreenError {
    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("insufficient data for {instrument}: have {bars} bars, need {minimum}")]
    InsufficientData {
        instrument: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid data for {instrument}: {reason}")]
    InvalidData { instrument: String, reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("invalid bar for {instrument} at {timestamp}: {reason}")]
    Computation {
        instrument: String,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("cannot fund entry in {instrument}: {reason}")]
    Capital { instrument: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrendscreenError {
    /// Shorthand used by parameter validation in detectors and config loading.
    pub fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TrendscreenError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TrendscreenError::ConfigParse { .. }
                | TrendscreenError::ConfigMissing { .. }
                | TrendscreenError::ConfigInvalid { .. }
        )
    }
}

impl From<&TrendscreenError> for std::process::ExitCode {
    fn from(err: &TrendscreenError) -> Self {
        let code: u8 = match err {
            TrendscreenError::Io(_) | TrendscreenError::Json(_) => 1,
            TrendscreenError::ConfigParse { .. }
            | TrendscreenError::ConfigMissing { .. }
            | TrendscreenError::ConfigInvalid { .. } => 2,
            TrendscreenError::DataSource { .. } => 3,
            TrendscreenError::NoData { .. }
            | TrendscreenError::InsufficientData { .. }
            | TrendscreenError::InvalidData { .. } => 5,
            TrendscreenError::Computation { .. } => 6,
            TrendscreenError::Capital { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
