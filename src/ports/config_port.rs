//! Configuration access port.
//!
//! Adapters supply raw strings; the typed getters parse them and report a
//! present-but-unparseable value as `ConfigInvalid` instead of falling back
//! to the default.

use crate::domain::error::TrendscreenError;
use std::str::FromStr;

pub trait ConfigPort {
    /// Raw value, or `None` when the key is absent or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn require_string(&self, section: &str, key: &str) -> Result<String, TrendscreenError> {
        self.get_string(section, key)
            .ok_or_else(|| TrendscreenError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, TrendscreenError> {
        parse_or(self, section, key, default, "a number")
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, TrendscreenError> {
        parse_or(self, section, key, default, "an integer")
    }

    /// Non-negative integer, for periods and counts.
    fn get_usize(&self, section: &str, key: &str, default: usize) -> Result<usize, TrendscreenError> {
        parse_or(self, section, key, default, "a non-negative integer")
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, TrendscreenError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(TrendscreenError::invalid_config(
                    section,
                    key,
                    format!("expected true/false, got {raw:?}"),
                )),
            },
        }
    }

    /// Comma-separated list; empty when the key is absent.
    fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_string(section, key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_or<C, T>(config: &C, section: &str, key: &str, default: T, expected: &str) -> Result<T, TrendscreenError>
where
    C: ConfigPort + ?Sized,
    T: FromStr,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            TrendscreenError::invalid_config(section, key, format!("expected {expected}, got {raw:?}"))
        }),
    }
}
