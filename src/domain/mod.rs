//! Core domain types and logic.

pub mod ohlcv;
pub mod series;
pub mod indicator;
pub mod signal;
pub mod detector;
pub mod cooldown;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod backtest;
pub mod metrics;
pub mod screening;
pub mod config_validation;
pub mod error;
