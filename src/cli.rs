//! CLI definition and dispatch.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};

use crate::adapters::csv_adapter::{CsvAdapter, parse_timestamp};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{InstrumentError, InstrumentHistory, run_backtest};
use crate::domain::config_validation::{BACKTEST, validate_backtest_config, validate_strategy_config};
use crate::domain::detector::{Detector, StrategyKind};
use crate::domain::error::TrendscreenError;
use crate::domain::metrics::PerformanceMetrics;
use crate::domain::screening::{ScreeningReport, ScreeningRequest, diff_signals, screen};
use crate::domain::series::PriceSeries;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_TIMEFRAME: &str = "1d";

#[derive(Parser, Debug)]
#[command(name = "trendscreen", about = "Multi-strategy technical screener and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over the configured universe
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// JSON report path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated instruments, overriding [backtest] codes
        #[arg(long)]
        code: Option<String>,
    },
    /// Screen the universe for signals on the latest bar
    Screen {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        /// Evaluate at the last bar at or before this date
        #[arg(long)]
        as_of: Option<String>,
        /// Earlier screening report to diff against
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Where to write the diff; requires --previous
        #[arg(long, requires = "previous")]
        diff: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List instruments with price files
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data range for instruments
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest { config, output, code } => run_backtest_command(&config, output, code.as_deref()),
        Command::Screen {
            config,
            output,
            code,
            as_of,
            previous,
            diff,
        } => run_screen(
            &config,
            output,
            code.as_deref(),
            as_of.as_deref(),
            previous.as_deref(),
            diff,
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TrendscreenError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn data_adapter(config: &dyn ConfigPort) -> CsvAdapter {
    let dir = config
        .get_string(BACKTEST, "data_dir")
        .unwrap_or_else(|| ".".to_string());
    CsvAdapter::new(PathBuf::from(dir))
}

fn timeframe(config: &dyn ConfigPort) -> String {
    config
        .get_string(BACKTEST, "timeframe")
        .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string())
}

/// Instruments to process: the override, then `[backtest] codes`, then
/// every instrument the data source has on the base timeframe.
pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
    data: &dyn DataPort,
) -> Result<Vec<String>, TrendscreenError> {
    let mut codes: Vec<String> = match code_override {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        None => config.get_list(BACKTEST, "codes"),
    };
    if codes.is_empty() {
        codes = data.list_symbols(&timeframe(config))?;
    }
    if codes.is_empty() {
        return Err(TrendscreenError::ConfigMissing {
            section: BACKTEST.to_string(),
            key: "codes".to_string(),
        });
    }
    codes.sort();
    codes.dedup();
    Ok(codes)
}

/// Fetches base and higher-timeframe history. Instruments whose base history
/// cannot be loaded are returned as errors; a missing higher timeframe is not
/// an error.
pub fn load_histories(
    data: &dyn DataPort,
    codes: &[String],
    base_timeframe: &str,
    higher_timeframe: Option<&str>,
) -> (Vec<InstrumentHistory>, Vec<InstrumentError>) {
    let mut histories = Vec::with_capacity(codes.len());
    let mut errors = Vec::new();

    for code in codes {
        let base = data
            .fetch_ohlcv(code, base_timeframe, None, None)
            .and_then(|bars| PriceSeries::new(code.as_str(), bars));
        let mut history = match base {
            Ok(series) => InstrumentHistory::new(series),
            Err(e) => {
                warn!(instrument = %code, error = %e, "skipping instrument");
                errors.push(InstrumentError::new(code.as_str(), &e));
                continue;
            }
        };

        if let Some(label) = higher_timeframe {
            match data
                .fetch_ohlcv(code, label, None, None)
                .and_then(|bars| PriceSeries::new(code.as_str(), bars))
            {
                Ok(series) => history = history.with_higher(label, series),
                Err(e) => debug!(instrument = %code, timeframe = label, error = %e, "no higher timeframe"),
            }
        }
        histories.push(history);
    }
    (histories, errors)
}

struct Universe {
    detector: StrategyKind,
    histories: Vec<InstrumentHistory>,
    load_errors: Vec<InstrumentError>,
}

fn load_universe(config: &FileConfigAdapter, code_override: Option<&str>) -> Result<Universe, TrendscreenError> {
    let detector = validate_strategy_config(config)?;
    let data = data_adapter(config);
    let codes = resolve_codes(code_override, config, &data)?;
    let (histories, load_errors) = load_histories(&data, &codes, &timeframe(config), detector.higher_timeframe());
    if histories.is_empty() {
        return Err(TrendscreenError::DataSource {
            reason: format!("none of {} instruments had usable data", codes.len()),
        });
    }
    Ok(Universe {
        detector,
        histories,
        load_errors,
    })
}

fn print_metrics(metrics: &PerformanceMetrics) {
    eprintln!("\n=== Results ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return_pct);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown_pct);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Expectancy:       {:.2}", metrics.expectancy);

    if !metrics.exit_reasons.is_empty() {
        eprintln!("\n=== Exit Reasons ===");
        for (reason, stats) in &metrics.exit_reasons {
            eprintln!(
                "  {reason}: {} trades, avg {:+.2}%, {:.1} bars",
                stats.count, stats.avg_pnl_pct, stats.avg_holding_bars
            );
        }
    }
}

fn run_backtest_command(config_path: &Path, output: Option<PathBuf>, code: Option<&str>) -> Result<(), TrendscreenError> {
    let config = load_config(config_path)?;
    let bt_config = validate_backtest_config(&config)?;
    let universe = load_universe(&config, code)?;

    let mut result = run_backtest(&universe.histories, &universe.detector, &bt_config);
    let mut errors = universe.load_errors;
    errors.append(&mut result.errors);
    result.errors = errors;

    print_metrics(&result.metrics);
    if !result.errors.is_empty() {
        eprintln!("\n{} instruments failed:", result.errors.len());
        for e in &result.errors {
            eprintln!("  {}: {}", e.instrument, e.error);
        }
    }

    JsonReportAdapter::new(output).write_backtest(&result)
}

fn parse_as_of(raw: &str) -> Result<NaiveDateTime, TrendscreenError> {
    parse_timestamp(raw).ok_or_else(|| TrendscreenError::invalid_config("cli", "as_of", format!("bad date {raw:?}")))
}

fn run_screen(
    config_path: &Path,
    output: Option<PathBuf>,
    code: Option<&str>,
    as_of: Option<&str>,
    previous: Option<&Path>,
    diff_output: Option<PathBuf>,
) -> Result<(), TrendscreenError> {
    let config = load_config(config_path)?;
    let bt_config = validate_backtest_config(&config)?;
    let universe = load_universe(&config, code)?;

    let request = ScreeningRequest {
        target_reward_risk: bt_config.target_reward_risk,
        spread: bt_config.spread,
        generated_at: chrono::Local::now().naive_local(),
        as_of: as_of.map(parse_as_of).transpose()?,
    };
    let mut report = screen(&universe.histories, &universe.detector, &request);
    report.instruments_scanned += universe.load_errors.len();
    let mut errors = universe.load_errors;
    errors.append(&mut report.errors);
    report.errors = errors;

    for signal in &report.signals {
        eprintln!(
            "  {:<8} {:<4} score {:>5.1}  price {:.4}",
            signal.instrument, signal.direction, signal.score, signal.price
        );
    }
    eprintln!(
        "{} signals from {} instruments",
        report.signal_count, report.instruments_scanned
    );

    if let Some(path) = previous {
        let earlier: ScreeningReport = serde_json::from_str(&fs::read_to_string(path)?)?;
        let diff = diff_signals(&earlier.signals, &report.signals);
        eprintln!(
            "changes: {} new, {} reversed, {} disappeared",
            diff.new.len(),
            diff.reversed.len(),
            diff.disappeared.len()
        );
        if let Some(path) = diff_output {
            JsonReportAdapter::new(Some(path)).write_diff(&diff)?;
        }
    }

    JsonReportAdapter::new(output).write_screening(&report)
}

fn run_validate(config_path: &Path) -> Result<(), TrendscreenError> {
    let config = load_config(config_path)?;
    if !config.has_section(BACKTEST) {
        warn!("no [backtest] section, using defaults");
    }
    let bt_config = validate_backtest_config(&config)?;
    let detector = validate_strategy_config(&config)?;

    eprintln!("Strategy: {}", detector.name());
    eprintln!("Minimum history: {} bars", detector.min_bars());
    let mut indicators: Vec<String> = detector
        .required_indicators()
        .iter()
        .map(ToString::to_string)
        .collect();
    indicators.sort();
    eprintln!("Indicators: {}", indicators.join(", "));
    if let Some(label) = detector.higher_timeframe() {
        eprintln!("Higher timeframe: {label}");
    }
    eprintln!(
        "Capital {:.2}, {} positions max, {:.1}% per entry",
        bt_config.initial_capital,
        bt_config.max_positions,
        bt_config.position_size_pct * 100.0
    );
    eprintln!("Configuration is valid.");
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), TrendscreenError> {
    let config = load_config(config_path)?;
    let symbols = data_adapter(&config).list_symbols(&timeframe(&config))?;
    for symbol in &symbols {
        println!("{symbol}");
    }
    eprintln!("{} symbols found", symbols.len());
    Ok(())
}

fn run_info(config_path: &Path, code: Option<&str>) -> Result<(), TrendscreenError> {
    let config = load_config(config_path)?;
    let data = data_adapter(&config);
    let tf = timeframe(&config);
    for code in resolve_codes(code, &config, &data)? {
        match data.get_data_range(&code, &tf)? {
            Some((first, last, bars)) => println!("{code}\t{first}\t{last}\t{bars}"),
            None => println!("{code}\tno data"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_screen_arguments() {
        let cli = Cli::try_parse_from([
            "trendscreen",
            "screen",
            "-c",
            "cfg.ini",
            "--as-of",
            "2024-03-01",
            "--previous",
            "old.json",
            "--diff",
            "diff.json",
        ])
        .unwrap();
        match cli.command {
            Command::Screen { as_of, previous, diff, .. } => {
                assert_eq!(as_of.as_deref(), Some("2024-03-01"));
                assert_eq!(previous, Some(PathBuf::from("old.json")));
                assert_eq!(diff, Some(PathBuf::from("diff.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn diff_requires_previous() {
        assert!(Cli::try_parse_from(["trendscreen", "screen", "-c", "cfg.ini", "--diff", "d.json"]).is_err());
    }

    #[test]
    fn as_of_parsing() {
        assert!(parse_as_of("2024-03-01").is_ok());
        assert!(parse_as_of("yesterday").is_err());
    }
}
