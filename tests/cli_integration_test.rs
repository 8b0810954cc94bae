//! CLI orchestration tests: code resolution, history loading and full
//! pipelines over CSV files on disk.

mod common;

use common::*;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;
use trendscreen::adapters::file_config_adapter::FileConfigAdapter;
use trendscreen::cli::{self, Cli, Command};
use trendscreen::domain::error::TrendscreenError;
use trendscreen::domain::screening::{ScreeningReport, SignalDiff};

fn write_csv(dir: &Path, name: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for bar in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    fs::write(dir.join(name), content).unwrap();
}

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "UP_1d.csv", &bars_from_closes(&rising(60, 0.01)));
    write_csv(dir.path(), "FLAT_1d.csv", &flat_bars(60, 100.0));
    dir
}

fn trend_ini(data: &Path) -> String {
    format!(
        "[backtest]\n\
         data_dir = {}\n\
         initial_capital = 100000\n\
         position_size_pct = 0.2\n\
         max_positions = 5\n\
         commission = 9.95\n\
         \n\
         [strategy]\n\
         kind = trend_following\n\
         proximity = 0.15\n",
        data.display()
    )
}

fn succeeded(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}

mod code_resolution {
    use super::*;

    fn port() -> MockDataPort {
        MockDataPort::new()
            .with_bars("RIO", "1d", flat_bars(3, 10.0))
            .with_bars("BHP", "1d", flat_bars(3, 10.0))
            .with_bars("CBA", "1w", flat_bars(3, 10.0))
    }

    #[test]
    fn override_wins_and_is_deduplicated() {
        let config = FileConfigAdapter::from_string("[backtest]\ncodes = AAA\n").unwrap();
        let codes = cli::resolve_codes(Some("ZZZ, BHP,ZZZ"), &config, &port()).unwrap();
        assert_eq!(codes, vec!["BHP", "ZZZ"]);
    }

    #[test]
    fn config_codes_before_discovery() {
        let config = FileConfigAdapter::from_string("[backtest]\ncodes = WBC, ANZ\n").unwrap();
        assert_eq!(cli::resolve_codes(None, &config, &port()).unwrap(), vec!["ANZ", "WBC"]);
    }

    #[test]
    fn discovers_symbols_on_the_base_timeframe() {
        let config = FileConfigAdapter::from_string("[backtest]\ninitial_capital = 1000\n").unwrap();
        assert_eq!(cli::resolve_codes(None, &config, &port()).unwrap(), vec!["BHP", "RIO"]);

        let weekly = FileConfigAdapter::from_string("[backtest]\ntimeframe = 1w\n").unwrap();
        assert_eq!(cli::resolve_codes(None, &weekly, &port()).unwrap(), vec!["CBA"]);
    }

    #[test]
    fn nothing_to_process_is_a_config_error() {
        let config = FileConfigAdapter::from_string("[backtest]\ntimeframe = 1h\n").unwrap();
        let err = cli::resolve_codes(None, &config, &port()).unwrap_err();
        assert!(matches!(err, TrendscreenError::ConfigMissing { .. }));
    }
}

mod history_loading {
    use super::*;

    #[test]
    fn failures_are_reported_and_others_load() {
        let port = MockDataPort::new()
            .with_bars("BHP", "1d", flat_bars(10, 40.0))
            .with_bars("BHP", "1w", flat_bars(2, 40.0))
            .with_bars("RIO", "1d", flat_bars(10, 90.0))
            .with_error("BAD", "connection reset");
        let codes = vec!["BAD".to_string(), "BHP".to_string(), "MISSING".to_string(), "RIO".to_string()];

        let (histories, errors) = cli::load_histories(&port, &codes, "1d", Some("1w"));

        let loaded: Vec<&str> = histories.iter().map(|h| h.instrument()).collect();
        assert_eq!(loaded, vec!["BHP", "RIO"]);
        assert!(histories[0].higher.contains_key("1w"));
        assert!(histories[1].higher.is_empty());

        let failed: Vec<&str> = errors.iter().map(|e| e.instrument.as_str()).collect();
        assert_eq!(failed, vec!["BAD", "MISSING"]);
        assert!(errors[0].error.contains("connection reset"));
    }

    #[test]
    fn out_of_order_history_is_an_error() {
        let mut bars = flat_bars(5, 10.0);
        bars.swap(1, 2);
        let port = MockDataPort::new().with_bars("OOO", "1d", bars);
        let (histories, errors) = cli::load_histories(&port, &["OOO".to_string()], "1d", None);
        assert!(histories.is_empty());
        assert_eq!(errors.len(), 1);
    }
}

mod commands {
    use super::*;

    #[test]
    fn backtest_writes_json_report() {
        let data = data_dir();
        let ini = write_temp_ini(&trend_ini(data.path()));
        let out = data.path().join("reports/backtest.json");

        let code = cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                output: Some(out.clone()),
                code: None,
            },
        });
        assert!(succeeded(code));

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(value["strategy"], "trend_following");
        assert_eq!(value["instruments"], 2);
        assert!(value["trades"].as_array().unwrap().iter().all(|t| t["instrument"] == "UP"));
        assert_eq!(value["equity_curve"].as_array().unwrap().len(), 60);
    }

    #[test]
    fn missing_instrument_files_are_reported_not_fatal() {
        let data = data_dir();
        let ini = write_temp_ini(&trend_ini(data.path()));
        let out = data.path().join("bt.json");

        let code = cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                output: Some(out.clone()),
                code: Some("UP,GONE".to_string()),
            },
        });
        assert!(succeeded(code));

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(value["errors"][0]["instrument"], "GONE");
    }

    #[test]
    fn screen_then_diff_against_previous() {
        let data = data_dir();
        let ini = write_temp_ini(&trend_ini(data.path()));
        let first = data.path().join("first.json");
        let second = data.path().join("second.json");
        let diff = data.path().join("diff.json");

        let code = cli::run(Cli {
            command: Command::Screen {
                config: ini.path().to_path_buf(),
                output: Some(first.clone()),
                code: None,
                as_of: Some("2024-01-10".to_string()),
                previous: None,
                diff: None,
            },
        });
        assert!(succeeded(code));
        let early: ScreeningReport = serde_json::from_str(&fs::read_to_string(&first).unwrap()).unwrap();
        assert!(early.signals.is_empty());

        let code = cli::run(Cli {
            command: Command::Screen {
                config: ini.path().to_path_buf(),
                output: Some(second.clone()),
                code: None,
                as_of: None,
                previous: Some(first),
                diff: Some(diff.clone()),
            },
        });
        assert!(succeeded(code));

        let latest: ScreeningReport = serde_json::from_str(&fs::read_to_string(second).unwrap()).unwrap();
        assert_eq!(latest.signal_count, 1);
        assert_eq!(latest.signals[0].instrument, "UP");

        let changes: SignalDiff = serde_json::from_str(&fs::read_to_string(diff).unwrap()).unwrap();
        assert_eq!(changes.new.len(), 1);
        assert!(changes.reversed.is_empty());
        assert!(changes.disappeared.is_empty());
    }

    #[test]
    fn validate_accepts_good_config() {
        let data = data_dir();
        let ini = write_temp_ini(&trend_ini(data.path()));
        let code = cli::run(Cli {
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(succeeded(code));
    }

    #[test]
    fn validate_rejects_unknown_strategy() {
        let ini = write_temp_ini("[strategy]\nkind = astrology\n");
        let code = cli::run(Cli {
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::from(2)));
    }

    #[test]
    fn missing_config_file_fails() {
        let code = cli::run(Cli {
            command: Command::Validate {
                config: "/nonexistent/trendscreen.ini".into(),
            },
        });
        assert!(!succeeded(code));
    }
}
