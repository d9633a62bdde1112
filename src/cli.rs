// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::PackingStrategy;

/// Command-line arguments for `testsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testsched",
    version,
    about = "Run a test suite in parallel under dependency, lock and resource constraints.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the suite file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Testsched.toml")]
    pub config: PathBuf,

    /// Run up to N processors' worth of tests at once.
    ///
    /// Without a value, the number of available CPUs is used (at least 2).
    /// Overrides `parallel_level` from the suite file.
    #[arg(short = 'j', long, value_name = "N", num_args = 0..=1)]
    pub parallel: Option<Option<usize>>,

    /// JSON resource spec; overrides `resource_spec_file` from the suite file.
    #[arg(long, value_name = "PATH")]
    pub resource_spec_file: Option<PathBuf>,

    /// How resource ids are chosen: `round-robin` or `block`.
    #[arg(long, value_name = "STRATEGY")]
    pub packing_strategy: Option<PackingStrategy>,

    /// Resume an interrupted run, skipping tests it already finished.
    #[arg(long)]
    pub failover: bool,

    /// List the tests without running them.
    #[arg(short = 'N', long)]
    pub show_only: bool,

    /// Start no new tests once any test has failed.
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Start new tests only while the system load stays below N.
    ///
    /// Overrides `test_load` from the suite file.
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub test_load: Option<usize>,

    /// Start no new tests after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub stop_after: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
