// src/logging.rs

//! Logging setup for `testsched` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TESTSCHED_LOG` environment variable (a level such as "debug", or any
//!    `EnvFilter` directive such as "testsched::dag=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the test list,
//! progress lines and the summary.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TESTSCHED_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = resolve_filter(cli_level, env_value.as_deref());

    // Send logs to stderr; keep stdout free for test results.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn resolve_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env_value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(normalize(s)).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn normalize(s: &str) -> String {
    match s.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        _ => s.to_string(),
    }
}
