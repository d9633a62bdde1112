// src/dag/load.rs

//! System load readings used by `test_load` throttling.

use std::collections::VecDeque;
use std::fs;

use tracing::debug;

const LOADAVG_PATH: &str = "/proc/loadavg";

/// Where the scheduler reads the current system load from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadSource {
    /// One-minute load average of this machine, rounded up.
    #[default]
    System,
    /// Fixed readings handed out in order; the last one repeats.
    Scripted(VecDeque<usize>),
}

impl LoadSource {
    pub fn scripted(readings: impl IntoIterator<Item = usize>) -> Self {
        LoadSource::Scripted(readings.into_iter().collect())
    }

    pub fn current_load(&mut self) -> usize {
        match self {
            LoadSource::System => system_load(),
            LoadSource::Scripted(readings) if readings.len() > 1 => {
                readings.pop_front().unwrap_or(0)
            }
            LoadSource::Scripted(readings) => readings.front().copied().unwrap_or(0),
        }
    }
}

fn system_load() -> usize {
    match fs::read_to_string(LOADAVG_PATH) {
        Ok(contents) => parse_loadavg(&contents).unwrap_or_else(|| {
            debug!(contents = %contents.trim(), "unreadable load average; treating load as 0");
            0
        }),
        Err(err) => {
            debug!(error = %err, "load average unavailable; treating load as 0");
            0
        }
    }
}

fn parse_loadavg(contents: &str) -> Option<usize> {
    let one_minute: f64 = contents.split_whitespace().next()?.parse().ok()?;
    (one_minute.is_finite() && one_minute >= 0.0).then(|| one_minute.ceil() as usize)
}
