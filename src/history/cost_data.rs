// src/history/cost_data.rs

//! Persisted per-test cost history.
//!
//! ```text
//! <name> <previous_runs> <average_cost>
//! ...
//! ---
//! <name of a test that failed last run>
//! ...
//! ```
//!
//! A cost line with fewer than three fields ends the cost section; whatever
//! came after it is ignored and gets rewritten on the next update.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::dag::TestProperties;
use crate::errors::Result;
use crate::history::file_lock::LockedFile;

const SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub name: String,
    pub previous_runs: u32,
    /// Average runtime in seconds.
    pub cost: f64,
}

impl CostRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let runs = parts.next()?;
        let cost = parts.next()?;
        Some(Self {
            name: name.to_string(),
            previous_runs: runs.parse().unwrap_or(0),
            cost: cost.parse().unwrap_or(0.0),
        })
    }

    fn line(&self) -> String {
        format!("{} {} {}", self.name, self.previous_runs, self.cost)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostData {
    pub records: Vec<CostRecord>,
    pub last_failed: Vec<String>,
}

impl CostData {
    pub fn parse(text: &str) -> Self {
        let mut data = CostData::default();
        let mut lines = text.lines();

        for line in lines.by_ref() {
            if line == SEPARATOR {
                break;
            }
            match CostRecord::parse(line) {
                Some(record) => data.records.push(record),
                None => {
                    debug!(line, "malformed cost line; ignoring the rest of the file");
                    return data;
                }
            }
        }

        data.last_failed = lines
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        data
    }

    /// Read the file at `path`; a missing file is empty history.
    pub fn read(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Seed tests from history.
    ///
    /// Run counts always carry over. Costs only matter when running in
    /// parallel, and never override a cost declared in the suite.
    pub fn apply_to(&self, tests: &mut [TestProperties], parallel_level: usize) {
        let by_name: HashMap<&str, &CostRecord> =
            self.records.iter().map(|r| (r.name.as_str(), r)).collect();
        for test in tests {
            let Some(record) = by_name.get(test.name.as_str()) else {
                continue;
            };
            test.previous_runs = record.previous_runs;
            if parallel_level > 1 && test.cost == 0.0 {
                test.cost = record.cost;
            }
        }
    }
}

/// Rewrite the cost file with `records` and the latest failed list.
///
/// Entries for tests outside the current suite are kept. The new contents
/// go to a temporary file that replaces the old one.
pub fn update_cost_data(
    path: &Path,
    records: &[CostRecord],
    failed: &[&str],
    lock_timeout: Duration,
) -> Result<()> {
    let _lock = LockedFile::acquire(path, lock_timeout)?;

    let previous = CostData::read(path)?;
    let mut current: HashMap<&str, &CostRecord> =
        records.iter().map(|r| (r.name.as_str(), r)).collect();

    let mut out = String::new();
    for old in &previous.records {
        match current.remove(old.name.as_str()) {
            Some(new) => out.push_str(&new.line()),
            None => out.push_str(&old.line()),
        }
        out.push('\n');
    }
    for record in records {
        if current.contains_key(record.name.as_str()) {
            out.push_str(&record.line());
            out.push('\n');
        }
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    for name in failed {
        out.push_str(name);
        out.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path(path);
    let mut f = fs::File::create(&tmp_path)?;
    f.write_all(out.as_bytes())?;
    drop(f);
    if let Err(e) = fs::rename(&tmp_path, path) {
        warn!(path = ?path, error = %e, "could not replace cost data file");
        return Err(e.into());
    }

    debug!(path = ?path, tests = records.len(), failed = failed.len(), "cost data updated");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
