// src/history/checkpoint.rs

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::history::file_lock::LockedFile;
use crate::types::TestId;

/// Append-only record of finished tests, one id per line.
///
/// Removed when a run completes normally, so its presence at startup means
/// the previous run was interrupted.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    lock_timeout: Duration,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids to skip on this run.
    ///
    /// With `failover` the ids of an interrupted run are returned; without
    /// it a stale checkpoint is discarded and the run starts fresh.
    pub fn load_for_resume(&self, failover: bool) -> Result<Vec<TestId>> {
        let _lock = LockedFile::acquire(&self.path, self.lock_timeout)?;

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if !failover {
            debug!(path = ?self.path, "discarding stale checkpoint");
            fs::remove_file(&self.path)?;
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse::<TestId>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(line, "ignoring malformed checkpoint entry"),
            }
        }
        info!(path = ?self.path, finished = ids.len(), "resuming from checkpoint");
        Ok(ids)
    }

    /// Append one finished test.
    pub fn record(&self, id: TestId) -> Result<()> {
        let _lock = LockedFile::acquire(&self.path, self.lock_timeout)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{id}")?;
        Ok(())
    }

    /// The run completed; nothing to resume.
    pub fn mark_finished(&self) -> Result<()> {
        let _lock = LockedFile::acquire(&self.path, self.lock_timeout)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
