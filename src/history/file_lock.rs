// src/history/file_lock.rs

//! Advisory exclusive lock shared between scheduler processes.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::{Result, TestschedError};

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive lock on `<path>.lock`, released on drop.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Lock the sidecar of `guarded`, retrying until `timeout`.
    ///
    /// Giving up is a hard error, not a silent skip.
    pub fn acquire(guarded: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path(guarded);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!(path = ?path, "acquired state file lock");
                    return Ok(Self { file, path });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(TestschedError::LockTimeout { path, timeout });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path(guarded: &Path) -> PathBuf {
    let mut name = guarded.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
