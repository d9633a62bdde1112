// src/history/mod.rs

//! State persisted between runs under the suite's state directory.
//!
//! - [`cost_data`] keeps average runtimes and the last failed list.
//! - [`checkpoint`] records finished tests so an interrupted run can resume.
//! - [`file_lock`] guards both against concurrent scheduler processes.

pub mod checkpoint;
pub mod cost_data;
pub mod file_lock;

use std::path::{Path, PathBuf};

pub use checkpoint::Checkpoint;
pub use cost_data::{CostData, CostRecord, update_cost_data};
pub use file_lock::LockedFile;

pub const COST_DATA_FILE: &str = "CostData.txt";
pub const CHECKPOINT_FILE: &str = "Checkpoint.txt";

pub fn cost_data_path(state_dir: &Path) -> PathBuf {
    state_dir.join(COST_DATA_FILE)
}

pub fn checkpoint_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CHECKPOINT_FILE)
}
