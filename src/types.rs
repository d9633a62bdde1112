// src/types.rs

use std::str::FromStr;
use serde::Deserialize;

/// Ordering strategy used by the bin packer when it assigns resource ids.
///
/// - `RoundRobin`: after every tentative assignment the used id is re-sorted
///   by its remaining free slots, which spreads consumers across ids
///   (default behaviour).
/// - `Block`: the used id is moved to the front so the next consumer lands on
///   the same id while it still has room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingStrategy {
    RoundRobin,
    Block,
}

impl Default for PackingStrategy {
    fn default() -> Self {
        PackingStrategy::RoundRobin
    }
}

impl FromStr for PackingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" => Ok(PackingStrategy::RoundRobin),
            "block" => Ok(PackingStrategy::Block),
            other => Err(format!(
                "invalid packing_strategy: {other} (expected \"round-robin\" or \"block\")"
            )),
        }
    }
}

/// Opaque identity of a test for the duration of one scheduling run.
///
/// Ids are dense and follow declaration order in the suite file, so the same
/// suite yields the same ids across runs (checkpoint files depend on this).
pub type TestId = usize;
