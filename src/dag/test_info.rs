// src/dag/test_info.rs

//! Test metadata and per-run state.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::ConfigFile;
use crate::errors::{Result, TestschedError};
use crate::resources::{GroupAllocation, ResourceGroup};
use crate::types::TestId;

/// Per-run state of a test (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started yet; dependencies may still be outstanding.
    Pending,
    /// Handed to the executor; holds its processors and locks.
    Running,
    /// Terminal. Never re-entered within a run.
    Finished,
}

/// Public, read-only view of a test's state.
///
/// Splits `Pending` into "still waiting on dependencies" and "free to start".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestRunState {
    Pending,
    Runnable,
    Running,
    Finished,
}

/// Static properties of a test plus the cost history that drives ordering.
#[derive(Debug, Clone)]
pub struct TestProperties {
    pub id: TestId,
    pub name: String,
    pub cmd: String,
    pub working_directory: Option<PathBuf>,
    /// Historical average runtime in seconds; 0 if never run.
    pub cost: f64,
    pub previous_runs: u32,
    /// Concurrency slots consumed while running.
    pub processors: usize,
    pub run_serial: bool,
    /// Exclusivity tokens held while running.
    pub locked_resources: BTreeSet<String>,
    pub resource_groups: Vec<ResourceGroup>,
    /// Direct dependencies.
    pub depends: Vec<TestId>,
    pub timeout: Option<Duration>,
}

impl TestProperties {
    pub fn new(id: TestId, name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cmd: cmd.into(),
            working_directory: None,
            cost: 0.0,
            previous_runs: 0,
            processors: 1,
            run_serial: false,
            locked_resources: BTreeSet::new(),
            resource_groups: Vec::new(),
            depends: Vec::new(),
            timeout: None,
        }
    }

    /// Build the test list of a validated suite, in declaration order.
    pub fn from_config(cfg: &ConfigFile) -> Result<Vec<Self>> {
        cfg.tests
            .iter()
            .enumerate()
            .map(|(id, tc)| {
                let depends = tc
                    .depends
                    .iter()
                    .map(|dep| {
                        cfg.index_of(dep)
                            .ok_or_else(|| TestschedError::TestNotFound(dep.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;

                let resource_groups = tc.parsed_resource_groups().map_err(|e| {
                    TestschedError::ConfigError(format!("test '{}': {e}", tc.name))
                })?;

                Ok(Self {
                    id,
                    name: tc.name.clone(),
                    cmd: tc.cmd.clone(),
                    working_directory: tc.working_directory.clone(),
                    cost: tc.cost,
                    previous_runs: 0,
                    processors: tc.processors,
                    run_serial: tc.run_serial,
                    locked_resources: tc.resource_lock.iter().cloned().collect(),
                    resource_groups,
                    depends,
                    timeout: tc.timeout(),
                })
            })
            .collect()
    }

    /// Fold one more observed runtime into the running average.
    pub fn record_run(&mut self, elapsed: Duration) {
        let runs = f64::from(self.previous_runs);
        self.cost = (self.cost * runs + elapsed.as_secs_f64()) / (runs + 1.0);
        self.previous_runs += 1;
    }
}

/// Description of a test the scheduler wants the executor to start now.
#[derive(Debug, Clone)]
pub struct ScheduledTest {
    pub id: TestId,
    pub name: String,
    pub cmd: String,
    pub working_directory: Option<PathBuf>,
    pub processors: usize,
    /// One entry per resource group, in group order.
    pub allocated_resources: Vec<GroupAllocation>,
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_run_keeps_a_running_average() {
        let mut t = TestProperties::new(0, "t", "true");
        t.record_run(Duration::from_secs(4));
        assert_eq!((t.cost, t.previous_runs), (4.0, 1));
        t.record_run(Duration::from_secs(2));
        assert_eq!((t.cost, t.previous_runs), (3.0, 2));
    }
}
