// src/dag/mod.rs

//! Dependency graph and admission control.
//!
//! - [`graph`] holds the immutable dependency graph and cycle detection.
//! - [`cost`] orders tests into launch-priority buckets.
//! - [`load`] reads the system load for `test_load` throttling.
//! - [`scheduler`] decides which tests may start now and tracks them until
//!   they finish.
//! - [`results`] holds per-test results and the run summary.

pub mod cost;
pub mod graph;
pub mod load;
pub mod results;
pub mod scheduler;
pub mod test_info;

pub use cost::{CostBuckets, LaunchPriority};
pub use graph::DependencyGraph;
pub use load::LoadSource;
pub use results::{NotRunReason, RunSummary, TestResult, TestStatus};
pub use scheduler::{
    CompletionStep, ResourceAvailabilityError, Scheduler, SchedulerOptions, StartBatch,
};
pub use test_info::{ScheduledTest, TestProperties, TestRunState};
