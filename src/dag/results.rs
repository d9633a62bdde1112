// src/dag/results.rs

//! Per-test results and the end-of-run summary.

use std::fmt;
use std::time::Duration;

use crate::engine::TestOutcome;
use crate::history::CostRecord;
use crate::types::TestId;

/// Why a test reached a terminal state without running to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotRunReason {
    /// The executor could not start the process.
    LaunchFailed(String),
    /// The test's resource demand can never be met by the declared spec.
    InsufficientResources(String),
    /// The stop time passed (or a shutdown was requested) before it started.
    StopTimePassed,
    /// An earlier test failed and the run stops on failure.
    StoppedOnFailure,
    /// Nothing was running and nothing could be started.
    Stalled,
}

impl NotRunReason {
    /// Short label used in progress lines and the summary.
    pub fn label(&self) -> &'static str {
        match self {
            NotRunReason::LaunchFailed(_) => "Failed to start",
            NotRunReason::InsufficientResources(_) => "Insufficient resources",
            NotRunReason::StopTimePassed => "Stop time passed",
            NotRunReason::StoppedOnFailure => "Stopped on failure",
            NotRunReason::Stalled => "Not run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    NotRun(NotRunReason),
}

impl TestStatus {
    /// Whether this test belongs in the failed list.
    ///
    /// Start failures count as failures; tests skipped because of the stop
    /// time (or a stall) are reported separately as not run.
    pub fn is_failure(&self) -> bool {
        match self {
            TestStatus::Passed => false,
            TestStatus::Failed => true,
            TestStatus::NotRun(reason) => matches!(
                reason,
                NotRunReason::LaunchFailed(_) | NotRunReason::InsufficientResources(_)
            ),
        }
    }

    /// Whether a resumed run should skip this test.
    pub fn is_checkpointed(&self) -> bool {
        !matches!(
            self,
            TestStatus::NotRun(
                NotRunReason::StopTimePassed
                    | NotRunReason::StoppedOnFailure
                    | NotRunReason::Stalled
            )
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => f.write_str("Passed"),
            TestStatus::Failed => f.write_str("Failed"),
            TestStatus::NotRun(reason) => f.write_str(reason.label()),
        }
    }
}

/// Detailed record for one test that reached a terminal state.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub id: TestId,
    pub name: String,
    pub status: TestStatus,
    /// Process outcome, if the process actually ran.
    pub outcome: Option<TestOutcome>,
    pub duration: Duration,
    /// Captured stdout and stderr.
    pub output: String,
}

/// Everything a driver needs after a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Terminal results in the order tests reached them.
    pub results: Vec<TestResult>,
    /// Names force-completed from a checkpoint.
    pub resumed: Vec<String>,
    pub total: usize,
    pub stop_time_passed: bool,
    pub stopped_on_failure: bool,
    /// Updated cost history for every test in the suite.
    pub costs: Vec<CostRecord>,
}

impl RunSummary {
    pub fn passed(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, TestStatus::Passed))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(TestStatus::is_failure)
    }

    pub fn not_run(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, TestStatus::NotRun(_)) && !s.is_failure())
    }

    pub fn all_passed(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.status, TestStatus::Passed))
    }

    pub fn result_of(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    fn names_where(&self, pred: impl Fn(&TestStatus) -> bool) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| pred(&r.status))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Human-readable summary, printed at the end of a run.
    pub fn render(&self) -> String {
        let mut failed: Vec<&TestResult> =
            self.results.iter().filter(|r| r.status.is_failure()).collect();
        let mut not_run: Vec<&TestResult> = self
            .results
            .iter()
            .filter(|r| matches!(r.status, TestStatus::NotRun(_)) && !r.status.is_failure())
            .collect();
        failed.sort_by_key(|r| r.id);
        not_run.sort_by_key(|r| r.id);

        let passed = self.passed().len() + self.resumed.len();
        let counted = passed + failed.len();
        let percent = if counted == 0 {
            0
        } else {
            passed * 100 / counted
        };

        let mut out = String::new();
        out.push_str(&format!(
            "\n{percent}% tests passed, {} tests failed out of {}\n",
            failed.len(),
            self.total
        ));
        if !self.resumed.is_empty() {
            out.push_str(&format!(
                "{} tests resumed from checkpoint\n",
                self.resumed.len()
            ));
        }
        if !failed.is_empty() {
            out.push_str("\nThe following tests FAILED:\n");
            for r in failed {
                out.push_str(&format!("\t{:>3} - {} ({})\n", r.id + 1, r.name, r.status));
            }
        }
        if !not_run.is_empty() {
            out.push_str("\nThe following tests did not run:\n");
            for r in not_run {
                out.push_str(&format!("\t{:>3} - {} ({})\n", r.id + 1, r.name, r.status));
            }
        }
        if self.stop_time_passed {
            out.push_str("\nThe stop time was reached before all tests ran.\n");
        }
        if self.stopped_on_failure {
            out.push_str("\nTesting stopped after the first failure.\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: TestId, name: &str, status: TestStatus) -> TestResult {
        TestResult {
            id,
            name: name.to_string(),
            status,
            outcome: None,
            duration: Duration::ZERO,
            output: String::new(),
        }
    }

    #[test]
    fn start_failures_are_failures_but_skips_are_not() {
        let summary = RunSummary {
            results: vec![
                result(0, "a", TestStatus::Passed),
                result(1, "b", TestStatus::Failed),
                result(
                    2,
                    "c",
                    TestStatus::NotRun(NotRunReason::InsufficientResources(String::new())),
                ),
                result(3, "d", TestStatus::NotRun(NotRunReason::StopTimePassed)),
            ],
            total: 4,
            ..RunSummary::default()
        };

        assert_eq!(summary.passed(), vec!["a"]);
        assert_eq!(summary.failed(), vec!["b", "c"]);
        assert_eq!(summary.not_run(), vec!["d"]);
        assert!(!summary.all_passed());

        let text = summary.render();
        assert!(text.contains("33% tests passed, 2 tests failed out of 4"));
        assert!(text.contains("c (Insufficient resources)"));
        assert!(text.contains("d (Stop time passed)"));
    }

    #[test]
    fn skipped_tests_are_not_checkpointed() {
        assert!(TestStatus::Failed.is_checkpointed());
        assert!(TestStatus::NotRun(NotRunReason::LaunchFailed("x".into())).is_checkpointed());
        assert!(!TestStatus::NotRun(NotRunReason::StopTimePassed).is_checkpointed());
        assert!(!TestStatus::NotRun(NotRunReason::Stalled).is_checkpointed());
    }
}
