// src/engine/mod.rs

//! Orchestration engine for testsched.
//!
//! This module ties together:
//! - the admission-control scheduler
//! - the control loop that reacts to:
//!   - test completion events from the executor
//!   - the stop time passing
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::types::TestId;

/// Outcome of a test process as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Success,
    /// Non-zero exit; -1 when the process died from a signal.
    Failed(i32),
    /// Killed after exceeding its timeout.
    TimedOut,
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Success)
    }
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A test process terminated.
    TestCompleted {
        id: TestId,
        outcome: TestOutcome,
        duration: Duration,
        output: String,
    },
    /// Stop launching (e.g. Ctrl-C); running tests finish normally.
    ShutdownRequested,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Upper bound on how long the loop waits for a completion before
    /// re-evaluating what can start.
    pub poll_interval: Duration,
    pub stop_time: StopTime,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stop_time: StopTime::never(),
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod stop_time;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
pub use stop_time::StopTime;
