// src/exec/backend.rs

//! The seam between the scheduler and whatever actually runs a test.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in [`test_runner`](super::test_runner).
//!
//! - `RealExecutorBackend` spawns each test as a shell command and reports
//!   its outcome as a `RuntimeEvent::TestCompleted`.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tests were started and emits scripted completions.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledTest;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::test_runner::{spawn_test, wait_for_test};

/// Trait abstracting how scheduled tests are executed.
pub trait ExecutorBackend: Send {
    /// Start one test.
    ///
    /// Resolving to `Ok` means the test is running and a `TestCompleted`
    /// event will follow. An `Err` is a launch failure: no event follows and
    /// the scheduler resolves the test as failed to start.
    fn start_test(
        &mut self,
        test: ScheduledTest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs each test as a child process of this scheduler.
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealExecutorBackend {
    /// Create a backend that reports completions on `runtime_tx`.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn start_test(
        &mut self,
        test: ScheduledTest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            // Spawn here so spawn errors surface as launch failures.
            let running = spawn_test(&test)?;
            tokio::spawn(wait_for_test(test, running, tx));
            Ok(())
        })
    }
}
