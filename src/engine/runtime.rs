// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::dag::{CompletionStep, RunSummary, ScheduledTest, TestStatus};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::history::Checkpoint;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Drives the scheduler until every test is terminal or the run is stopped,
/// and delegates actual process execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: waiting on the
/// completion channel, dispatching tests to the executor, printing progress
/// and appending to the checkpoint.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    checkpoint: Option<Checkpoint>,
    quiet: bool,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            checkpoint: None,
            quiet: false,
        }
    }

    /// Append every finished test to `checkpoint`.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Suppress progress lines on stdout.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Main control loop.
    ///
    /// - Runs an admission-control pass.
    /// - Waits up to the poll interval for a completion.
    /// - Feeds completions into the core and executes the resulting commands.
    ///
    /// Returns the run summary once nothing is running and nothing more can
    /// start.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(
            tests = self.core.scheduler().total(),
            parallel_level = self.core.scheduler().parallel_level(),
            "testsched runtime started"
        );
        let poll_interval = self.core.options().poll_interval;

        loop {
            let step = self.core.schedule();
            let keep_running = step.keep_running;
            self.execute(step).await?;
            if !keep_running {
                break;
            }

            match timeout(poll_interval, self.event_rx.recv()).await {
                Ok(Some(event)) => {
                    if let RuntimeEvent::TestCompleted { id, outcome, .. } = &event {
                        debug!(id, ?outcome, "runtime received completion");
                    }
                    let step = self.core.step(event);
                    self.execute(step).await?;
                }
                Ok(None) => {
                    error!(
                        running = self.core.scheduler().running_count(),
                        "runtime event channel closed; abandoning running tests"
                    );
                    break;
                }
                // Poll tick: re-check the stop time and what can start.
                Err(_) => {}
            }
        }

        let step = self.core.finish();
        self.execute(step).await?;

        if self.core.completed_normally() {
            if let Some(checkpoint) = &self.checkpoint {
                checkpoint.mark_finished()?;
            }
        }

        info!(
            completed = self.core.scheduler().completed(),
            total = self.core.scheduler().total(),
            "runtime exiting"
        );
        Ok(self.core.into_summary())
    }

    /// Execute the commands of a single core step.
    async fn execute(&mut self, step: CoreStep) -> Result<()> {
        for command in step.commands {
            match command {
                CoreCommand::LaunchTests(tests) => {
                    for test in tests {
                        self.launch(test).await?;
                    }
                }
                CoreCommand::Report(completion) => self.report(&completion)?,
            }
        }
        Ok(())
    }

    async fn launch(&mut self, mut test: ScheduledTest) -> Result<()> {
        let id = test.id;
        if self.core.stop_time_passed() {
            let step = self.core.launch_skipped(id);
            return self.report_all(step);
        }

        test.timeout = self.core.options().stop_time.cap(test.timeout);
        debug!(test = %test.name, id, timeout = ?test.timeout, "dispatching test");

        if let Err(err) = self.executor.start_test(test).await {
            let step = self.core.launch_failed(id, format!("{err:#}"));
            self.report_all(step)?;
        }
        Ok(())
    }

    fn report_all(&mut self, step: CoreStep) -> Result<()> {
        for command in step.commands {
            if let CoreCommand::Report(completion) = command {
                self.report(&completion)?;
            }
        }
        Ok(())
    }

    fn report(&mut self, completion: &CompletionStep) -> Result<()> {
        if !self.quiet {
            println!("{}", format_progress(completion));
        }
        if completion.status.is_checkpointed() {
            if let Some(checkpoint) = &self.checkpoint {
                checkpoint.record(completion.id)?;
            }
        }
        Ok(())
    }
}

/// One progress line, e.g. `2/5 Test #3: gpu_smoke ........   Passed    1.25 sec`.
pub fn format_progress(step: &CompletionStep) -> String {
    let width = step.total.to_string().len();
    let label = format!(
        "{:>width$}/{} Test #{:<width$}: {} ",
        step.completed,
        step.total,
        step.id + 1,
        step.name
    );
    let dots = ".".repeat(40usize.saturating_sub(label.len()).max(3));
    let status = match &step.status {
        TestStatus::Passed => "   Passed".to_string(),
        TestStatus::Failed => "***Failed".to_string(),
        TestStatus::NotRun(reason) => format!("***{}", reason.label()),
    };
    format!(
        "{label}{dots}{status}  {:>7.2} sec",
        step.duration.as_secs_f64()
    )
}
