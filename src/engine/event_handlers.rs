// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use tracing::{debug, warn};

use crate::dag::{CompletionStep, NotRunReason, ScheduledTest, Scheduler};
use crate::engine::{RuntimeOptions, TestOutcome};
use crate::types::TestId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these tests to the executor. They already count as running.
    LaunchTests(Vec<ScheduledTest>),
    /// A test reached a terminal state: print progress and checkpoint it.
    Report(CompletionStep),
}

/// Decision returned by the core after handling a single input.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn report(steps: impl IntoIterator<Item = CompletionStep>) -> Self {
        Self {
            commands: steps.into_iter().map(CoreCommand::Report).collect(),
            keep_running: true,
        }
    }
}

/// One admission-control pass.
///
/// The loop keeps running while tests are running, or while this pass
/// made progress and tests remain. Otherwise the run is over: complete,
/// stopped, or stalled.
pub fn handle_schedule(scheduler: &mut Scheduler, options: &RuntimeOptions) -> CoreStep {
    if options.stop_time.is_passed() {
        scheduler.set_stop_time_passed();
    }

    let batch = scheduler.start_next_tests();
    let progressed = !batch.is_empty();

    let mut commands: Vec<CoreCommand> =
        batch.resolved.into_iter().map(CoreCommand::Report).collect();
    if !batch.launches.is_empty() {
        commands.push(CoreCommand::LaunchTests(batch.launches));
    }

    // A load-throttled pass retries on the next poll tick.
    let keep_running = scheduler.has_running()
        || ((progressed || batch.throttled) && !scheduler.is_complete());

    CoreStep {
        commands,
        keep_running,
    }
}

/// Handle a test process terminating.
pub fn handle_test_completion(
    scheduler: &mut Scheduler,
    id: TestId,
    outcome: TestOutcome,
    duration: Duration,
    output: String,
) -> CoreStep {
    CoreStep::report(scheduler.handle_completion(id, outcome, duration, output))
}

/// Handle a shutdown request: same semantics as the stop time passing.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    warn!(
        running = scheduler.running_count(),
        "shutdown requested; waiting for running tests to finish"
    );
    scheduler.set_stop_time_passed();
    CoreStep::report(None)
}

/// The executor refused to start a test.
pub fn handle_launch_failure(scheduler: &mut Scheduler, id: TestId, reason: String) -> CoreStep {
    CoreStep::report(scheduler.handle_launch_failure(id, reason))
}

/// The stop time passed between the start decision and the launch.
pub fn handle_not_started(scheduler: &mut Scheduler, id: TestId) -> CoreStep {
    debug!(id, "stop time passed before launch; test not started");
    CoreStep::report(scheduler.handle_not_started(id))
}

/// Resolve whatever never started once the loop is over.
pub fn resolve_leftovers(scheduler: &mut Scheduler) -> CoreStep {
    let reason = if scheduler.stop_time_passed() {
        NotRunReason::StopTimePassed
    } else if scheduler.stopped_on_failure() {
        NotRunReason::StoppedOnFailure
    } else {
        NotRunReason::Stalled
    };
    let steps = scheduler.resolve_remaining(reason.clone());
    if reason == NotRunReason::Stalled && !steps.is_empty() {
        warn!(
            remaining = steps.len(),
            "no test is running and none can start; marking the rest as not run"
        );
    }

    let mut step = CoreStep::report(steps);
    step.keep_running = false;
    step
}
