// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and scheduling ticks and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - waiting on the completion channel with a bounded timeout
//! - handing `ScheduledTest`s to the executor
//! - printing progress and writing the checkpoint
//!
//! The core is unit tested without any Tokio, channels or processes.

use crate::dag::{RunSummary, Scheduler};
use crate::engine::event_handlers::{
    CoreStep, handle_launch_failure, handle_not_started, handle_schedule, handle_shutdown,
    handle_test_completion, resolve_leftovers,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::types::TestId;

/// Pure core runtime state.
///
/// Owns the scheduler and the runtime options. It has **no** channels, no
/// Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self { scheduler, options }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Checked on every attempted launch.
    pub fn stop_time_passed(&self) -> bool {
        self.scheduler.stop_time_passed() || self.options.stop_time.is_passed()
    }

    /// Run one admission-control pass.
    pub fn schedule(&mut self) -> CoreStep {
        handle_schedule(&mut self.scheduler, &self.options)
    }

    /// Handle a single runtime event.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TestCompleted {
                id,
                outcome,
                duration,
                output,
            } => handle_test_completion(&mut self.scheduler, id, outcome, duration, output),
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
        }
    }

    pub fn launch_failed(&mut self, id: TestId, reason: String) -> CoreStep {
        handle_launch_failure(&mut self.scheduler, id, reason)
    }

    pub fn launch_skipped(&mut self, id: TestId) -> CoreStep {
        handle_not_started(&mut self.scheduler, id)
    }

    /// Resolve tests that never started; call once the loop is over.
    pub fn finish(&mut self) -> CoreStep {
        resolve_leftovers(&mut self.scheduler)
    }

    /// The run ended with every test terminal and nothing cut it short.
    pub fn completed_normally(&self) -> bool {
        self.scheduler.is_complete()
            && !self.scheduler.stop_time_passed()
            && !self.scheduler.stopped_on_failure()
    }

    pub fn into_summary(self) -> RunSummary {
        self.scheduler.into_summary()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::dag::{LoadSource, NotRunReason, SchedulerOptions, TestProperties, TestStatus};
    use crate::engine::event_handlers::CoreCommand;
    use crate::engine::{StopTime, TestOutcome};

    fn core(n: usize, parallel_level: usize, options: RuntimeOptions) -> CoreRuntime {
        let tests = (0..n)
            .map(|i| TestProperties::new(i, format!("t{i}"), "true"))
            .collect();
        let scheduler = Scheduler::new(
            tests,
            SchedulerOptions {
                parallel_level,
                ..SchedulerOptions::default()
            },
        )
        .unwrap();
        CoreRuntime::new(scheduler, options)
    }

    fn launched(step: &CoreStep) -> Vec<TestId> {
        step.commands
            .iter()
            .flat_map(|c| match c {
                CoreCommand::LaunchTests(tests) => tests.iter().map(|t| t.id).collect(),
                CoreCommand::Report(_) => Vec::new(),
            })
            .collect()
    }

    fn done(id: TestId) -> RuntimeEvent {
        RuntimeEvent::TestCompleted {
            id,
            outcome: TestOutcome::Success,
            duration: Duration::from_millis(5),
            output: String::new(),
        }
    }

    #[test]
    fn runs_to_completion() {
        let mut core = core(3, 2, RuntimeOptions::default());

        let step = core.schedule();
        assert_eq!(launched(&step), vec![0, 1]);
        assert!(step.keep_running);

        let step = core.step(done(1));
        assert!(matches!(&step.commands[..], [CoreCommand::Report(s)] if s.id == 1));
        assert_eq!(launched(&core.schedule()), vec![2]);

        core.step(done(0));
        core.step(done(2));
        let step = core.schedule();
        assert!(step.commands.is_empty());
        assert!(!step.keep_running);
        assert!(core.completed_normally());
    }

    #[test]
    fn shutdown_lets_running_tests_finish() {
        let mut core = core(3, 1, RuntimeOptions::default());
        assert_eq!(launched(&core.schedule()), vec![0]);

        core.step(RuntimeEvent::ShutdownRequested);
        let step = core.schedule();
        assert!(launched(&step).is_empty());
        assert!(step.keep_running, "t0 is still running");

        core.step(done(0));
        assert!(!core.schedule().keep_running);

        let leftovers = core.finish();
        assert_eq!(leftovers.commands.len(), 2);
        assert!(!core.completed_normally());

        let summary = core.into_summary();
        assert_eq!(summary.not_run(), vec!["t1", "t2"]);
        assert!(summary.stop_time_passed);
    }

    #[test]
    fn passed_stop_time_starts_nothing() {
        let options = RuntimeOptions {
            stop_time: StopTime::at(Instant::now()),
            ..RuntimeOptions::default()
        };
        let mut core = core(2, 2, options);
        assert!(core.stop_time_passed());
        let step = core.schedule();
        assert!(step.commands.is_empty());
        assert!(!step.keep_running);

        let leftovers = core.finish();
        for cmd in &leftovers.commands {
            match cmd {
                CoreCommand::Report(s) => assert!(!s.status.is_checkpointed()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn load_throttled_pass_keeps_the_loop_alive() {
        let scheduler = Scheduler::new(
            vec![TestProperties::new(0, "t0", "true")],
            SchedulerOptions {
                parallel_level: 2,
                test_load: Some(2),
                load_source: LoadSource::scripted([5, 0]),
                ..SchedulerOptions::default()
            },
        )
        .unwrap();
        let mut core = CoreRuntime::new(scheduler, RuntimeOptions::default());

        let step = core.schedule();
        assert!(launched(&step).is_empty());
        assert!(step.keep_running);
        assert_eq!(launched(&core.schedule()), vec![0]);
    }

    #[test]
    fn stop_on_failure_leaves_the_rest_not_run() {
        let tests = (0..3)
            .map(|i| TestProperties::new(i, format!("t{i}"), "true"))
            .collect();
        let scheduler = Scheduler::new(
            tests,
            SchedulerOptions {
                stop_on_failure: true,
                ..SchedulerOptions::default()
            },
        )
        .unwrap();
        let mut core = CoreRuntime::new(scheduler, RuntimeOptions::default());

        assert_eq!(launched(&core.schedule()), vec![0]);
        core.step(RuntimeEvent::TestCompleted {
            id: 0,
            outcome: TestOutcome::Failed(2),
            duration: Duration::from_millis(5),
            output: String::new(),
        });
        assert!(!core.schedule().keep_running);

        let leftovers = core.finish();
        for cmd in &leftovers.commands {
            match cmd {
                CoreCommand::Report(s) => {
                    assert_eq!(s.status, TestStatus::NotRun(NotRunReason::StoppedOnFailure));
                    assert!(!s.status.is_checkpointed());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(leftovers.commands.len(), 2);
        assert!(!core.completed_normally());
        assert!(core.into_summary().render().contains("stopped after the first failure"));
    }

    #[test]
    fn launch_failure_is_reported_as_failure() {
        let mut core = core(1, 1, RuntimeOptions::default());
        assert_eq!(launched(&core.schedule()), vec![0]);
        let step = core.launch_failed(0, "spawn failed".into());
        match &step.commands[..] {
            [CoreCommand::Report(s)] => {
                assert!(s.status.is_failure());
                assert!(!matches!(s.status, TestStatus::Failed));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!core.schedule().keep_running);
        assert!(core.completed_normally());
    }
}
