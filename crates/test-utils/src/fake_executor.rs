use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use testsched::dag::ScheduledTest;
use testsched::engine::{RuntimeEvent, TestOutcome};
use testsched::errors::{Result, TestschedError};
use testsched::exec::ExecutorBackend;
use testsched::resources::GroupAllocation;

/// Something the fake executor observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    Started {
        name: String,
        processors: usize,
        resources: Vec<GroupAllocation>,
    },
    Finished {
        name: String,
    },
}

/// Shared record of what the fake executor did.
#[derive(Debug, Default)]
pub struct ExecLog {
    pub events: Vec<ExecEvent>,
    pub running_processors: usize,
    pub max_running_processors: usize,
}

impl ExecLog {
    /// Names in start order.
    pub fn started(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecEvent::Started { name, .. } => Some(name.clone()),
                ExecEvent::Finished { .. } => None,
            })
            .collect()
    }

    pub fn position(&self, event: &ExecEvent) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    pub fn start_index(&self, name: &str) -> Option<usize> {
        self.events
            .iter()
            .position(|e| matches!(e, ExecEvent::Started { name: n, .. } if n == name))
    }

    pub fn finish_index(&self, name: &str) -> Option<usize> {
        self.position(&ExecEvent::Finished {
            name: name.to_string(),
        })
    }

    pub fn resources_of(&self, name: &str) -> Option<Vec<GroupAllocation>> {
        self.events.iter().find_map(|e| match e {
            ExecEvent::Started {
                name: n, resources, ..
            } if n == name => Some(resources.clone()),
            _ => None,
        })
    }
}

/// Scripted behaviour for one test.
#[derive(Debug, Clone, Copy)]
struct Script {
    outcome: TestOutcome,
    delay: Duration,
}

/// A fake executor that:
/// - records starts and finishes in a shared `ExecLog`
/// - tracks how many processors are in use at once
/// - reports a scripted `TestCompleted` for each started test after a delay.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<ExecLog>>,
    scripts: HashMap<String, Script>,
    default_delay: Duration,
    launch_failures: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            log: Arc::new(Mutex::new(ExecLog::default())),
            scripts: HashMap::new(),
            default_delay: Duration::from_millis(5),
            launch_failures: HashSet::new(),
        }
    }

    /// Handle to inspect the log after (or during) a run.
    pub fn log(&self) -> Arc<Mutex<ExecLog>> {
        Arc::clone(&self.log)
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn script(mut self, name: &str, outcome: TestOutcome, delay: Duration) -> Self {
        self.scripts
            .insert(name.to_string(), Script { outcome, delay });
        self
    }

    pub fn fail(self, name: &str) -> Self {
        let delay = self.default_delay;
        self.script(name, TestOutcome::Failed(1), delay)
    }

    /// `start_test` for `name` returns an error, as a missing executable would.
    pub fn fail_to_launch(mut self, name: &str) -> Self {
        self.launch_failures.insert(name.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn start_test(
        &mut self,
        test: ScheduledTest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let log = Arc::clone(&self.log);
        let script = self.scripts.get(&test.name).copied().unwrap_or(Script {
            outcome: TestOutcome::Success,
            delay: self.default_delay,
        });
        let refuse = self.launch_failures.contains(&test.name);

        Box::pin(async move {
            if refuse {
                return Err(TestschedError::Other(anyhow::anyhow!(
                    "no such executable for '{}'",
                    test.name
                )));
            }

            {
                let mut guard = log.lock().unwrap();
                guard.events.push(ExecEvent::Started {
                    name: test.name.clone(),
                    processors: test.processors,
                    resources: test.allocated_resources.clone(),
                });
                guard.running_processors += test.processors;
                guard.max_running_processors =
                    guard.max_running_processors.max(guard.running_processors);
            }

            tokio::spawn(async move {
                tokio::time::sleep(script.delay).await;
                {
                    let mut guard = log.lock().unwrap();
                    guard.running_processors -= test.processors;
                    guard.events.push(ExecEvent::Finished {
                        name: test.name.clone(),
                    });
                }
                let _ = tx
                    .send(RuntimeEvent::TestCompleted {
                        id: test.id,
                        outcome: script.outcome,
                        duration: script.delay,
                        output: String::new(),
                    })
                    .await;
            });
            Ok(())
        })
    }
}
