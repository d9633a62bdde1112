// src/dag/scheduler.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::dag::cost::CostBuckets;
use crate::dag::graph::DependencyGraph;
use crate::dag::load::LoadSource;
use crate::dag::results::{NotRunReason, RunSummary, TestResult, TestStatus};
use crate::dag::test_info::{RunState, ScheduledTest, TestProperties, TestRunState};
use crate::engine::TestOutcome;
use crate::errors::{Result, TestschedError};
use crate::history::CostRecord;
use crate::resources::{
    AllocatedResource, BinPackerAllocation, GroupAllocation, ResourceLedger, ResourceSpec,
    allocate_resources,
};
use crate::types::{PackingStrategy, TestId};

/// Knobs fixed for the lifetime of one scheduling run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum sum of processors over running tests.
    pub parallel_level: usize,
    pub packing_strategy: PackingStrategy,
    /// Without a spec, `resource_groups` are ignored.
    pub resource_spec: Option<ResourceSpec>,
    /// Names that failed in the previous run; launched first.
    pub last_failed: Vec<String>,
    /// Start nothing new once a test has failed.
    pub stop_on_failure: bool,
    /// Start tests only while the system load stays below this.
    pub test_load: Option<usize>,
    pub load_source: LoadSource,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            parallel_level: 1,
            packing_strategy: PackingStrategy::default(),
            resource_spec: None,
            last_failed: Vec::new(),
            stop_on_failure: false,
            test_load: None,
            load_source: LoadSource::default(),
        }
    }
}

/// Why a test's resource demand can never be met, per resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAvailabilityError {
    NoResourceType,
    InsufficientResources,
}

/// A test reached a terminal state.
#[derive(Debug, Clone)]
pub struct CompletionStep {
    pub id: TestId,
    pub name: String,
    pub status: TestStatus,
    pub duration: Duration,
    /// Terminal tests so far, including this one.
    pub completed: usize,
    pub total: usize,
    /// Pending tests whose last unmet dependency was this one.
    pub newly_unblocked: Vec<TestId>,
}

/// Output of one admission-control pass.
#[derive(Debug, Clone, Default)]
pub struct StartBatch {
    /// Tests now marked running; the caller must hand them to an executor.
    pub launches: Vec<ScheduledTest>,
    /// Tests resolved without running (e.g. resources that never suffice).
    pub resolved: Vec<CompletionStep>,
    /// The system load held back tests that could otherwise have started.
    pub throttled: bool,
}

impl StartBatch {
    pub fn is_empty(&self) -> bool {
        self.launches.is_empty() && self.resolved.is_empty()
    }
}

/// Admission control over a closed batch of tests.
///
/// Owns the dependency graph, the cost buckets, the resource ledger and all
/// per-run bookkeeping. Every mutation happens on the caller's thread at a
/// well-defined point: a start decision or a confirmed completion.
#[derive(Debug)]
pub struct Scheduler {
    tests: Vec<TestProperties>,
    graph: DependencyGraph,
    parallel_level: usize,
    strategy: PackingStrategy,
    stop_on_failure: bool,
    test_load: Option<usize>,
    load_source: LoadSource,

    ledger: Option<ResourceLedger>,
    availability_errors: Vec<BTreeMap<String, ResourceAvailabilityError>>,
    allocated: HashMap<TestId, Vec<GroupAllocation>>,

    state: Vec<RunState>,
    /// Unfinished dependencies per test.
    unmet: Vec<usize>,
    buckets: CostBuckets,
    /// Sum of processors over running tests; never above `parallel_level`.
    running_count: usize,
    running: BTreeSet<TestId>,
    locked_resource_names: BTreeSet<String>,

    completed: usize,
    stop_time_passed: bool,
    failure_seen: bool,
    results: Vec<TestResult>,
    resumed: Vec<String>,
}

impl Scheduler {
    /// Build a scheduler.
    ///
    /// `tests[i].id` must be `i`. Fails before anything runs if the
    /// dependency graph has a cycle.
    pub fn new(tests: Vec<TestProperties>, options: SchedulerOptions) -> Result<Self> {
        if options.parallel_level == 0 {
            return Err(TestschedError::ConfigError(
                "parallel level must be at least 1".to_string(),
            ));
        }
        for (i, test) in tests.iter().enumerate() {
            if test.id != i {
                return Err(TestschedError::ConfigError(format!(
                    "test '{}' has id {} but is at position {i}",
                    test.name, test.id
                )));
            }
            if let Some(&dep) = test.depends.iter().find(|&&d| d >= tests.len()) {
                return Err(TestschedError::TestNotFound(format!(
                    "dependency #{dep} of test '{}'",
                    test.name
                )));
            }
        }

        let graph = DependencyGraph::new(&tests);
        if let Err(cycle) = graph.check_cycles() {
            let mut names: Vec<&str> = cycle.iter().map(|&id| tests[id].name.as_str()).collect();
            if let Some(&first) = names.first() {
                names.push(first);
            }
            let path = names.join(" -> ");
            error!(cycle = %path, "dependency cycle detected; no tests will run");
            return Err(TestschedError::DependencyCycle(path));
        }

        let last_failed: HashSet<String> = options.last_failed.into_iter().collect();
        let buckets = CostBuckets::build(&tests, options.parallel_level, &last_failed);
        let unmet = (0..tests.len())
            .map(|id| graph.dependencies_of(id).len())
            .collect();
        let ledger = options.resource_spec.as_ref().map(ResourceLedger::from_spec);

        let mut scheduler = Self {
            graph,
            parallel_level: options.parallel_level,
            strategy: options.packing_strategy,
            stop_on_failure: options.stop_on_failure,
            test_load: options.test_load,
            load_source: options.load_source,
            ledger,
            availability_errors: vec![BTreeMap::new(); tests.len()],
            allocated: HashMap::new(),
            state: vec![RunState::Pending; tests.len()],
            unmet,
            buckets,
            running_count: 0,
            running: BTreeSet::new(),
            locked_resource_names: BTreeSet::new(),
            completed: 0,
            stop_time_passed: false,
            failure_seen: false,
            results: Vec::new(),
            resumed: Vec::new(),
            tests,
        };
        scheduler.check_resource_availability();

        debug!(
            tests = scheduler.tests.len(),
            parallel_level = scheduler.parallel_level,
            strategy = ?scheduler.strategy,
            stop_on_failure = scheduler.stop_on_failure,
            test_load = ?scheduler.test_load,
            "scheduler initialised"
        );

        Ok(scheduler)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn tests(&self) -> &[TestProperties] {
        &self.tests
    }

    pub fn test(&self, id: TestId) -> Option<&TestProperties> {
        self.tests.get(id)
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.tests.len()
    }

    pub fn parallel_level(&self) -> usize {
        self.parallel_level
    }

    pub fn running_count(&self) -> usize {
        self.running_count
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn running(&self) -> impl Iterator<Item = TestId> + '_ {
        self.running.iter().copied()
    }

    pub fn locked_resource_names(&self) -> &BTreeSet<String> {
        &self.locked_resource_names
    }

    pub fn ledger(&self) -> Option<&ResourceLedger> {
        self.ledger.as_ref()
    }

    pub fn availability_errors(&self, id: TestId) -> Option<&BTreeMap<String, ResourceAvailabilityError>> {
        self.availability_errors.get(id)
    }

    pub fn state_of(&self, id: TestId) -> Option<TestRunState> {
        let state = *self.state.get(id)?;
        Some(match state {
            RunState::Pending if self.unmet[id] == 0 => TestRunState::Runnable,
            RunState::Pending => TestRunState::Pending,
            RunState::Running => TestRunState::Running,
            RunState::Finished => TestRunState::Finished,
        })
    }

    pub fn stop_time_passed(&self) -> bool {
        self.stop_time_passed
    }

    /// Stop starting new tests. Running tests are left to finish.
    pub fn set_stop_time_passed(&mut self) {
        if !self.stop_time_passed {
            error!("the stop time has been passed; no further tests will be started");
            self.stop_time_passed = true;
        }
    }

    /// A test failed and `stop_on_failure` is set.
    pub fn stopped_on_failure(&self) -> bool {
        self.stop_on_failure && self.failure_seen
    }

    /// Processors a test occupies while running.
    ///
    /// A serial test, or one asking for more than the parallel level,
    /// occupies the whole budget.
    pub fn processors_used(&self, id: TestId) -> usize {
        let test = &self.tests[id];
        if test.run_serial || test.processors > self.parallel_level {
            self.parallel_level
        } else {
            test.processors.max(1)
        }
    }

    // ---------------------------------------------------------------------
    // Admission control
    // ---------------------------------------------------------------------

    /// Decide which tests start now.
    pub fn start_next_tests(&mut self) -> StartBatch {
        let mut batch = StartBatch::default();
        if self.stop_time_passed || self.stopped_on_failure() || self.buckets.is_empty() {
            return batch;
        }

        let mut budget = self.parallel_level.saturating_sub(self.running_count);
        if budget == 0 {
            return batch;
        }

        // Processors that may still start before the load limit is reached.
        let mut load_budget = self.test_load.map(|limit| {
            let load = self.load_source.current_load();
            let spare = limit.saturating_sub(load);
            debug!(load, limit, spare, "system load checked");
            spare
        });
        if load_budget == Some(0) {
            debug!(
                running = self.running_count,
                "system load at the limit; waiting before starting more tests"
            );
            batch.throttled = true;
            return batch;
        }

        for id in self.buckets.in_launch_order() {
            if self.state[id] != RunState::Pending {
                continue;
            }
            let cost = self.processors_used(id);
            if let (Some(spare), Some(limit)) = (load_budget, self.test_load) {
                // Tests bigger than the limit itself wait for a fully idle load.
                if cost.min(limit) > spare {
                    debug!(
                        test = %self.tests[id].name,
                        processors = cost,
                        spare_load = spare,
                        "test does not fit the spare load; skipping"
                    );
                    batch.throttled = true;
                    continue;
                }
            }
            if cost > budget {
                debug!(
                    test = %self.tests[id].name,
                    processors = cost,
                    budget,
                    "next test does not fit the remaining budget; stopping scan"
                );
                break;
            }

            let running_before = self.running_count;
            self.start_test(id, &mut budget, &mut batch);
            if let Some(spare) = load_budget.as_mut() {
                *spare = spare.saturating_sub(self.running_count.saturating_sub(running_before));
            }
            if budget == 0 || load_budget == Some(0) || self.stopped_on_failure() {
                break;
            }
        }

        batch
    }

    fn start_test(&mut self, id: TestId, budget: &mut usize, batch: &mut StartBatch) {
        let name = &self.tests[id].name;

        if let Some(busy) = self.tests[id]
            .locked_resources
            .iter()
            .find(|r| self.locked_resource_names.contains(*r))
        {
            debug!(test = %name, id, resource = %busy, "resource lock busy");
            return;
        }

        if self.unmet[id] > 0 {
            debug!(test = %name, id, unmet = self.unmet[id], "waiting on dependencies");
            let pending_deps: Vec<TestId> = self
                .graph
                .dependencies_of(id)
                .iter()
                .copied()
                .filter(|&d| self.state[d] == RunState::Pending)
                .collect();
            for dep in pending_deps {
                if self.state[dep] == RunState::Pending && self.processors_used(dep) <= *budget {
                    self.start_test(dep, budget, batch);
                }
            }
            return;
        }

        if !self.availability_errors[id].is_empty() {
            let message = self.insufficient_resources_message(id);
            warn!(test = %self.tests[id].name, id, "{}", message.trim_end());
            let step = self.finish(
                id,
                TestStatus::NotRun(NotRunReason::InsufficientResources(message)),
                None,
                Duration::ZERO,
                String::new(),
            );
            batch.resolved.push(step);
            return;
        }

        let Some(allocation) = self.allocate_resources(id) else {
            debug!(
                test = %self.tests[id].name,
                id,
                "resource demand cannot be packed right now"
            );
            return;
        };

        let cost = self.processors_used(id);
        let test = &self.tests[id];
        self.state[id] = RunState::Running;
        self.running.insert(id);
        self.running_count += cost;
        self.locked_resource_names
            .extend(test.locked_resources.iter().cloned());
        self.buckets.remove(id);
        *budget = budget.saturating_sub(cost);

        info!(
            test = %test.name,
            id,
            processors = cost,
            running = self.running_count,
            "starting test"
        );

        batch.launches.push(ScheduledTest {
            id,
            name: test.name.clone(),
            cmd: test.cmd.clone(),
            working_directory: test.working_directory.clone(),
            processors: cost,
            allocated_resources: allocation.clone(),
            timeout: test.timeout,
        });
        if !allocation.is_empty() {
            self.allocated.insert(id, allocation);
        }
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    /// Packing requests per resource type for one test.
    fn packing_requests(&self, id: TestId) -> BTreeMap<String, Vec<BinPackerAllocation>> {
        let mut requests: BTreeMap<String, Vec<BinPackerAllocation>> = BTreeMap::new();
        for (process_index, group) in self.tests[id].resource_groups.iter().enumerate() {
            for req in group {
                let entry = requests.entry(req.resource_type.clone()).or_default();
                for _ in 0..req.units_needed {
                    entry.push(BinPackerAllocation::new(process_index, req.slots_needed));
                }
            }
        }
        requests
    }

    /// Bin-pack every test against the empty system once, so demands that
    /// can never be met are reported instead of waiting forever.
    fn check_resource_availability(&mut self) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let available = ledger.resources();

        for id in 0..self.tests.len() {
            let mut errors = BTreeMap::new();
            for (resource_type, mut requests) in self.packing_requests(id) {
                match available.get(&resource_type) {
                    None => {
                        errors.insert(resource_type, ResourceAvailabilityError::NoResourceType);
                    }
                    Some(ids) => {
                        if !allocate_resources(self.strategy, ids, &mut requests) {
                            errors.insert(
                                resource_type,
                                ResourceAvailabilityError::InsufficientResources,
                            );
                        }
                    }
                }
            }
            if !errors.is_empty() {
                debug!(test = %self.tests[id].name, ?errors, "resource demand can never be met");
            }
            self.availability_errors[id] = errors;
        }
    }

    /// Pack the test's demand against the current ledger and commit it.
    ///
    /// `None` means "not now". Nothing is left locked on failure.
    fn allocate_resources(&mut self, id: TestId) -> Option<Vec<GroupAllocation>> {
        let groups = self.tests[id].resource_groups.len();
        if self.ledger.is_none() || groups == 0 {
            return Some(Vec::new());
        }
        let mut requests = self.packing_requests(id);
        let ledger = self.ledger.as_mut()?;

        for (resource_type, allocations) in requests.iter_mut() {
            let ids = ledger.resources().get(resource_type)?;
            if !allocate_resources(self.strategy, ids, allocations) {
                return None;
            }
        }

        let mut granted: Vec<GroupAllocation> = vec![GroupAllocation::new(); groups];
        for (resource_type, allocations) in &requests {
            for alloc in allocations {
                let Some(rid) = alloc.id.as_deref() else {
                    continue;
                };
                if !ledger.allocate_resource(resource_type, rid, alloc.slots_needed) {
                    warn!(
                        test = %self.tests[id].name,
                        resource_type = %resource_type,
                        id = %rid,
                        "ledger rejected a packed allocation; rolling back"
                    );
                    release(ledger, &granted);
                    return None;
                }
                granted[alloc.process_index]
                    .entry(resource_type.clone())
                    .or_default()
                    .push(AllocatedResource {
                        id: rid.to_string(),
                        slots: alloc.slots_needed,
                    });
            }
        }

        Some(granted)
    }

    fn deallocate_resources(&mut self, id: TestId) {
        let Some(granted) = self.allocated.remove(&id) else {
            return;
        };
        if let Some(ledger) = self.ledger.as_mut() {
            release(ledger, &granted);
        }
    }

    /// Every declared slot is free again.
    pub fn all_resources_available(&self) -> bool {
        self.ledger
            .as_ref()
            .is_none_or(ResourceLedger::all_resources_available)
    }

    fn insufficient_resources_message(&self, id: TestId) -> String {
        let test = &self.tests[id];
        let mut msg = format!("Insufficient resources for test {}:\n", test.name);
        for (resource_type, err) in &self.availability_errors[id] {
            match err {
                ResourceAvailabilityError::NoResourceType => {
                    let _ = writeln!(
                        msg,
                        "  Test requested resources of type '{resource_type}' which does not exist"
                    );
                }
                ResourceAvailabilityError::InsufficientResources => {
                    let _ = writeln!(
                        msg,
                        "  Test requested resources of type '{resource_type}' in the following amounts:"
                    );
                    for req in test.resource_groups.iter().flatten() {
                        if &req.resource_type == resource_type {
                            let _ = writeln!(msg, "    {} {}", req.slots_needed, plural_slots(req.slots_needed));
                        }
                    }
                    let _ = writeln!(msg, "  but only the following units were available:");
                    let ids = self
                        .ledger
                        .as_ref()
                        .and_then(|l| l.resources().get(resource_type));
                    for (rid, res) in ids.into_iter().flatten() {
                        let _ = writeln!(msg, "    '{rid}': {} {}", res.total, plural_slots(res.total));
                    }
                }
            }
        }
        msg
    }

    // ---------------------------------------------------------------------
    // Completion
    // ---------------------------------------------------------------------

    /// A running test's process terminated.
    ///
    /// Returns `None` if the test was not running.
    pub fn handle_completion(
        &mut self,
        id: TestId,
        outcome: TestOutcome,
        duration: Duration,
        output: String,
    ) -> Option<CompletionStep> {
        if self.state.get(id) != Some(&RunState::Running) {
            warn!(id, "completion for a test that is not running; ignoring");
            return None;
        }

        self.release(id);
        self.tests[id].record_run(duration);

        let status = if outcome.is_success() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        info!(
            test = %self.tests[id].name,
            id,
            ?outcome,
            secs = duration.as_secs_f64(),
            "test finished"
        );
        Some(self.finish(id, status, Some(outcome), duration, output))
    }

    /// The executor could not start a test this scheduler marked running.
    pub fn handle_launch_failure(&mut self, id: TestId, reason: String) -> Option<CompletionStep> {
        if self.state.get(id) != Some(&RunState::Running) {
            return None;
        }
        self.release(id);
        error!(test = %self.tests[id].name, id, error = %reason, "failed to start test");
        Some(self.finish(
            id,
            TestStatus::NotRun(NotRunReason::LaunchFailed(reason)),
            None,
            Duration::ZERO,
            String::new(),
        ))
    }

    /// A launch was abandoned because the stop time passed first.
    pub fn handle_not_started(&mut self, id: TestId) -> Option<CompletionStep> {
        if self.state.get(id) != Some(&RunState::Running) {
            return None;
        }
        self.release(id);
        self.set_stop_time_passed();
        Some(self.finish(
            id,
            TestStatus::NotRun(NotRunReason::StopTimePassed),
            None,
            Duration::ZERO,
            String::new(),
        ))
    }

    /// Mark a test finished without running it (resume from checkpoint).
    pub fn force_complete(&mut self, id: TestId) -> bool {
        if self.state.get(id) != Some(&RunState::Pending) {
            return false;
        }
        self.state[id] = RunState::Finished;
        self.buckets.remove(id);
        self.completed += 1;
        self.unblock_dependents(id);
        self.resumed.push(self.tests[id].name.clone());
        debug!(test = %self.tests[id].name, id, "resumed from checkpoint");
        true
    }

    /// Resolve every test that never started. Running tests are untouched.
    pub fn resolve_remaining(&mut self, reason: NotRunReason) -> Vec<CompletionStep> {
        let pending: Vec<TestId> = (0..self.tests.len())
            .filter(|&id| self.state[id] == RunState::Pending)
            .collect();
        pending
            .into_iter()
            .map(|id| {
                self.finish(
                    id,
                    TestStatus::NotRun(reason.clone()),
                    None,
                    Duration::ZERO,
                    String::new(),
                )
            })
            .collect()
    }

    fn release(&mut self, id: TestId) {
        let cost = self.processors_used(id);
        self.running.remove(&id);
        self.running_count = self.running_count.saturating_sub(cost);
        for name in &self.tests[id].locked_resources {
            self.locked_resource_names.remove(name);
        }
        self.deallocate_resources(id);
    }

    fn finish(
        &mut self,
        id: TestId,
        status: TestStatus,
        outcome: Option<TestOutcome>,
        duration: Duration,
        output: String,
    ) -> CompletionStep {
        self.state[id] = RunState::Finished;
        self.buckets.remove(id);
        self.completed += 1;
        if status.is_failure() && !self.failure_seen {
            self.failure_seen = true;
            if self.stop_on_failure {
                warn!(test = %self.tests[id].name, id, "test failed; no further tests will be started");
            }
        }
        let newly_unblocked = self.unblock_dependents(id);

        let name = self.tests[id].name.clone();
        self.results.push(TestResult {
            id,
            name: name.clone(),
            status: status.clone(),
            outcome,
            duration,
            output,
        });

        CompletionStep {
            id,
            name,
            status,
            duration,
            completed: self.completed,
            total: self.tests.len(),
            newly_unblocked,
        }
    }

    fn unblock_dependents(&mut self, id: TestId) -> Vec<TestId> {
        let mut unblocked = Vec::new();
        for &dependent in self.graph.dependents_of(id) {
            if self.unmet[dependent] > 0 {
                self.unmet[dependent] -= 1;
                if self.unmet[dependent] == 0 && self.state[dependent] == RunState::Pending {
                    unblocked.push(dependent);
                }
            }
        }
        unblocked
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    /// Dry-run listing of the suite in declaration order.
    pub fn format_test_list(&self) -> String {
        let mut out = String::new();
        let width = self.tests.len().to_string().len();
        for test in &self.tests {
            let _ = writeln!(out, "  Test #{:>width$}: {}", test.id + 1, test.name);
        }
        let _ = writeln!(out, "\nTotal Tests: {}", self.tests.len());
        out
    }

    pub fn into_summary(self) -> RunSummary {
        if !self.all_resources_available() {
            warn!("resource ledger still holds allocations at the end of the run");
        }
        let costs = self
            .tests
            .iter()
            .map(|t| CostRecord {
                name: t.name.clone(),
                previous_runs: t.previous_runs,
                cost: t.cost,
            })
            .collect();
        let stopped_on_failure = self.stopped_on_failure();
        RunSummary {
            results: self.results,
            resumed: self.resumed,
            total: self.tests.len(),
            stop_time_passed: self.stop_time_passed,
            stopped_on_failure,
            costs,
        }
    }
}

fn release(ledger: &mut ResourceLedger, granted: &[GroupAllocation]) {
    for group in granted {
        for (resource_type, ids) in group {
            for res in ids {
                if !ledger.deallocate_resource(resource_type, &res.id, res.slots) {
                    warn!(
                        resource_type = %resource_type,
                        id = %res.id,
                        slots = res.slots,
                        "ledger rejected a deallocation"
                    );
                }
            }
        }
    }
}

fn plural_slots(n: u32) -> &'static str {
    if n == 1 { "slot" } else { "slots" }
}
