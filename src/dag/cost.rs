// src/dag/cost.rs

//! Launch-priority buckets.
//!
//! With a parallel level above 1, tests are grouped by historical cost and
//! the most expensive bucket is tried first. Tests that failed last run sit
//! in a dedicated tier above every cost. With a parallel level of 1 the cost
//! is ignored and buckets follow declaration order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::dag::test_info::TestProperties;
use crate::types::TestId;

/// Float cost usable as a map key (total order).
#[derive(Debug, Clone, Copy)]
pub struct CostKey(pub f64);

impl PartialEq for CostKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CostKey {}

impl PartialOrd for CostKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CostKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Priority tier. Later variants sort higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaunchPriority {
    Ranked(CostKey),
    PreviouslyFailed,
}

#[derive(Debug, Clone, Default)]
pub struct CostBuckets {
    buckets: BTreeMap<LaunchPriority, BTreeSet<TestId>>,
    priority_of: HashMap<TestId, LaunchPriority>,
}

impl CostBuckets {
    pub fn build(
        tests: &[TestProperties],
        parallel_level: usize,
        last_failed: &HashSet<String>,
    ) -> Self {
        let n = tests.len();
        let mut out = Self::default();

        for test in tests {
            let priority = if parallel_level > 1 {
                if last_failed.contains(&test.name) {
                    LaunchPriority::PreviouslyFailed
                } else {
                    LaunchPriority::Ranked(CostKey(test.cost))
                }
            } else {
                // Serial: first declared gets the highest key.
                LaunchPriority::Ranked(CostKey((n - test.id) as f64))
            };
            out.insert(test.id, priority);
        }

        out
    }

    fn insert(&mut self, id: TestId, priority: LaunchPriority) {
        self.buckets.entry(priority).or_default().insert(id);
        self.priority_of.insert(id, priority);
    }

    /// Drop a test that has started or reached a terminal state.
    pub fn remove(&mut self, id: TestId) {
        let Some(priority) = self.priority_of.remove(&id) else {
            return;
        };
        if let Some(set) = self.buckets.get_mut(&priority) {
            set.remove(&id);
            if set.is_empty() {
                self.buckets.remove(&priority);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.priority_of.is_empty()
    }

    pub fn len(&self) -> usize {
        self.priority_of.len()
    }

    /// Highest bucket first, ascending id within a bucket.
    pub fn in_launch_order(&self) -> Vec<TestId> {
        self.buckets
            .values()
            .rev()
            .flat_map(|set| set.iter().copied())
            .collect()
    }
}
