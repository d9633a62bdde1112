// src/engine/stop_time.rs

use std::time::{Duration, Instant};

/// Wall-clock deadline after which no new tests start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopTime(Option<Instant>);

impl StopTime {
    pub fn never() -> Self {
        Self(None)
    }

    pub fn at(deadline: Instant) -> Self {
        Self(Some(deadline))
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    pub fn is_passed(&self) -> bool {
        self.0.is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Time left, or `None` without a stop time.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// A test's own timeout capped by the time left until the stop time.
    pub fn cap(&self, timeout: Option<Duration>) -> Option<Duration> {
        match (timeout, self.remaining()) {
            (Some(t), Some(left)) => Some(t.min(left)),
            (t, left) => t.or(left),
        }
    }
}
