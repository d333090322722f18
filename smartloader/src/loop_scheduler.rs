// src/loop_scheduler.rs
//
// Fixed-period pacing for the decision loop.
//
// Guarantees a minimum spacing of `period` between successive decision
// points. There is no upper bound: a slow observation or actuator round
// trip stretches the interval, and the measured interval is returned so
// callers can account for real elapsed time.

use std::thread;
use std::time::{Duration, Instant};

/// Time still to wait before the next decision, given the previous decision point.
#[inline]
pub fn remaining(last_decision: Instant, now: Instant, period: Duration) -> Duration {
    period.saturating_sub(now.saturating_duration_since(last_decision))
}

/// Sleep until at least `period` has passed since `last_decision`.
///
/// Returns the new decision instant and the elapsed interval.
pub fn pace_since(last_decision: Instant, period: Duration) -> (Instant, Duration) {
    let wait = remaining(last_decision, Instant::now(), period);
    if !wait.is_zero() {
        thread::sleep(wait);
    }
    let now = Instant::now();
    (now, now.saturating_duration_since(last_decision))
}

#[derive(Debug, Clone)]
pub struct StepScheduler {
    period: Duration,
    last_decision: Instant,
    intervals: Vec<Duration>,
}

impl StepScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_decision: Instant::now(),
            intervals: Vec::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_decision(&self) -> Instant {
        self.last_decision
    }

    /// Start measuring from now, dropping recorded intervals.
    pub fn restart(&mut self) {
        self.last_decision = Instant::now();
        self.intervals.clear();
    }

    /// Block until the period has elapsed since the previous decision point,
    /// then mark a new decision point. Returns the measured interval.
    pub fn pace(&mut self) -> Duration {
        let (now, elapsed) = pace_since(self.last_decision, self.period);
        self.last_decision = now;
        self.intervals.push(elapsed);
        elapsed
    }

    /// Every interval measured since the last `restart`.
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }
}
