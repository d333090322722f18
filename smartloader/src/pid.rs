// src/pid.rs
//
// Single-input single-output PID controller used by the low-level
// implement controller (lift + pitch hold).
//
// Rate limited: calls that arrive faster than `sample_time` return the
// previous output untouched, so the derivative term never divides by a
// near-zero interval.

use std::time::{Duration, Instant};

/// Default integral windup guard, in units of error * seconds.
pub const DEFAULT_WINDUP_GUARD: f64 = 20.0;

/// Output range applied when saturation is enabled.
pub const SATURATION_RANGE: (f64, f64) = (-1.0, 1.0);

#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    set_point: f64,
    sample_time: Duration,
    windup_guard: f64,
    saturation: bool,

    p_term: f64,
    i_term: f64,
    d_term: f64,
    last_error: f64,
    last_time: Instant,
    output: f64,
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64, saturation: bool) -> Self {
        Self::new_at(kp, ki, kd, saturation, Instant::now())
    }

    /// Construct with an explicit start time (deterministic tests).
    pub fn new_at(kp: f64, ki: f64, kd: f64, saturation: bool, now: Instant) -> Self {
        Self {
            kp,
            ki,
            kd,
            set_point: 0.0,
            sample_time: Duration::ZERO,
            windup_guard: DEFAULT_WINDUP_GUARD,
            saturation,
            p_term: 0.0,
            i_term: 0.0,
            d_term: 0.0,
            last_error: 0.0,
            last_time: now,
            output: 0.0,
        }
    }

    pub fn with_set_point(mut self, set_point: f64) -> Self {
        self.set_point = set_point;
        self
    }

    pub fn with_sample_time(mut self, sample_time: Duration) -> Self {
        self.sample_time = sample_time;
        self
    }

    pub fn with_windup_guard(mut self, guard: f64) -> Self {
        self.windup_guard = guard.abs();
        self
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn integral(&self) -> f64 {
        self.i_term
    }

    /// Clear accumulated state. Gains and set-point are kept.
    pub fn clear(&mut self, now: Instant) {
        self.p_term = 0.0;
        self.i_term = 0.0;
        self.d_term = 0.0;
        self.last_error = 0.0;
        self.last_time = now;
        self.output = 0.0;
    }

    pub fn update(&mut self, measurement: f64) -> f64 {
        self.update_at(measurement, Instant::now())
    }

    pub fn update_at(&mut self, measurement: f64, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_time);
        if dt < self.sample_time {
            return self.output;
        }
        let dt_s = dt.as_secs_f64();

        let error = self.set_point - measurement;
        let delta_error = error - self.last_error;

        self.p_term = self.kp * error;
        self.i_term = (self.i_term + error * dt_s).clamp(-self.windup_guard, self.windup_guard);
        self.d_term = if dt_s > 0.0 { delta_error / dt_s } else { 0.0 };

        self.last_time = now;
        self.last_error = error;

        let mut out = self.p_term + self.ki * self.i_term + self.kd * self.d_term;
        if self.saturation {
            out = out.clamp(SATURATION_RANGE.0, SATURATION_RANGE.1);
        }
        self.output = out;
        out
    }
}
