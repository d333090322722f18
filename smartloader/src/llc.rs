// src/llc.rs
//
// Low-level implement controller.
//
// Holds the arm at a lift set-point and the blade at a pitch set-point
// with one saturated PID per channel. Each iteration waits for ArmHeight
// and BladeOrien, paces to `period`, reads lift and blade pitch (degrees),
// then emits an implement-only command. It stops once both readings sit on
// their set-points, or after `max_iterations`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::geometry::quat_to_euler_deg;
use crate::io::ActuatorSink;
use crate::loop_scheduler::StepScheduler;
use crate::pid::{Pid, DEFAULT_WINDUP_GUARD};
use crate::rl::action_encoding::ActuatorCommand;
use crate::world_state::{SignalKey, WorldStateStore};

pub const LLC_KEYS: [SignalKey; 2] = [SignalKey::ArmHeight, SignalKey::BladeOrien];

#[derive(Debug, Clone)]
pub struct LlcConfig {
    pub lift_set_point: f64,
    /// Degrees.
    pub pitch_set_point: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Integral clamp for both loops.
    pub windup_guard: f64,
    pub sample_time: Duration,
    pub period: Duration,
    pub max_iterations: usize,
    /// Accept readings within this distance of the set-point. 0 means exact.
    pub tolerance: f64,
    pub deadline: Option<Duration>,
}

impl Default for LlcConfig {
    fn default() -> Self {
        Self {
            lift_set_point: 100.0,
            pitch_set_point: 0.0,
            kp: 0.1,
            ki: 0.0,
            kd: 0.01,
            windup_guard: DEFAULT_WINDUP_GUARD,
            sample_time: Duration::from_millis(10),
            period: Duration::from_millis(50),
            max_iterations: 100,
            tolerance: 0.0,
            deadline: None,
        }
    }
}

/// One controller iteration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LlcSample {
    pub iteration: usize,
    pub lift: f64,
    pub pitch: f64,
    pub lift_output: f64,
    pub pitch_output: f64,
    pub interval_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlcReport {
    pub samples: Vec<LlcSample>,
    pub reached: bool,
}

pub struct BladeHoldController<A: ActuatorSink> {
    cfg: LlcConfig,
    store: Arc<WorldStateStore>,
    actuator: A,
    lift: Pid,
    pitch: Pid,
    scheduler: StepScheduler,
}

impl<A: ActuatorSink> BladeHoldController<A> {
    pub fn new(cfg: LlcConfig, store: Arc<WorldStateStore>, actuator: A) -> Self {
        let pid = |sp: f64| {
            Pid::new(cfg.kp, cfg.ki, cfg.kd, true)
                .with_set_point(sp)
                .with_sample_time(cfg.sample_time)
                .with_windup_guard(cfg.windup_guard)
        };
        let lift = pid(cfg.lift_set_point);
        let pitch = pid(cfg.pitch_set_point);
        let scheduler = StepScheduler::new(cfg.period);
        Self {
            cfg,
            store,
            actuator,
            lift,
            pitch,
            scheduler,
        }
    }

    fn on_set_point(&self, lift: f64, pitch: f64) -> bool {
        (lift - self.lift.set_point()).abs() <= self.cfg.tolerance
            && (pitch - self.pitch.set_point()).abs() <= self.cfg.tolerance
    }

    /// Run one iteration. Returns the sample and whether both set-points
    /// were reached before the command was computed.
    pub fn step(&mut self, iteration: usize) -> Result<(LlcSample, bool)> {
        self.store.snapshot(&LLC_KEYS, self.cfg.deadline)?;
        let interval = self.scheduler.pace();

        let world = self.store.current();
        let lift = world.scalar(SignalKey::ArmHeight)?;
        let (_, pitch, _) = quat_to_euler_deg(&world.orientation(SignalKey::BladeOrien)?);
        let reached = self.on_set_point(lift, pitch);

        let lift_output = self.lift.update(lift);
        let pitch_output = self.pitch.update(pitch);
        self.actuator
            .send(&ActuatorCommand::implement(lift_output, pitch_output))?;

        let sample = LlcSample {
            iteration,
            lift,
            pitch,
            lift_output,
            pitch_output,
            interval_ms: interval.as_secs_f64() * 1e3,
        };
        debug!(iteration, lift, pitch, lift_output, pitch_output, "llc step");
        Ok((sample, reached))
    }

    pub fn run(&mut self) -> Result<LlcReport> {
        self.scheduler.restart();
        let mut samples = Vec::with_capacity(self.cfg.max_iterations);
        let mut reached = false;
        for i in 0..self.cfg.max_iterations {
            let (sample, done) = self.step(i)?;
            samples.push(sample);
            if done {
                reached = true;
                info!(iteration = i, "implement reached set-points");
                break;
            }
        }
        Ok(LlcReport { samples, reached })
    }
}
