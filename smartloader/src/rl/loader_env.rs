// src/rl/loader_env.rs
//
// Episode controller: the reset/step state machine an agent drives.
//
//   reset()        -> Observation
//   step(decision) -> StepResult { observation, reward, done, info }
//
// reset kills any running scene, clears the world state, asks the simulator
// for a new scene, waits for every observed signal, settles, derives the
// target and the scene boundary, lowers the blade and returns the first
// observation.
//
// step paces to the control period, sends the translated command, waits
// until the observation differs from the previous one, then scores that
// same snapshot. A done step stops the scene; the caller must reset before
// stepping again.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::context::ControlContext;
use crate::error::{EnvError, Result};
use crate::geometry;
use crate::io::{ActuatorSink, SimulatorLifecycle};
use crate::loop_scheduler::StepScheduler;
use crate::world_state::{SignalKey, WorldState};

use super::action_encoding::{ActionTranslator, ActuatorCommand, ControlDecision};
use super::observation::{observation_keys, Observation, ObservationSpace};
use super::task::{EpisodeContext, SceneLayout, TerminationReason};
use super::telemetry::{EpisodeEndRecord, RewardComponents, StepRecord};
use super::EpisodePhase;

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    /// Dense reward plus any terminal bonus earned on this step.
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Diagnostics attached to every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInfo {
    /// 1-based step index within the episode.
    pub step: u64,
    pub total_reward: f64,
    /// Real interval since the previous decision point.
    pub interval: Duration,
    pub decision: ControlDecision,
    pub command: ActuatorCommand,
    pub reward: RewardComponents,
    pub reason: Option<TerminationReason>,
}

impl StepInfo {
    /// Reason label, or "No" while the episode continues.
    pub fn reason_label(&self) -> &'static str {
        self.reason.map(|r| r.as_str()).unwrap_or("No")
    }
}

pub struct LoaderEnv<A: ActuatorSink, S: SimulatorLifecycle> {
    cfg: EnvConfig,
    ctx: ControlContext,
    actuator: A,
    simulator: S,
    translator: ActionTranslator,
    scheduler: StepScheduler,
    rng: ChaCha8Rng,
    keys: Vec<SignalKey>,
    phase: EpisodePhase,
    episode: Option<EpisodeContext>,
    last_obs: Option<Observation>,
    last_generation: u64,
    episodes_started: u64,
}

impl<A: ActuatorSink, S: SimulatorLifecycle> LoaderEnv<A, S> {
    pub fn new(cfg: EnvConfig, ctx: ControlContext, actuator: A, simulator: S) -> Result<Self> {
        cfg.validate()?;
        let rng = match cfg.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            translator: ActionTranslator::new(cfg.action_profile),
            scheduler: StepScheduler::new(cfg.control_period),
            keys: observation_keys(cfg.num_stones),
            cfg,
            ctx,
            actuator,
            simulator,
            rng,
            phase: EpisodePhase::Uninitialized,
            episode: None,
            last_obs: None,
            last_generation: 0,
            episodes_started: 0,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.cfg
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn episode(&self) -> Option<&EpisodeContext> {
        self.episode.as_ref()
    }

    pub fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::for_stones(self.cfg.num_stones)
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Real intervals between decisions since the last reset.
    pub fn time_steps(&self) -> &[Duration] {
        self.scheduler.intervals()
    }

    /// Episodes started so far (the current one included).
    pub fn episodes_started(&self) -> u64 {
        self.episodes_started
    }

    /// Start a new episode and return its first observation.
    pub fn reset(&mut self) -> Result<Observation> {
        if self.phase == EpisodePhase::Running {
            warn!(episode = self.episodes_started, "reset while an episode is running; abandoning it");
        }
        self.phase = EpisodePhase::Uninitialized;
        self.episode = None;
        self.last_obs = None;

        self.simulator.kill_simulation()?;
        self.ctx.store().clear();
        self.simulator.generate_and_run_episode(self.cfg.randomization)?;
        self.episodes_started += 1;

        self.ctx.store().snapshot(&self.keys, self.cfg.deadline)?;
        if !self.cfg.settle.is_zero() {
            debug!(settle_ms = self.cfg.settle.as_millis() as u64, "settling scene");
            thread::sleep(self.cfg.settle);
        }

        let settled = self.ctx.store().snapshot(&self.keys, self.cfg.deadline)?;
        let layout = SceneLayout::from_world(&settled, self.cfg.num_stones)?;
        let params = &self.cfg.params;
        let target = self.cfg.task.target_pose(&layout, params, &mut self.rng);
        let boundary = layout.boundary(&target, params);
        let target_distance = layout
            .stones
            .first()
            .map(|s| geometry::planar_distance(s, &target))
            .unwrap_or(0.0);
        let episode = EpisodeContext::new(
            self.cfg.task,
            params,
            self.cfg.num_stones,
            target,
            boundary,
            target_distance,
        );

        let commands = self.lower_blade()?;

        let world = self.ctx.store().snapshot(&self.keys, self.cfg.deadline)?;
        let obs = self.observe(&world, &episode, 0)?;
        info!(
            episode = self.episodes_started,
            task = self.cfg.task.as_str(),
            target_x = target.x,
            target_y = target.y,
            target_distance,
            step_budget = episode.step_budget,
            blade_commands = commands,
            "episode ready"
        );

        self.last_generation = world.generation();
        self.last_obs = Some(obs.clone());
        self.episode = Some(episode);
        self.scheduler.restart();
        self.phase = EpisodePhase::Ready;
        Ok(obs)
    }

    /// Apply one decision and score the resulting observation.
    pub fn step(&mut self, decision: &ControlDecision) -> Result<StepResult> {
        if !self.phase.accepts_step() {
            return Err(EnvError::ContractViolation {
                op: "step",
                phase: self.phase,
            });
        }

        let interval = self.scheduler.pace();
        let command = self.translator.translate(decision);
        self.actuator.send(&command)?;

        let world = self.wait_for_changed_observation()?;

        let Some(mut episode) = self.episode.take() else {
            return Err(EnvError::ContractViolation {
                op: "step",
                phase: self.phase,
            });
        };
        episode.steps += 1;
        let outcome = match self.cfg.task.evaluate(&world, &mut episode, &self.cfg.params) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.episode = Some(episode);
                return Err(e);
            }
        };
        let reward = outcome.reward + outcome.bonus;
        episode.total_reward += reward;

        let observation = self.observe(&world, &episode, episode.steps)?;
        self.last_generation = world.generation();
        self.last_obs = Some(observation.clone());

        let info = StepInfo {
            step: episode.steps,
            total_reward: episode.total_reward,
            interval,
            decision: *decision,
            command,
            reward: outcome.components,
            reason: outcome.reason,
        };
        self.ctx.telemetry().log(&StepRecord::new(
            self.episodes_started,
            info.step,
            interval.as_secs_f64() * 1e3,
            *decision,
            command,
            outcome.components,
            info.total_reward,
            info.reason,
        ));

        let finished = outcome.reason.map(|reason| self.finish(&episode, reason));
        self.phase = if outcome.done {
            EpisodePhase::Terminated
        } else {
            EpisodePhase::Running
        };
        self.episode = Some(episode);
        if let Some(result) = finished {
            result?;
        }

        Ok(StepResult {
            observation,
            reward,
            done: outcome.done,
            info,
        })
    }

    /// Stop the scene without waiting for an episode to end.
    pub fn close(&mut self) -> Result<()> {
        self.simulator.kill_simulation()?;
        self.ctx.telemetry().flush();
        if self.phase != EpisodePhase::Uninitialized {
            self.phase = EpisodePhase::Terminated;
        }
        Ok(())
    }

    fn finish(&mut self, episode: &EpisodeContext, reason: TerminationReason) -> Result<()> {
        let intervals = self.scheduler.intervals();
        let mean_interval_ms = if intervals.is_empty() {
            0.0
        } else {
            intervals.iter().map(|d| d.as_secs_f64()).sum::<f64>() * 1e3 / intervals.len() as f64
        };
        info!(
            episode = self.episodes_started,
            steps = episode.steps,
            total_reward = episode.total_reward,
            target_distance = episode.initial_target_distance,
            %reason,
            "episode finished"
        );
        self.ctx.telemetry().log(&EpisodeEndRecord::new(
            self.episodes_started,
            self.cfg.task.as_str(),
            episode.steps,
            episode.total_reward,
            reason,
            episode.initial_target_distance,
            mean_interval_ms,
        ));
        self.ctx.telemetry().flush();
        self.simulator.kill_simulation()
    }

    fn observe(&self, world: &WorldState, episode: &EpisodeContext, step: u64) -> Result<Observation> {
        let origin = self.cfg.normalized.then_some(&episode.target);
        Observation::from_world(world, self.cfg.num_stones, origin, step)
    }

    /// Send blade-down until the arm is at or below the target height.
    /// Returns the number of commands sent.
    ///
    /// The deadline bounds the whole descent, not each wait.
    fn lower_blade(&mut self) -> Result<usize> {
        let start = Instant::now();
        let deadline = self.cfg.deadline;
        let remaining = move || deadline.map(|d| d.saturating_sub(start.elapsed()));

        let store = Arc::clone(self.ctx.store());
        let target = self.cfg.blade_target_height;
        let mut sent = 0;
        let mut world = store.snapshot(&[SignalKey::ArmHeight], remaining())?;
        while world.scalar(SignalKey::ArmHeight)? > target {
            if remaining().is_some_and(|r| r.is_zero()) {
                return Err(EnvError::Timeout {
                    what: format!("arm height at or below {target}"),
                    waited: start.elapsed(),
                });
            }
            self.actuator.send(&ActuatorCommand::blade_down())?;
            sent += 1;
            store.wait_for_update(world.generation(), remaining())?;
            world = store.current();
        }
        Ok(sent)
    }

    /// Block until a snapshot whose observation differs from the last one.
    fn wait_for_changed_observation(&mut self) -> Result<WorldState> {
        let start = Instant::now();
        let store = Arc::clone(self.ctx.store());
        let mut seen = self.last_generation;
        loop {
            let remaining = self.cfg.deadline.map(|d| d.saturating_sub(start.elapsed()));
            seen = store.wait_for_update(seen, remaining)?;

            let remaining = self.cfg.deadline.map(|d| d.saturating_sub(start.elapsed()));
            let world = store.snapshot(&self.keys, remaining)?;
            seen = seen.max(world.generation());

            let (Some(episode), Some(last)) = (self.episode.as_ref(), self.last_obs.as_ref()) else {
                return Ok(world);
            };
            let candidate = self.observe(&world, episode, last.step)?;
            if !candidate.same_values(last) {
                return Ok(world);
            }
        }
    }
}
