// src/rl/runner.rs
//
// Whole-episode driver: reset, then step with a policy until done or a
// step cap, and summarise.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::io::{ActuatorSink, SimulatorLifecycle};

use super::action_encoding::ControlDecision;
use super::loader_env::LoaderEnv;
use super::observation::Observation;
use super::task::TerminationReason;

/// Anything that maps an observation to a decision.
pub trait Policy {
    fn decide(&mut self, obs: &Observation) -> ControlDecision;

    fn name(&self) -> &str {
        "policy"
    }
}

impl<F> Policy for F
where
    F: FnMut(&Observation) -> ControlDecision,
{
    fn decide(&mut self, obs: &Observation) -> ControlDecision {
        self(obs)
    }
}

/// Scripted debug policy: full speed straight ahead, implement still.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveForwardPolicy;

impl Policy for DriveForwardPolicy {
    fn decide(&mut self, _obs: &Observation) -> ControlDecision {
        ControlDecision::drive_forward()
    }

    fn name(&self) -> &str {
        "drive-forward"
    }
}

/// Summary of one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub task: String,
    pub steps: u64,
    pub total_reward: f64,
    /// `None` when the step cap stopped the episode first.
    pub reason: Option<TerminationReason>,
    pub target_distance: f64,
    pub mean_interval_ms: f64,
}

/// Run one episode. `max_steps` caps the loop independently of the task's
/// own time limit; hitting it closes the scene. A failed step also closes the
/// scene before its error is returned.
pub fn run_episode<A, S, P>(
    env: &mut LoaderEnv<A, S>,
    policy: &mut P,
    max_steps: Option<u64>,
) -> Result<EpisodeSummary>
where
    A: ActuatorSink,
    S: SimulatorLifecycle,
    P: Policy + ?Sized,
{
    let mut obs = env.reset()?;
    let mut reason = None;
    let mut steps = 0u64;

    while max_steps.map_or(true, |cap| steps < cap) {
        let decision = policy.decide(&obs);
        let result = match env.step(&decision) {
            Ok(result) => result,
            Err(err) => {
                // The scene is still running; stop it before surfacing the step error.
                if let Err(close_err) = env.close() {
                    warn!(error = %close_err, "failed to close scene after step error");
                }
                return Err(err);
            }
        };
        steps = result.info.step;
        obs = result.observation;
        if result.done {
            reason = result.info.reason;
            break;
        }
    }
    if reason.is_none() {
        env.close()?;
    }

    let (total_reward, target_distance) = env
        .episode()
        .map(|e| (e.total_reward, e.initial_target_distance))
        .unwrap_or((0.0, 0.0));
    let intervals = env.time_steps();
    let mean_interval_ms = if intervals.is_empty() {
        0.0
    } else {
        intervals.iter().map(|d| d.as_secs_f64()).sum::<f64>() * 1e3 / intervals.len() as f64
    };

    let summary = EpisodeSummary {
        episode_id: env.episodes_started(),
        task: env.config().task.as_str().to_string(),
        steps,
        total_reward,
        reason,
        target_distance,
        mean_interval_ms,
    };
    info!(
        episode = summary.episode_id,
        policy = policy.name(),
        steps = summary.steps,
        total_reward = summary.total_reward,
        reason = summary.reason.map(|r| r.as_str()).unwrap_or("step cap"),
        "episode summary"
    );
    Ok(summary)
}
