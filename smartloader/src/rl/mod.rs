// src/rl/mod.rs
//
// Agent-facing side of the control loop.
//
// - action_encoding: decision -> actuator command translation
// - observation:     flat observation vector and its bounds
// - task:            reward/termination rules per task variant
// - loader_env:      reset/step episode controller
// - runner:          drive whole episodes with a decision function
// - telemetry:       reward breakdown and JSONL records

pub mod action_encoding;
pub mod loader_env;
pub mod observation;
pub mod runner;
pub mod task;
pub mod telemetry;

use serde::{Deserialize, Serialize};

/// Episode controller state.
///
/// `Uninitialized|Terminated -> Ready` on reset, `Ready|Running -> Running`
/// on a non-terminal step, `Running -> Terminated` when a step is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodePhase {
    Uninitialized,
    Ready,
    Running,
    Terminated,
}

impl EpisodePhase {
    pub fn accepts_step(&self) -> bool {
        matches!(self, EpisodePhase::Ready | EpisodePhase::Running)
    }
}

pub use action_encoding::{
    ActionProfile, ActionTranslator, ActuatorCommand, ControlDecision, COMMAND_DIM, DECISION_DIM,
};
pub use loader_env::{LoaderEnv, StepInfo, StepResult};
pub use observation::{Observation, ObservationSpace, OBS_VERSION};
pub use runner::{run_episode, DriveForwardPolicy, EpisodeSummary, Policy};
pub use task::{EpisodeContext, Outcome, SceneLayout, TerminationReason};
pub use telemetry::{EpisodeEndRecord, RewardComponents, StepRecord};
