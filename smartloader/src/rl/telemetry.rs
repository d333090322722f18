// src/rl/telemetry.rs
//
// Per-step reward breakdown and the JSONL records the episode controller
// writes through `crate::telemetry::TelemetrySink`.

use serde::{Deserialize, Serialize};

use super::action_encoding::{ActuatorCommand, ControlDecision};
use super::task::TerminationReason;

/// Telemetry record schema version.
pub const TELEMETRY_SCHEMA_VERSION: u32 = 1;

/// Additive parts of one step's reward.
///
/// `step_reward()` is the dense part; `terminal` is the bonus (or penalty)
/// attached to the step that ended the episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    /// Constant per-step penalty (negative or zero).
    pub step_penalty: f64,
    /// Pick-up: bonus for stones that rose since the last step.
    pub height_bonus: f64,
    /// Push: weighted decrease of mean squared blade-to-stone distance.
    pub blade_progress: f64,
    /// Push: weighted decrease of mean squared stone-to-target distance.
    pub stone_progress: f64,
    /// Relocate: penalty for stones dropped this step (negative or zero).
    pub drop_penalty: f64,
    /// Success bonus or out-of-bounds penalty.
    pub terminal: f64,
}

impl RewardComponents {
    pub fn step_reward(&self) -> f64 {
        self.step_penalty + self.height_bonus + self.blade_progress + self.stone_progress + self.drop_penalty
    }

    pub fn total(&self) -> f64 {
        self.step_reward() + self.terminal
    }
}

/// One JSONL line per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub schema_version: u32,
    pub kind: String,
    pub episode: u64,
    pub step: u64,
    /// Real interval since the previous decision.
    pub elapsed_ms: f64,
    pub decision: ControlDecision,
    pub command: ActuatorCommand,
    pub reward: RewardComponents,
    pub total_reward: f64,
    pub done: bool,
    pub reason: Option<TerminationReason>,
}

impl StepRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        episode: u64,
        step: u64,
        elapsed_ms: f64,
        decision: ControlDecision,
        command: ActuatorCommand,
        reward: RewardComponents,
        total_reward: f64,
        reason: Option<TerminationReason>,
    ) -> Self {
        Self {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            kind: "step".to_string(),
            episode,
            step,
            elapsed_ms,
            decision,
            command,
            reward,
            total_reward,
            done: reason.is_some(),
            reason,
        }
    }
}

/// Written once when an episode terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeEndRecord {
    pub schema_version: u32,
    pub kind: String,
    pub episode: u64,
    pub task: String,
    pub steps: u64,
    pub total_reward: f64,
    pub reason: TerminationReason,
    /// Planar offset between stone 1's start and the target.
    pub target_distance: f64,
    pub mean_interval_ms: f64,
}

impl EpisodeEndRecord {
    pub fn new(
        episode: u64,
        task: &str,
        steps: u64,
        total_reward: f64,
        reason: TerminationReason,
        target_distance: f64,
        mean_interval_ms: f64,
    ) -> Self {
        Self {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            kind: "episode_end".to_string(),
            episode,
            task: task.to_string(),
            steps,
            total_reward,
            reason,
            target_distance,
            mean_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_reward_excludes_terminal() {
        let c = RewardComponents {
            step_penalty: -0.1,
            height_bonus: 10.0,
            terminal: 500.0,
            ..Default::default()
        };
        assert!((c.step_reward() - 9.9).abs() < 1e-12);
        assert!((c.total() - 509.9).abs() < 1e-12);
    }

    #[test]
    fn step_record_serializes_reason_label() {
        let rec = StepRecord::new(
            1,
            7,
            10.2,
            ControlDecision::idle(),
            ActuatorCommand::neutral(),
            RewardComponents::default(),
            -0.7,
            Some(TerminationReason::OutOfBounds),
        );
        let line = serde_json::to_string(&rec).unwrap();
        assert!(line.contains("\"kind\":\"step\""));
        assert!(line.contains("\"reason\":\"out of boarders\""));
        assert!(line.contains("\"done\":true"));
    }
}
