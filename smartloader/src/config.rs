// src/config.rs
//
// Central configuration for the loader control loop.
//
// Defaults reproduce the rig's tuned values (10 ms control period, 5 s
// settle, blade lowered to height 24, 6000-step budgets). Every field can
// be overridden in code through the `with_*` builders, and the most common
// ones through SMARTLOADER_* environment variables.
//
// Precedence for the task variant (highest to lowest):
// 1. CLI argument (--task)
// 2. Environment variable (SMARTLOADER_TASK)
// 3. Default (push)

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EnvError, Result};
use crate::rl::action_encoding::ActionProfile;

/// Task variant. Closed set; each maps to one reward/termination rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    PickUp,
    PutDown,
    Relocate,
    Push,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::PickUp,
        TaskKind::PutDown,
        TaskKind::Relocate,
        TaskKind::Push,
    ];

    /// Stable lowercase name (logs, telemetry).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::PickUp => "pick_up",
            TaskKind::PutDown => "put_down",
            TaskKind::Relocate => "relocate",
            TaskKind::Push => "push",
        }
    }

    /// Parse a task name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<TaskKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pick_up" | "pickup" | "pick-up" | "pick" => Some(TaskKind::PickUp),
            "put_down" | "putdown" | "put-down" | "put" => Some(TaskKind::PutDown),
            "relocate" | "move" | "move-with-stones" | "move_with_stones" => {
                Some(TaskKind::Relocate)
            }
            "push" | "push-stones" | "push_stones" => Some(TaskKind::Push),
            _ => None,
        }
    }
}

/// Scene randomization requested from the simulator on each reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Randomization {
    /// Fixed layout; only tiny jitter. Used with a single stone.
    #[default]
    VeryBasic,
    /// Stones scattered around the vehicle.
    Basic,
}

impl Randomization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Randomization::VeryBasic => "verybasic",
            Randomization::Basic => "basic",
        }
    }

    pub fn parse(s: &str) -> Option<Randomization> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verybasic" | "very_basic" | "very-basic" => Some(Randomization::VeryBasic),
            "basic" => Some(Randomization::Basic),
            _ => None,
        }
    }
}

/// Where the effective task came from (logged at startup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    Env,
    Default,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Cli => "cli",
            ConfigSource::Env => "env",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectiveTask {
    pub task: TaskKind,
    pub source: ConfigSource,
}

impl EffectiveTask {
    pub fn log_startup(&self) {
        info!(
            task = self.task.as_str(),
            source = self.source.as_str(),
            "effective task resolved"
        );
    }
}

/// Resolve the task with CLI > env > default precedence.
pub fn resolve_effective_task(cli: Option<TaskKind>) -> EffectiveTask {
    if let Some(task) = cli {
        return EffectiveTask {
            task,
            source: ConfigSource::Cli,
        };
    }
    if let Ok(raw) = env::var("SMARTLOADER_TASK") {
        match TaskKind::parse(&raw) {
            Some(task) => {
                return EffectiveTask {
                    task,
                    source: ConfigSource::Env,
                }
            }
            None => warn!(value = %raw, "SMARTLOADER_TASK not recognized; using default"),
        }
    }
    EffectiveTask {
        task: TaskKind::Push,
        source: ConfigSource::Default,
    }
}

/// Reward/termination constants for all task variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    /// Per-step penalty magnitude (subtracted every step in sparse variants).
    pub step_penalty: f64,
    /// Step budget for pick-up, put-down and relocate.
    pub max_steps: u64,

    // ----- pick-up -----
    /// Height every stone must reach for success.
    pub pickup_height_limit: f64,
    /// Bonus per stone whose height strictly increased since the last step.
    pub stone_up_bonus: f64,

    // ----- put-down / relocate -----
    /// Success constant (put-down subtracts distances from it).
    pub success_reward: f64,
    /// Penalty the first time a carried stone is reported dropped.
    pub drop_penalty: f64,
    /// Planar tolerance around the relocate target.
    pub relocate_tolerance: f64,
    /// Planar put-down target (x, y).
    pub put_down_target: [f64; 2],
    /// Planar relocate target (x, y).
    pub relocate_target: [f64; 2],

    // ----- push -----
    pub push_blade_weight: f64,
    pub push_stone_weight: f64,
    /// Magnitude of the out-of-bounds penalty and the success bonus scale.
    pub push_final_reward: f64,
    /// Squared planar distance under which a stone counts as delivered.
    pub push_success_tolerance_sq: f64,
    /// Step budget per unit of initial stone-to-target distance.
    pub push_steps_per_unit: f64,
    /// Seed values for the previous-step distances on the first step.
    pub push_initial_blade_sq: f64,
    pub push_initial_stone_sq: f64,

    // ----- scene layout -----
    /// Target offset along +x from stone 1, drawn uniformly from [lo, hi).
    pub target_offset_range: (f64, f64),
    /// Boundary margin around vehicle and stones.
    pub object_margin: f64,
    /// Boundary margin around the target.
    pub target_margin: f64,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            step_penalty: 0.1,
            max_steps: 6000,
            pickup_height_limit: 100.0,
            stone_up_bonus: 10.0,
            success_reward: 1000.0,
            drop_penalty: 1000.0,
            relocate_tolerance: 0.1,
            put_down_target: [250.0, 250.0],
            relocate_target: [250.0, 250.0],
            push_blade_weight: 0.1,
            push_stone_weight: 1.0,
            push_final_reward: 10_000.0,
            push_success_tolerance_sq: 1.0,
            push_steps_per_unit: 1000.0,
            push_initial_blade_sq: 9.0,
            push_initial_stone_sq: 16.0,
            target_offset_range: (4.0, 8.0),
            object_margin: 1.0,
            target_margin: 1.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub task: TaskKind,
    /// Number of tracked stones (ids 1..=num_stones).
    pub num_stones: usize,
    /// Minimum wall-clock spacing between decisions.
    pub control_period: Duration,
    /// Wait after scene regeneration before the episode starts.
    pub settle: Duration,
    /// Arm height the blade is lowered to during reset.
    pub blade_target_height: f64,
    /// Optional bound on every blocking wait. `None` waits forever.
    pub deadline: Option<Duration>,
    /// Subtract the target pose from positions in the observation.
    pub normalized: bool,
    pub randomization: Randomization,
    pub action_profile: ActionProfile,
    /// Seed for target generation. `None` draws from entropy.
    pub seed: Option<u64>,
    pub params: TaskParams,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            task: TaskKind::Push,
            num_stones: 1,
            control_period: Duration::from_millis(10),
            settle: Duration::from_secs(5),
            blade_target_height: 24.0,
            deadline: None,
            normalized: true,
            randomization: Randomization::VeryBasic,
            action_profile: ActionProfile::Full,
            seed: None,
            params: TaskParams::default(),
        }
    }
}

impl EnvConfig {
    pub fn for_task(task: TaskKind) -> Self {
        Self {
            task,
            ..Self::default()
        }
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = task;
        self
    }

    pub fn with_num_stones(mut self, n: usize) -> Self {
        self.num_stones = n;
        self
    }

    pub fn with_control_period(mut self, period: Duration) -> Self {
        self.control_period = period;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_blade_target_height(mut self, height: f64) -> Self {
        self.blade_target_height = height;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_action_profile(mut self, profile: ActionProfile) -> Self {
        self.action_profile = profile;
        self
    }

    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_stones == 0 {
            return Err(EnvError::Config("num_stones must be at least 1".into()));
        }
        if self.control_period.is_zero() {
            return Err(EnvError::Config("control_period must be positive".into()));
        }
        let (lo, hi) = self.params.target_offset_range;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(EnvError::Config(format!(
                "target_offset_range must be finite with lo <= hi, got ({lo}, {hi})"
            )));
        }
        let h = self.blade_target_height;
        if !(h.is_finite() && h >= 0.0) {
            return Err(EnvError::Config(format!(
                "blade_target_height must be finite and non-negative, got {h}"
            )));
        }
        Ok(())
    }

    /// Defaults with SMARTLOADER_* overrides applied.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env_or_default() -> Self {
        let mut cfg = EnvConfig::default();

        if let Ok(raw) = env::var("SMARTLOADER_TASK") {
            match TaskKind::parse(&raw) {
                Some(task) => cfg.task = task,
                None => warn!(value = %raw, "ignoring SMARTLOADER_TASK"),
            }
        }
        if let Some(n) = parse_env::<usize>("SMARTLOADER_NUM_STONES") {
            cfg.num_stones = n;
        }
        if let Some(ms) = parse_env::<u64>("SMARTLOADER_PERIOD_MS") {
            cfg.control_period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("SMARTLOADER_SETTLE_MS") {
            cfg.settle = Duration::from_millis(ms);
        }
        if let Some(h) = parse_env::<f64>("SMARTLOADER_BLADE_HEIGHT") {
            cfg.blade_target_height = h;
        }
        if let Some(ms) = parse_env::<u64>("SMARTLOADER_DEADLINE_MS") {
            cfg.deadline = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Ok(raw) = env::var("SMARTLOADER_NORMALIZED") {
            cfg.normalized = matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(raw) = env::var("SMARTLOADER_RANDOMIZATION") {
            match Randomization::parse(&raw) {
                Some(r) => cfg.randomization = r,
                None => warn!(value = %raw, "ignoring SMARTLOADER_RANDOMIZATION"),
            }
        }
        if let Ok(raw) = env::var("SMARTLOADER_ACTION_PROFILE") {
            match ActionProfile::parse(&raw) {
                Some(p) => cfg.action_profile = p,
                None => warn!(value = %raw, "ignoring SMARTLOADER_ACTION_PROFILE"),
            }
        }

        cfg
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_parse_accepts_aliases() {
        assert_eq!(TaskKind::parse("PickUp"), Some(TaskKind::PickUp));
        assert_eq!(TaskKind::parse("put-down"), Some(TaskKind::PutDown));
        assert_eq!(TaskKind::parse("move_with_stones"), Some(TaskKind::Relocate));
        assert_eq!(TaskKind::parse(" push "), Some(TaskKind::Push));
        assert_eq!(TaskKind::parse("dig"), None);
        for task in TaskKind::ALL {
            assert_eq!(TaskKind::parse(task.as_str()), Some(task));
        }
    }

    #[test]
    fn cli_task_wins() {
        let eff = resolve_effective_task(Some(TaskKind::PutDown));
        assert_eq!(eff.task, TaskKind::PutDown);
        assert_eq!(eff.source, ConfigSource::Cli);
    }

    #[test]
    fn defaults_match_rig_tuning() {
        let cfg = EnvConfig::default();
        assert_eq!(cfg.control_period, Duration::from_millis(10));
        assert_eq!(cfg.settle, Duration::from_secs(5));
        assert_eq!(cfg.blade_target_height, 24.0);
        assert_eq!(cfg.params.max_steps, 6000);
        assert!(cfg.deadline.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_stones_and_period() {
        assert!(EnvConfig::default().with_num_stones(0).validate().is_err());
        assert!(EnvConfig::default()
            .with_control_period(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn validate_rejects_negative_blade_height() {
        let cfg = EnvConfig::default().with_blade_target_height(-1.0);
        assert!(matches!(cfg.validate(), Err(EnvError::Config(_))));
        let cfg = EnvConfig::default().with_blade_target_height(0.0);
        assert!(cfg.validate().is_ok());
    }
}
