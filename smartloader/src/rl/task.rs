// src/rl/task.rs
//
// Reward and termination rules for the four task variants.
//
// Every variant shares one contract:
//
//   evaluate(world, ctx, params) -> Outcome { reward, done, reason, bonus }
//
// `ctx.steps` has already been incremented for the step being evaluated, so
// it is the 1-based count of steps taken. When several terminal conditions
// hold on the same step the outcome is picked as success, then out of
// bounds, then time limit.

use std::fmt;

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{TaskKind, TaskParams};
use crate::error::Result;
use crate::geometry::{self, BoundingBox};
use crate::world_state::{SignalKey, StoneState, WorldState};

use super::telemetry::RewardComponents;

/// Why an episode ended. Labels match the rig's log vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    #[serde(rename = "sim success")]
    Success,
    #[serde(rename = "limit time steps")]
    TimeLimit,
    #[serde(rename = "out of boarders")]
    OutOfBounds,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Success => "sim success",
            TerminationReason::TimeLimit => "limit time steps",
            TerminationReason::OutOfBounds => "out of boarders",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub reward: f64,
    pub done: bool,
    pub reason: Option<TerminationReason>,
    pub bonus: f64,
    pub components: RewardComponents,
}

impl Outcome {
    fn from_parts(components: RewardComponents, reason: Option<TerminationReason>) -> Self {
        Self {
            reward: components.step_reward(),
            done: reason.is_some(),
            reason,
            bonus: components.terminal,
            components,
        }
    }
}

/// Mutable per-episode bookkeeping. Built at reset, dropped at the next one.
#[derive(Debug, Clone)]
pub struct EpisodeContext {
    pub num_stones: usize,
    /// Steps taken so far (1-based once the first step is evaluated).
    pub steps: u64,
    pub total_reward: f64,
    /// Target pose. Planar targets carry z = 0.
    pub target: Vector3<f64>,
    pub boundary: BoundingBox,
    /// Step count at which the episode times out.
    pub step_budget: f64,
    /// Planar distance from stone 1's start to the target.
    pub initial_target_distance: f64,

    // push
    pub prev_mean_sq_blade: f64,
    pub prev_mean_sq_stone: f64,

    // pick-up
    pub last_heights: Option<Vec<f64>>,

    // put-down and relocate
    /// Loaded flag has read `true` at least once this episode.
    pub stones_loaded: Vec<bool>,
    /// Loaded flag went from `true` to `false`. Sticky.
    pub stones_on_ground: Vec<bool>,
}

impl EpisodeContext {
    pub fn new(
        task: TaskKind,
        params: &TaskParams,
        num_stones: usize,
        target: Vector3<f64>,
        boundary: BoundingBox,
        initial_target_distance: f64,
    ) -> Self {
        Self {
            num_stones,
            steps: 0,
            total_reward: 0.0,
            target,
            boundary,
            step_budget: task.step_budget(params, initial_target_distance),
            initial_target_distance,
            prev_mean_sq_blade: params.push_initial_blade_sq,
            prev_mean_sq_stone: params.push_initial_stone_sq,
            last_heights: None,
            stones_loaded: vec![false; num_stones],
            stones_on_ground: vec![false; num_stones],
        }
    }

    pub fn timed_out(&self) -> bool {
        self.steps as f64 >= self.step_budget
    }

    /// Track loaded flags and return how many stones were set down by this
    /// step. A stone that was never reported loaded is never set down.
    fn record_set_downs(&mut self, stones: &[StoneState]) -> usize {
        let mut set_down = 0;
        let flags = self.stones_loaded.iter_mut().zip(self.stones_on_ground.iter_mut());
        for ((loaded, on_ground), stone) in flags.zip(stones) {
            match stone.is_loaded {
                Some(true) => *loaded = true,
                Some(false) if *loaded && !*on_ground => {
                    *on_ground = true;
                    set_down += 1;
                }
                _ => {}
            }
        }
        set_down
    }

    /// Vehicle planar position outside the scene boundary.
    pub fn out_of_bounds(&self, world: &WorldState) -> Result<bool> {
        let pos = world.vector(SignalKey::VehiclePos)?;
        Ok(!self.boundary.contains(geometry::planar(&pos)))
    }
}

/// Scene layout captured after settling, used to derive targets and bounds.
#[derive(Debug, Clone)]
pub struct SceneLayout {
    pub vehicle: Vector3<f64>,
    pub stones: Vec<Vector3<f64>>,
}

impl SceneLayout {
    pub fn from_world(world: &WorldState, num_stones: usize) -> Result<Self> {
        Ok(Self {
            vehicle: world.vector(SignalKey::VehiclePos)?,
            stones: world
                .stones(num_stones)?
                .into_iter()
                .map(|s| s.position)
                .collect(),
        })
    }

    /// Union of vehicle and stone boxes (object margin) and the target box
    /// (target margin).
    pub fn boundary(&self, target: &Vector3<f64>, params: &TaskParams) -> BoundingBox {
        let objects = std::iter::once(self.vehicle)
            .chain(self.stones.iter().copied())
            .map(|p| BoundingBox::around(geometry::planar(&p), params.object_margin));
        let target_box = BoundingBox::around(geometry::planar(target), params.target_margin);
        BoundingBox::union_all(objects.chain(std::iter::once(target_box))).unwrap_or(target_box)
    }
}

impl TaskKind {
    /// Pick the episode target from the settled scene.
    ///
    /// Push and pick-up offset stone 1 along +x by a distance drawn from
    /// `params.target_offset_range`; put-down and relocate use fixed planar
    /// targets.
    pub fn target_pose<R: Rng>(
        &self,
        layout: &SceneLayout,
        params: &TaskParams,
        rng: &mut R,
    ) -> Vector3<f64> {
        match self {
            TaskKind::Push | TaskKind::PickUp => {
                let origin = layout.stones.first().copied().unwrap_or(layout.vehicle);
                let (lo, hi) = params.target_offset_range;
                let offset = if hi > lo { rng.gen_range(lo..hi) } else { lo };
                origin + Vector3::new(offset, 0.0, 0.0)
            }
            TaskKind::PutDown => {
                let [x, y] = params.put_down_target;
                Vector3::new(x, y, 0.0)
            }
            TaskKind::Relocate => {
                let [x, y] = params.relocate_target;
                Vector3::new(x, y, 0.0)
            }
        }
    }

    /// Step count at which the episode times out.
    ///
    /// Steps are counted from 1, so the limit fires on the step whose count
    /// reaches the budget (`steps >= budget`), not the one after it.
    pub fn step_budget(&self, params: &TaskParams, initial_target_distance: f64) -> f64 {
        match self {
            TaskKind::Push => params.push_steps_per_unit * initial_target_distance,
            _ => params.max_steps as f64,
        }
    }

    /// Score the step that produced `world`.
    pub fn evaluate(
        &self,
        world: &WorldState,
        ctx: &mut EpisodeContext,
        params: &TaskParams,
    ) -> Result<Outcome> {
        match self {
            TaskKind::PickUp => evaluate_pick_up(world, ctx, params),
            TaskKind::PutDown => evaluate_put_down(world, ctx, params),
            TaskKind::Relocate => evaluate_relocate(world, ctx, params),
            TaskKind::Push => evaluate_push(world, ctx, params),
        }
    }
}

fn evaluate_pick_up(world: &WorldState, ctx: &mut EpisodeContext, params: &TaskParams) -> Result<Outcome> {
    let heights: Vec<f64> = world
        .stones(ctx.num_stones)?
        .iter()
        .map(|s| s.position.z)
        .collect();

    let mut c = RewardComponents {
        step_penalty: -params.step_penalty,
        ..Default::default()
    };
    if let Some(last) = &ctx.last_heights {
        let risen = heights.iter().zip(last).filter(|(now, before)| now > before).count();
        c.height_bonus = params.stone_up_bonus * risen as f64;
    }
    let lifted = heights.iter().all(|h| *h >= params.pickup_height_limit);
    ctx.last_heights = Some(heights);

    let reason = if lifted {
        Some(TerminationReason::Success)
    } else if ctx.timed_out() {
        Some(TerminationReason::TimeLimit)
    } else {
        None
    };
    Ok(Outcome::from_parts(c, reason))
}

fn evaluate_put_down(world: &WorldState, ctx: &mut EpisodeContext, params: &TaskParams) -> Result<Outcome> {
    let stones = world.stones(ctx.num_stones)?;
    ctx.record_set_downs(&stones);

    let mut c = RewardComponents {
        step_penalty: -params.step_penalty,
        ..Default::default()
    };
    let reason = if ctx.stones_on_ground.iter().all(|g| *g) {
        let target = ctx.target;
        let spread: f64 = stones
            .iter()
            .map(|s| geometry::planar_distance(&s.position, &target))
            .sum();
        c.terminal = params.success_reward - spread;
        Some(TerminationReason::Success)
    } else if ctx.timed_out() {
        Some(TerminationReason::TimeLimit)
    } else {
        None
    };
    Ok(Outcome::from_parts(c, reason))
}

fn evaluate_relocate(world: &WorldState, ctx: &mut EpisodeContext, params: &TaskParams) -> Result<Outcome> {
    let stones = world.stones(ctx.num_stones)?;
    let mut c = RewardComponents {
        step_penalty: -params.step_penalty,
        ..Default::default()
    };
    let dropped = ctx.record_set_downs(&stones);
    if dropped > 0 {
        c.drop_penalty = -params.drop_penalty * dropped as f64;
    }

    let vehicle = world.vector(SignalKey::VehiclePos)?;
    let arrived = geometry::planar_distance(&vehicle, &ctx.target) < params.relocate_tolerance;

    let reason = if arrived {
        c.terminal = params.success_reward;
        Some(TerminationReason::Success)
    } else if ctx.timed_out() {
        Some(TerminationReason::TimeLimit)
    } else {
        None
    };
    Ok(Outcome::from_parts(c, reason))
}

fn evaluate_push(world: &WorldState, ctx: &mut EpisodeContext, params: &TaskParams) -> Result<Outcome> {
    let stones = world.stones(ctx.num_stones)?;
    let vehicle_pos = world.vector(SignalKey::VehiclePos)?;
    let vehicle_orien = world.orientation(SignalKey::VehicleOrien)?;
    let blade = geometry::blade_pose(&vehicle_pos, &vehicle_orien);
    let target = ctx.target;

    let blade_sq: Vec<f64> = stones
        .iter()
        .map(|s| geometry::squared_planar_distance(&blade, &s.position))
        .collect();
    let stone_sq: Vec<f64> = stones
        .iter()
        .map(|s| geometry::squared_planar_distance(&s.position, &target))
        .collect();
    let mean_blade = mean(&blade_sq);
    let mean_stone = mean(&stone_sq);

    let mut c = RewardComponents {
        blade_progress: params.push_blade_weight * (ctx.prev_mean_sq_blade - mean_blade),
        stone_progress: params.push_stone_weight * (ctx.prev_mean_sq_stone - mean_stone),
        ..Default::default()
    };
    ctx.prev_mean_sq_blade = mean_blade;
    ctx.prev_mean_sq_stone = mean_stone;

    let delivered = stone_sq.iter().all(|d| *d < params.push_success_tolerance_sq);
    let reason = if delivered {
        c.terminal = params.push_final_reward * ctx.step_budget / ctx.steps.max(1) as f64;
        Some(TerminationReason::Success)
    } else if ctx.out_of_bounds(world)? {
        c.terminal = -params.push_final_reward;
        Some(TerminationReason::OutOfBounds)
    } else if ctx.timed_out() {
        Some(TerminationReason::TimeLimit)
    } else {
        None
    };
    Ok(Outcome::from_parts(c, reason))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
