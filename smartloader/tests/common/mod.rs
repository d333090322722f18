// Scripted rig shared by the integration tests.
//
// The simulator start hook ingests an initial frame; every non-blade command
// the controller sends ingests the next scripted frame. Blade-down commands
// lower the arm by `BLADE_STEP` instead (or not at all on a stuck arm).

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nalgebra::{Quaternion, Vector3};
use parking_lot::Mutex;

use smartloader::config::{EnvConfig, Randomization, TaskKind};
use smartloader::context::ControlContext;
use smartloader::io::noop::{CommandRecorder, LifecycleCounts, NoopSimulator, RecordingActuator};
use smartloader::rl::ActuatorCommand;
use smartloader::world_state::{SignalKey, SignalValue, WorldStateStore};
use smartloader::LoaderEnv;

pub const BLADE_STEP: f64 = 20.0;

pub type Frame = Vec<(SignalKey, SignalValue)>;

/// One scripted sample of the rig.
#[derive(Debug, Clone)]
pub struct FrameSpec {
    pub vehicle: [f64; 3],
    pub stones: Vec<[f64; 3]>,
    pub loaded: Option<Vec<bool>>,
    pub arm_height: f64,
    /// Written into BladeLinearAcc.x so consecutive frames always differ.
    pub tick: f64,
}

impl FrameSpec {
    pub fn new(vehicle: [f64; 3], stones: Vec<[f64; 3]>) -> Self {
        Self {
            vehicle,
            stones,
            loaded: None,
            arm_height: 20.0,
            tick: 0.0,
        }
    }

    pub fn loaded(mut self, flags: Vec<bool>) -> Self {
        self.loaded = Some(flags);
        self
    }

    pub fn arm(mut self, height: f64) -> Self {
        self.arm_height = height;
        self
    }

    pub fn tick(mut self, tick: f64) -> Self {
        self.tick = tick;
        self
    }

    pub fn build(&self) -> Frame {
        let identity = SignalValue::Orientation(Quaternion::identity());
        let mut frame = vec![
            (SignalKey::VehiclePos, SignalValue::Vector(Vector3::from(self.vehicle))),
            (SignalKey::VehicleOrien, identity),
            (SignalKey::VehicleLinearVel, SignalValue::Vector(Vector3::zeros())),
            (SignalKey::VehicleAngularVel, SignalValue::Vector(Vector3::zeros())),
            (SignalKey::ArmHeight, SignalValue::Scalar(self.arm_height)),
            (SignalKey::BladeOrien, identity),
            (SignalKey::BladeAngularVel, SignalValue::Vector(Vector3::zeros())),
            (
                SignalKey::BladeLinearAcc,
                SignalValue::Vector(Vector3::new(self.tick, 0.0, 0.0)),
            ),
        ];
        for (i, s) in self.stones.iter().enumerate() {
            frame.push((SignalKey::StonePos(i + 1), SignalValue::Vector(Vector3::from(*s))));
        }
        if let Some(flags) = &self.loaded {
            for (i, f) in flags.iter().enumerate() {
                frame.push((SignalKey::StoneIsLoaded(i + 1), SignalValue::Flag(*f)));
            }
        }
        frame
    }
}

pub fn ingest(store: &WorldStateStore, frame: &Frame) {
    for (key, value) in frame {
        store.ingest(*key, *value);
    }
}

/// Frames `1..=n` produced by `f(step)`, each with a distinct tick.
pub fn frames(n: usize, f: impl Fn(usize) -> FrameSpec) -> Vec<Frame> {
    (1..=n).map(|i| f(i).tick(i as f64).build()).collect()
}

pub struct ScriptedRig {
    pub env: LoaderEnv<RecordingActuator, NoopSimulator>,
    pub recorder: CommandRecorder,
    pub counts: Arc<Mutex<LifecycleCounts>>,
    pub store: Arc<WorldStateStore>,
}

/// Fast configuration: no settle, 1 ms period, bounded waits.
pub fn fast_config(task: TaskKind) -> EnvConfig {
    EnvConfig::for_task(task)
        .with_settle(Duration::ZERO)
        .with_control_period(Duration::from_millis(1))
        .with_deadline(Some(Duration::from_millis(500)))
        .with_seed(Some(7))
}

pub fn scripted_rig(cfg: EnvConfig, initial: FrameSpec, script: Vec<Frame>) -> ScriptedRig {
    scripted_rig_with_context(cfg, ControlContext::quiet(), initial, script)
}

pub fn scripted_rig_with_context(
    cfg: EnvConfig,
    ctx: ControlContext,
    initial: FrameSpec,
    script: Vec<Frame>,
) -> ScriptedRig {
    build_rig(cfg, ctx, initial, script, BLADE_STEP)
}

/// Rig whose arm never moves: every blade-down re-reports the same height.
pub fn stuck_arm_rig(cfg: EnvConfig, initial: FrameSpec) -> ScriptedRig {
    build_rig(cfg, ControlContext::quiet(), initial, vec![], 0.0)
}

fn build_rig(
    cfg: EnvConfig,
    ctx: ControlContext,
    initial: FrameSpec,
    script: Vec<Frame>,
    blade_step: f64,
) -> ScriptedRig {
    let store = Arc::clone(ctx.store());
    let cursor = Arc::new(Mutex::new(0usize));
    let arm = Arc::new(Mutex::new(initial.arm_height));

    let start_store = Arc::clone(&store);
    let start_cursor = Arc::clone(&cursor);
    let start_arm = Arc::clone(&arm);
    let initial_frame = initial.build();
    let initial_arm = initial.arm_height;
    let simulator = NoopSimulator::new().with_start_hook(Box::new(move |_: Randomization, _: usize| {
        *start_cursor.lock() = 0;
        *start_arm.lock() = initial_arm;
        ingest(&start_store, &initial_frame);
    }));
    let counts = simulator.counts();

    let recorder = CommandRecorder::new();
    let send_store = Arc::clone(&store);
    let actuator = RecordingActuator::new(recorder.clone()).with_hook(Box::new(move |cmd: &ActuatorCommand, _: usize| {
        if *cmd == ActuatorCommand::blade_down() {
            let mut height = arm.lock();
            *height -= blade_step;
            send_store.ingest(SignalKey::ArmHeight, SignalValue::Scalar(*height));
            return;
        }
        let mut next = cursor.lock();
        if let Some(frame) = script.get(*next) {
            ingest(&send_store, frame);
            *next += 1;
        }
    }));

    let env = LoaderEnv::new(cfg, ctx, actuator, simulator).expect("valid config");
    ScriptedRig {
        env,
        recorder,
        counts,
        store,
    }
}
