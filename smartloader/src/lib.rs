//! SmartLoader control-loop library.
//!
//! Drives a loader/excavator rig (simulated or real) through fixed-rate
//! reset/step episodes for a learning agent. The binaries (`src/main.rs`,
//! `src/bin/llc.rs`) are thin harnesses around these components.
//!
//! # Architecture
//!
//! - **World state** (`world_state`, `sensors`): asynchronous producers push
//!   samples into a shared store; readers block on a condition variable until
//!   every required signal is present.
//! - **Control** (`pid`, `loop_scheduler`, `llc`): saturated PID, fixed-rate
//!   pacing and the blade-hold controller built from them.
//! - **I/O** (`io`): actuator and simulator-lifecycle traits with a recording
//!   no-op implementation and a threaded kinematic scene.
//! - **Episodes** (`rl`): decision translation, observations, task rewards
//!   and the reset/step controller.
//! - **Ambient** (`config`, `context`, `error`, `telemetry`): configuration
//!   with CLI > env > default precedence, shared context, typed errors and
//!   the JSONL telemetry sink.

pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod io;
pub mod llc;
pub mod loop_scheduler;
pub mod pid;
pub mod rl;
pub mod sensors;
pub mod telemetry;
pub mod world_state;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{resolve_effective_task, EnvConfig, Randomization, TaskKind, TaskParams};
pub use context::ControlContext;
pub use error::{EnvError, Result};

pub use io::{
    noop::{CommandRecorder, NoopSimulator, RecordingActuator},
    sim::{KinematicScene, SceneActuator, SceneConfig},
    ActuatorSink, SimulatorLifecycle,
};

pub use llc::{BladeHoldController, LlcConfig, LlcReport};
pub use loop_scheduler::StepScheduler;
pub use pid::Pid;
pub use sensors::SensorHub;
pub use world_state::{SignalKey, SignalValue, WorldState, WorldStateStore};

pub use rl::{
    run_episode, ActionProfile, ActionTranslator, ActuatorCommand, ControlDecision,
    DriveForwardPolicy, EpisodePhase, EpisodeSummary, LoaderEnv, Observation, Policy, StepInfo,
    StepResult, TerminationReason,
};
