// src/io/mod.rs
//
// Boundary to the external collaborators of the control loop.
//
// The episode controller never talks to a transport or a simulator
// directly. It holds one `ActuatorSink` (where commands go) and one
// `SimulatorLifecycle` (scene start/stop). Sensor data flows the other way
// through `crate::sensors::SensorHub` into the world state store.
//
// - noop: recording sink and a lifecycle stub for tests and dry runs
// - sim:  in-process kinematic scene with one producer thread per channel

pub mod noop;
pub mod sim;

use crate::config::Randomization;
use crate::error::Result;
use crate::rl::action_encoding::ActuatorCommand;

/// Destination for actuator commands (one per decision).
pub trait ActuatorSink: Send {
    fn send(&mut self, command: &ActuatorCommand) -> Result<()>;

    /// Adapter name for logging.
    fn name(&self) -> &str;
}

/// Scene lifecycle owned by the external simulator.
pub trait SimulatorLifecycle: Send {
    /// Build a new scene with the given randomization and start streaming
    /// sensor data for it.
    fn generate_and_run_episode(&mut self, randomization: Randomization) -> Result<()>;

    /// Stop the running scene. A no-op when nothing is running.
    fn kill_simulation(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    fn name(&self) -> &str;
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for Box<T> {
    fn send(&mut self, command: &ActuatorCommand) -> Result<()> {
        (**self).send(command)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: SimulatorLifecycle + ?Sized> SimulatorLifecycle for Box<T> {
    fn generate_and_run_episode(&mut self, randomization: Randomization) -> Result<()> {
        (**self).generate_and_run_episode(randomization)
    }

    fn kill_simulation(&mut self) -> Result<()> {
        (**self).kill_simulation()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
