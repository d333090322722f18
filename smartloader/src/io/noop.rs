// src/io/noop.rs
//
// Recording actuator and lifecycle stub.
//
// Neither touches a real rig:
// - `RecordingActuator` keeps every command it is handed and can run a
//   hook per command (tests use it to feed the next scripted sample)
// - `NoopSimulator` counts lifecycle calls and optionally runs a hook on
//   every scene start

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Randomization;
use crate::error::Result;
use crate::io::{ActuatorSink, SimulatorLifecycle};
use crate::rl::action_encoding::ActuatorCommand;

/// Command with the instant it was handed to the sink.
#[derive(Debug, Clone, Copy)]
pub struct RecordedCommand {
    pub command: ActuatorCommand,
    pub sent_at: Instant,
}

/// Thread-safe command log, shared between a sink and its observers.
#[derive(Debug, Clone, Default)]
pub struct CommandRecorder {
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command: ActuatorCommand) {
        self.commands.lock().push(RecordedCommand {
            command,
            sent_at: Instant::now(),
        });
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn last(&self) -> Option<ActuatorCommand> {
        self.commands.lock().last().map(|r| r.command)
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Called with each command and its 0-based index in the recorder.
pub type CommandHook = Box<dyn FnMut(&ActuatorCommand, usize) + Send>;

pub struct RecordingActuator {
    recorder: CommandRecorder,
    hook: Option<CommandHook>,
}

impl RecordingActuator {
    pub fn new(recorder: CommandRecorder) -> Self {
        Self {
            recorder,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: CommandHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn recorder(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl ActuatorSink for RecordingActuator {
    fn send(&mut self, command: &ActuatorCommand) -> Result<()> {
        let index = self.recorder.len();
        self.recorder.record(*command);
        if let Some(hook) = self.hook.as_mut() {
            hook(command, index);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RecordingActuator"
    }
}

/// Lifecycle call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCounts {
    pub started: usize,
    pub killed: usize,
}

/// Called with the randomization and the 0-based scene index.
pub type StartHook = Box<dyn FnMut(Randomization, usize) + Send>;

#[derive(Default)]
pub struct NoopSimulator {
    counts: Arc<Mutex<LifecycleCounts>>,
    running: bool,
    on_start: Option<StartHook>,
}

impl NoopSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_hook(mut self, hook: StartHook) -> Self {
        self.on_start = Some(hook);
        self
    }

    /// Shared view of the counters, readable after the simulator is moved.
    pub fn counts(&self) -> Arc<Mutex<LifecycleCounts>> {
        Arc::clone(&self.counts)
    }
}

impl SimulatorLifecycle for NoopSimulator {
    fn generate_and_run_episode(&mut self, randomization: Randomization) -> Result<()> {
        let index = {
            let mut counts = self.counts.lock();
            counts.started += 1;
            counts.started - 1
        };
        self.running = true;
        if let Some(hook) = self.on_start.as_mut() {
            hook(randomization, index);
        }
        Ok(())
    }

    fn kill_simulation(&mut self) -> Result<()> {
        if self.running {
            self.counts.lock().killed += 1;
            self.running = false;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn name(&self) -> &str {
        "NoopSimulator"
    }
}
