// src/error.rs
//
// Error taxonomy for the control loop.
//
// Episode outcomes (success, timeout, out of boarders) are NOT errors; they
// are reported through `TerminationReason`. Errors here are either contract
// violations by the caller, liveness deadlines that expired, or failures
// surfaced by the external collaborators (actuator transport, simulator).

use std::time::Duration;

use thiserror::Error;

use crate::rl::EpisodePhase;
use crate::world_state::SignalKey;

/// Library result alias.
pub type Result<T> = std::result::Result<T, EnvError>;

#[derive(Debug, Error)]
pub enum EnvError {
    /// An operation was invoked in a phase that does not allow it
    /// (e.g. `step()` before `reset()` or after `done`).
    #[error("contract violation: `{op}` is not valid in phase {phase:?}")]
    ContractViolation {
        op: &'static str,
        phase: EpisodePhase,
    },

    /// A configured deadline expired while waiting for data.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// A signal was read that has not been ingested since the last reset.
    #[error("signal {0} has not been received")]
    MissingSignal(SignalKey),

    /// A decision vector with the wrong arity was supplied.
    #[error("decision has {got} components, expected {expected}")]
    InvalidDecision { expected: usize, got: usize },

    /// The actuator transport refused a command.
    #[error("actuator: {0}")]
    Actuator(String),

    /// The simulator collaborator failed a lifecycle request.
    #[error("simulator: {0}")]
    Simulator(String),

    /// Invalid configuration value.
    #[error("config: {0}")]
    Config(String),
}

impl EnvError {
    /// True for errors caused by a misbehaving caller rather than the rig.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            EnvError::ContractViolation { .. } | EnvError::InvalidDecision { .. }
        )
    }
}
