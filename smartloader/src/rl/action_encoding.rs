// src/rl/action_encoding.rs
//
// Decision -> actuator command translation.
//
// The agent speaks a 4-dim decision [steer, speed, blade_pitch, arm_height],
// all nominally in [-1, 1]. The rig takes a 6-channel command:
//
//   0 steer | 1 reserved | 2 drive backward | 3 blade pitch | 4 arm height | 5 drive forward
//
// The two drive channels are pedal-style: +1 is released (neutral), -1 is
// fully pressed. So a neutral command is NOT all zeros.
//
// Out-of-range decisions are forwarded as-is (no re-clamp); see the
// `out_of_range_decision_is_not_reclamped` test.

use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// Decision arity for every task variant.
pub const DECISION_DIM: usize = 4;

/// Actuator channel count.
pub const COMMAND_DIM: usize = 6;

/// Joystick message width (two trailing unused axes).
pub const JOY_AXES: usize = 8;

pub mod channel {
    pub const STEER: usize = 0;
    pub const RESERVED: usize = 1;
    pub const DRIVE_BACKWARD: usize = 2;
    pub const BLADE_PITCH: usize = 3;
    pub const ARM_HEIGHT: usize = 4;
    pub const DRIVE_FORWARD: usize = 5;
}

/// Released-pedal value for both drive channels.
pub const DRIVE_NEUTRAL: f64 = 1.0;

/// Abstract control decision from the external agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub steer: f64,
    /// Signed speed: negative drives backward.
    pub speed: f64,
    pub blade_pitch: f64,
    pub arm_height: f64,
}

impl ControlDecision {
    pub fn new(steer: f64, speed: f64, blade_pitch: f64, arm_height: f64) -> Self {
        Self {
            steer,
            speed,
            blade_pitch,
            arm_height,
        }
    }

    /// Parse a flat agent vector. Arity must be exactly `DECISION_DIM`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [steer, speed, pitch, height] => Ok(Self::new(*steer, *speed, *pitch, *height)),
            _ => Err(EnvError::InvalidDecision {
                expected: DECISION_DIM,
                got: values.len(),
            }),
        }
    }

    pub fn to_array(&self) -> [f64; DECISION_DIM] {
        [self.steer, self.speed, self.blade_pitch, self.arm_height]
    }

    /// Do nothing.
    pub fn idle() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Drive straight ahead at full speed (scripted debug policy).
    pub fn drive_forward() -> Self {
        Self::new(0.0, 1.0, 0.0, 0.0)
    }
}

/// Channel-mapped command sent to the rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub channels: [f64; COMMAND_DIM],
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ActuatorCommand {
    /// Everything released: steer 0, pedals up, implement still.
    pub fn neutral() -> Self {
        let mut channels = [0.0; COMMAND_DIM];
        channels[channel::DRIVE_BACKWARD] = DRIVE_NEUTRAL;
        channels[channel::DRIVE_FORWARD] = DRIVE_NEUTRAL;
        Self { channels }
    }

    /// Lower the arm at full rate with the vehicle stationary.
    pub fn blade_down() -> Self {
        let mut cmd = Self::neutral();
        cmd.channels[channel::ARM_HEIGHT] = -1.0;
        cmd
    }

    /// Implement-only command from the low-level controller outputs.
    pub fn implement(lift: f64, pitch: f64) -> Self {
        let mut cmd = Self::neutral();
        cmd.channels[channel::BLADE_PITCH] = pitch;
        cmd.channels[channel::ARM_HEIGHT] = lift;
        cmd
    }

    pub fn steer(&self) -> f64 {
        self.channels[channel::STEER]
    }

    pub fn drive_backward(&self) -> f64 {
        self.channels[channel::DRIVE_BACKWARD]
    }

    pub fn drive_forward(&self) -> f64 {
        self.channels[channel::DRIVE_FORWARD]
    }

    pub fn blade_pitch(&self) -> f64 {
        self.channels[channel::BLADE_PITCH]
    }

    pub fn arm_height(&self) -> f64 {
        self.channels[channel::ARM_HEIGHT]
    }

    /// Joystick layout: `[steer, 0, back, pitch, height, fwd, 0, 0]`.
    pub fn to_joy_axes(&self) -> [f64; JOY_AXES] {
        let mut axes = [0.0; JOY_AXES];
        axes[..COMMAND_DIM].copy_from_slice(&self.channels);
        axes[channel::RESERVED] = 0.0;
        axes
    }

    pub fn within_unit_range(&self) -> bool {
        self.channels.iter().all(|c| (-1.0..=1.0).contains(c))
    }
}

/// Which decision components are forwarded to the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionProfile {
    /// All four components.
    #[default]
    Full,
    /// Implement held at default; steer scaled to [-0.2, 0.2].
    DriveAndSteer,
    /// Implement and steer held at default.
    DriveOnly,
}

impl ActionProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionProfile::Full => "full",
            ActionProfile::DriveAndSteer => "drive-steer",
            ActionProfile::DriveOnly => "drive",
        }
    }

    pub fn parse(s: &str) -> Option<ActionProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "4" => Some(ActionProfile::Full),
            "drive-steer" | "drive_steer" | "2" => Some(ActionProfile::DriveAndSteer),
            "drive" | "drive-only" | "1" => Some(ActionProfile::DriveOnly),
            _ => None,
        }
    }
}

/// Pure decision -> command mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionTranslator {
    pub profile: ActionProfile,
    pub steer_scale: f64,
    pub pitch_scale: f64,
    pub height_scale: f64,
}

impl Default for ActionTranslator {
    fn default() -> Self {
        Self::new(ActionProfile::Full)
    }
}

impl ActionTranslator {
    pub fn new(profile: ActionProfile) -> Self {
        let steer_scale = match profile {
            ActionProfile::DriveAndSteer => 0.2,
            _ => 1.0,
        };
        Self {
            profile,
            steer_scale,
            pitch_scale: 1.0,
            height_scale: 1.0,
        }
    }

    pub fn translate(&self, decision: &ControlDecision) -> ActuatorCommand {
        let mut cmd = ActuatorCommand::neutral();

        if self.profile != ActionProfile::DriveOnly {
            cmd.channels[channel::STEER] = decision.steer * self.steer_scale;
        }
        if self.profile == ActionProfile::Full {
            cmd.channels[channel::BLADE_PITCH] = decision.blade_pitch * self.pitch_scale;
            cmd.channels[channel::ARM_HEIGHT] = decision.arm_height * self.height_scale;
        }

        let (backward, forward) = split_drive(decision.speed);
        cmd.channels[channel::DRIVE_BACKWARD] = backward;
        cmd.channels[channel::DRIVE_FORWARD] = forward;
        cmd
    }
}

/// Signed speed -> (backward, forward) pedal pair. The idle pedal stays at
/// `DRIVE_NEUTRAL`.
#[inline]
pub fn split_drive(speed: f64) -> (f64, f64) {
    if speed < 0.0 {
        (-2.0 * speed - 1.0, DRIVE_NEUTRAL)
    } else if speed > 0.0 {
        (DRIVE_NEUTRAL, -2.0 * speed + 1.0)
    } else {
        (DRIVE_NEUTRAL, DRIVE_NEUTRAL)
    }
}
