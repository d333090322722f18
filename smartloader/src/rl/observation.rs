// src/rl/observation.rs
//
// Flat observation vector handed to the agent.
//
// Layout (24 + 3 * num_stones values):
//
//   VehiclePos(3) VehicleOrien(4, x y z w) VehicleLinearVel(3) VehicleAngularVel(3)
//   ArmHeight(1) BladeOrien(4) BladeAngularVel(3) BladeLinearAcc(3)
//   StonePos1(3) .. StonePosN(3)
//
// The loaded flags are tracked in the world state but are not part of the
// vector. When normalization is on, VehiclePos and every StonePos have the
// target pose subtracted.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::world_state::{SignalKey, SignalValue, WorldState};

/// Current observation schema version.
pub const OBS_VERSION: u32 = 1;

/// Vehicle and implement keys, in vector order.
pub const VEHICLE_KEYS: [SignalKey; 8] = [
    SignalKey::VehiclePos,
    SignalKey::VehicleOrien,
    SignalKey::VehicleLinearVel,
    SignalKey::VehicleAngularVel,
    SignalKey::ArmHeight,
    SignalKey::BladeOrien,
    SignalKey::BladeAngularVel,
    SignalKey::BladeLinearAcc,
];

/// Width of the vehicle/implement prefix.
pub const VEHICLE_DIM: usize = 24;

/// Values per stone.
pub const STONE_DIM: usize = 3;

pub fn observation_dim(num_stones: usize) -> usize {
    VEHICLE_DIM + STONE_DIM * num_stones
}

/// Every key the observation reads, in vector order.
pub fn observation_keys(num_stones: usize) -> Vec<SignalKey> {
    let mut keys = VEHICLE_KEYS.to_vec();
    keys.extend((1..=num_stones).map(SignalKey::StonePos));
    keys
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub obs_version: u32,
    /// Steps taken when this observation was produced (0 after reset).
    pub step: u64,
    pub normalized: bool,
    pub values: Vec<f64>,
}

impl Observation {
    /// Flatten `world` in vector order.
    ///
    /// `origin` is subtracted from vehicle and stone positions when given.
    pub fn from_world(
        world: &WorldState,
        num_stones: usize,
        origin: Option<&Vector3<f64>>,
        step: u64,
    ) -> Result<Self> {
        let mut values = Vec::with_capacity(observation_dim(num_stones));
        for key in observation_keys(num_stones) {
            let value = world.value(key)?;
            match (value, origin) {
                (SignalValue::Vector(v), Some(o)) if is_position(key) => {
                    let shifted = v - o;
                    values.extend_from_slice(&[shifted.x, shifted.y, shifted.z]);
                }
                _ => values.extend(value.components()),
            }
        }
        Ok(Self {
            obs_version: OBS_VERSION,
            step,
            normalized: origin.is_some(),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Same sensor content, ignoring the step counter.
    pub fn same_values(&self, other: &Observation) -> bool {
        self.values == other.values
    }

    pub fn to_canonical_json(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn is_position(key: SignalKey) -> bool {
    matches!(key, SignalKey::VehiclePos | SignalKey::StonePos(_))
}

/// Per-component bounds of the observation vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationSpace {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl ObservationSpace {
    pub const POSITION_LIMIT: f64 = 500.0;
    pub const LINEAR_VEL_LIMIT: f64 = 5.0;
    pub const ANGULAR_VEL_LIMIT: f64 = std::f64::consts::FRAC_PI_2;
    pub const LINEAR_ACC_LIMIT: f64 = 1.0;
    pub const ARM_HEIGHT_MAX: f64 = 100.0;

    pub fn for_stones(num_stones: usize) -> Self {
        let mut low = Vec::with_capacity(observation_dim(num_stones));
        let mut high = Vec::with_capacity(observation_dim(num_stones));
        let mut push = |n: usize, lo: f64, hi: f64| {
            low.extend(std::iter::repeat(lo).take(n));
            high.extend(std::iter::repeat(hi).take(n));
        };

        push(3, -Self::POSITION_LIMIT, Self::POSITION_LIMIT);
        push(4, -1.0, 1.0);
        push(3, -Self::LINEAR_VEL_LIMIT, Self::LINEAR_VEL_LIMIT);
        push(3, -Self::ANGULAR_VEL_LIMIT, Self::ANGULAR_VEL_LIMIT);
        push(1, 0.0, Self::ARM_HEIGHT_MAX);
        push(4, -1.0, 1.0);
        push(3, -Self::ANGULAR_VEL_LIMIT, Self::ANGULAR_VEL_LIMIT);
        push(3, -Self::LINEAR_ACC_LIMIT, Self::LINEAR_ACC_LIMIT);
        for _ in 0..num_stones {
            push(3, -Self::POSITION_LIMIT, Self::POSITION_LIMIT);
        }

        Self { low, high }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn contains(&self, obs: &Observation) -> bool {
        obs.len() == self.dim()
            && obs
                .values
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }
}
