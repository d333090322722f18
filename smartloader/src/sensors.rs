// src/sensors.rs
//
// Typed ingestion callbacks. A transport (or the in-process scene) decodes
// its wire messages into these structs and calls the matching `on_*`
// method; the hub splits each message into store signals.
//
// Callbacks only write. They never block on the control loop.

use std::sync::Arc;

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::world_state::{SignalKey, SignalValue, WorldStateStore};

/// Canonical channel names used by the rig.
pub mod topics {
    pub const VEHICLE_POSE: &str = "mavros/local_position/pose";
    pub const VEHICLE_VELOCITY: &str = "mavros/local_position/velocity";
    pub const VEHICLE_IMU: &str = "mavros/imu/data";
    pub const ARM_HEIGHT: &str = "arm/height";
    pub const BLADE_IMU: &str = "arm/blade/Imu";
    /// Actuator command output.
    pub const JOY: &str = "joy";

    pub fn stone_pose(id: usize) -> String {
        format!("stone/{id}/Pose")
    }

    pub fn stone_is_loaded(id: usize) -> String {
        format!("stone/{id}/IsLoaded")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub position: Vector3<f64>,
    pub orientation: Quaternion<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwistStamped {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Imu {
    pub orientation: Quaternion<f64>,
    pub angular_velocity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
}

/// Cheap to clone; every producer thread gets its own handle.
#[derive(Debug, Clone)]
pub struct SensorHub {
    store: Arc<WorldStateStore>,
}

impl SensorHub {
    pub fn new(store: Arc<WorldStateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WorldStateStore> {
        &self.store
    }

    pub fn on_vehicle_pose(&self, msg: &PoseStamped) {
        self.store
            .ingest(SignalKey::VehiclePos, SignalValue::Vector(msg.position));
        self.store
            .ingest(SignalKey::VehicleOrien, SignalValue::Orientation(msg.orientation));
    }

    pub fn on_vehicle_velocity(&self, msg: &TwistStamped) {
        self.store
            .ingest(SignalKey::VehicleLinearVel, SignalValue::Vector(msg.linear));
        self.store
            .ingest(SignalKey::VehicleAngularVel, SignalValue::Vector(msg.angular));
    }

    pub fn on_vehicle_imu(&self, msg: &Imu) {
        self.store
            .ingest(SignalKey::VehicleOrienImu, SignalValue::Orientation(msg.orientation));
        self.store.ingest(
            SignalKey::VehicleAngularVelImu,
            SignalValue::Vector(msg.angular_velocity),
        );
        self.store.ingest(
            SignalKey::VehicleLinearAccImu,
            SignalValue::Vector(msg.linear_acceleration),
        );
    }

    /// The rig reports arm height as an integer.
    pub fn on_arm_height(&self, height: i32) {
        self.store
            .ingest(SignalKey::ArmHeight, SignalValue::Scalar(f64::from(height)));
    }

    pub fn on_blade_imu(&self, msg: &Imu) {
        self.store
            .ingest(SignalKey::BladeOrien, SignalValue::Orientation(msg.orientation));
        self.store
            .ingest(SignalKey::BladeAngularVel, SignalValue::Vector(msg.angular_velocity));
        self.store.ingest(
            SignalKey::BladeLinearAcc,
            SignalValue::Vector(msg.linear_acceleration),
        );
    }

    pub fn on_stone_pose(&self, id: usize, msg: &PoseStamped) {
        self.store
            .ingest(SignalKey::StonePos(id), SignalValue::Vector(msg.position));
    }

    pub fn on_stone_is_loaded(&self, id: usize, loaded: bool) {
        self.store
            .ingest(SignalKey::StoneIsLoaded(id), SignalValue::Flag(loaded));
    }
}
