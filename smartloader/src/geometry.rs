// src/geometry.rs
//
// Planar scene geometry: boundary boxes, distances, implement reference
// point, and quaternion helpers.

use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Distance from vehicle centre to the blade, in scene units.
pub const BLADE_OFFSET: f64 = 0.75;

/// Axis-aligned planar box `[x_min, x_max] x [y_min, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Square box of half-width `margin` around the planar part of `point`.
    pub fn around(point: Vector2<f64>, margin: f64) -> Self {
        Self {
            x_min: point.x - margin,
            x_max: point.x + margin,
            y_min: point.y - margin,
            y_max: point.y + margin,
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Inclusive on the edges.
    pub fn contains(&self, point: Vector2<f64>) -> bool {
        point.x >= self.x_min && point.x <= self.x_max && point.y >= self.y_min && point.y <= self.y_max
    }

    /// Union of many boxes; `None` for an empty iterator.
    pub fn union_all<I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        boxes.into_iter().reduce(|acc, b| acc.union(&b))
    }
}

#[inline]
pub fn planar(v: &Vector3<f64>) -> Vector2<f64> {
    Vector2::new(v.x, v.y)
}

#[inline]
pub fn squared_planar_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (planar(a) - planar(b)).norm_squared()
}

#[inline]
pub fn planar_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    squared_planar_distance(a, b).sqrt()
}

/// Rotation vector (axis * angle, radians) of an orientation quaternion.
pub fn rotation_vector(q: &Quaternion<f64>) -> Vector3<f64> {
    UnitQuaternion::from_quaternion(*q).scaled_axis()
}

/// Blade reference point: vehicle position pushed `BLADE_OFFSET` along the
/// orientation's rotation vector.
pub fn blade_pose(vehicle_pos: &Vector3<f64>, vehicle_orien: &Quaternion<f64>) -> Vector3<f64> {
    vehicle_pos + rotation_vector(vehicle_orien) * BLADE_OFFSET
}

/// Roll, pitch, yaw in degrees from an (x, y, z, w) quaternion.
/// Pitch is clamped at ±90° when the input is slightly non-unit.
pub fn quat_to_euler_deg(q: &Quaternion<f64>) -> (f64, f64, f64) {
    let (x, y, z, w) = (q.i, q.j, q.k, q.w);

    let t0 = 2.0 * (w * x + y * z);
    let t1 = 1.0 - 2.0 * (x * x + y * y);
    let roll = t0.atan2(t1).to_degrees();

    let t2 = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
    let pitch = t2.asin().to_degrees();

    let t3 = 2.0 * (w * z + x * y);
    let t4 = 1.0 - 2.0 * (y * y + z * z);
    let yaw = t3.atan2(t4).to_degrees();

    (roll, pitch, yaw)
}
