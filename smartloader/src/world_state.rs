// src/world_state.rs
//
// Latest-value store for asynchronously arriving sensor signals.
//
// Producers (one per sensor channel) call `ingest` from their own threads;
// the control loop is the only reader. Every write bumps a generation
// counter and wakes waiters, so readers block on a condition variable
// instead of polling:
//
// - `snapshot(required, deadline)` waits until every required key has been
//   written since the last `clear()`, then returns a copy.
// - `wait_for_update(after, deadline)` waits until any write lands after a
//   known generation.
//
// With `deadline == None` both waits are unbounded. That is the intended
// liveness contract; embedders that need a watchdog pass a deadline and get
// `EnvError::Timeout` instead.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use nalgebra::{Quaternion, Vector3};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// Identity of a tracked signal. Stone ids are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalKey {
    VehiclePos,
    VehicleOrien,
    VehicleLinearVel,
    VehicleAngularVel,
    VehicleOrienImu,
    VehicleAngularVelImu,
    VehicleLinearAccImu,
    ArmHeight,
    BladeOrien,
    BladeAngularVel,
    BladeLinearAcc,
    StonePos(usize),
    StoneIsLoaded(usize),
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKey::StonePos(id) => write!(f, "StonePos{id}"),
            SignalKey::StoneIsLoaded(id) => write!(f, "StoneIsLoaded{id}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Typed signal payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalValue {
    Vector(Vector3<f64>),
    /// Orientation quaternion (nalgebra stores `w` separately from `i, j, k`).
    Orientation(Quaternion<f64>),
    Scalar(f64),
    Flag(bool),
}

impl SignalValue {
    /// Flat components in observation order. Quaternions flatten as (x, y, z, w).
    pub fn components(&self) -> Vec<f64> {
        match self {
            SignalValue::Vector(v) => vec![v.x, v.y, v.z],
            SignalValue::Orientation(q) => vec![q.i, q.j, q.k, q.w],
            SignalValue::Scalar(s) => vec![*s],
            SignalValue::Flag(b) => vec![if *b { 1.0 } else { 0.0 }],
        }
    }
}

/// One stored value plus its arrival metadata.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub value: SignalValue,
    pub received_at: Instant,
    /// Store generation at which this value was written.
    pub seq: u64,
}

/// Per-object view extracted from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoneState {
    pub id: usize,
    pub position: Vector3<f64>,
    /// Loaded flag as last reported by the rig, if ever reported.
    pub is_loaded: Option<bool>,
}

/// Immutable copy of the store at one instant.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    samples: HashMap<SignalKey, Sample>,
    generation: u64,
}

impl WorldState {
    /// Build a snapshot directly from values (tests, replay).
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (SignalKey, SignalValue)>,
    {
        let now = Instant::now();
        let mut samples = HashMap::new();
        let mut generation = 0;
        for (key, value) in values {
            generation += 1;
            samples.insert(
                key,
                Sample {
                    value,
                    received_at: now,
                    seq: generation,
                },
            );
        }
        Self {
            samples,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn contains(&self, key: SignalKey) -> bool {
        self.samples.contains_key(&key)
    }

    pub fn contains_all(&self, keys: &[SignalKey]) -> bool {
        keys.iter().all(|k| self.samples.contains_key(k))
    }

    pub fn get(&self, key: SignalKey) -> Option<&Sample> {
        self.samples.get(&key)
    }

    pub fn value(&self, key: SignalKey) -> Result<SignalValue> {
        self.samples
            .get(&key)
            .map(|s| s.value)
            .ok_or(EnvError::MissingSignal(key))
    }

    pub fn vector(&self, key: SignalKey) -> Result<Vector3<f64>> {
        match self.value(key)? {
            SignalValue::Vector(v) => Ok(v),
            _ => Err(EnvError::MissingSignal(key)),
        }
    }

    pub fn orientation(&self, key: SignalKey) -> Result<Quaternion<f64>> {
        match self.value(key)? {
            SignalValue::Orientation(q) => Ok(q),
            _ => Err(EnvError::MissingSignal(key)),
        }
    }

    pub fn scalar(&self, key: SignalKey) -> Result<f64> {
        match self.value(key)? {
            SignalValue::Scalar(s) => Ok(s),
            _ => Err(EnvError::MissingSignal(key)),
        }
    }

    /// Boolean flags are optional by nature; absent reads as `None`.
    pub fn flag(&self, key: SignalKey) -> Option<bool> {
        match self.samples.get(&key)?.value {
            SignalValue::Flag(b) => Some(b),
            _ => None,
        }
    }

    pub fn stone(&self, id: usize) -> Result<StoneState> {
        Ok(StoneState {
            id,
            position: self.vector(SignalKey::StonePos(id))?,
            is_loaded: self.flag(SignalKey::StoneIsLoaded(id)),
        })
    }

    /// All stones `1..=num_stones`, in id order.
    pub fn stones(&self, num_stones: usize) -> Result<Vec<StoneState>> {
        (1..=num_stones).map(|id| self.stone(id)).collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    samples: HashMap<SignalKey, Sample>,
    generation: u64,
    /// Number of `clear()` calls; lets callers tell resets apart.
    epoch: u64,
}

impl Inner {
    fn first_missing(&self, required: &[SignalKey]) -> Option<SignalKey> {
        required
            .iter()
            .copied()
            .find(|k| !self.samples.contains_key(k))
    }

    fn to_world_state(&self) -> WorldState {
        WorldState {
            samples: self.samples.clone(),
            generation: self.generation,
        }
    }
}

/// Shared store. Wrap in `Arc` and hand clones to producers.
#[derive(Debug, Default)]
pub struct WorldStateStore {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl WorldStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest value for `key` (last write wins) and wake readers.
    pub fn ingest(&self, key: SignalKey, value: SignalValue) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let seq = inner.generation;
        inner.samples.insert(
            key,
            Sample {
                value,
                received_at: Instant::now(),
                seq,
            },
        );
        drop(inner);
        self.changed.notify_all();
    }

    /// Drop every stored value. Called at episode reset.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.generation += 1;
        inner.epoch += 1;
        drop(inner);
        self.changed.notify_all();
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Non-blocking copy of whatever is currently stored.
    pub fn current(&self) -> WorldState {
        self.inner.lock().to_world_state()
    }

    /// Block until every key in `required` is present, then copy.
    pub fn snapshot(&self, required: &[SignalKey], deadline: Option<Duration>) -> Result<WorldState> {
        self.wait_until_ready(deadline, |inner| {
            inner.first_missing(required).map(|k| format!("signal {k}"))
        })
    }

    /// Block until a write lands after generation `after`. Returns the new generation.
    pub fn wait_for_update(&self, after: u64, deadline: Option<Duration>) -> Result<u64> {
        let start = Instant::now();
        let mut inner = self.inner.lock();
        while inner.generation <= after {
            match deadline {
                None => self.changed.wait(&mut inner),
                Some(limit) => {
                    let until = start + limit;
                    if Instant::now() >= until {
                        return Err(EnvError::Timeout {
                            what: "a new sensor sample".to_string(),
                            waited: start.elapsed(),
                        });
                    }
                    self.changed.wait_until(&mut inner, until);
                }
            }
        }
        Ok(inner.generation)
    }

    fn wait_until_ready<F>(&self, deadline: Option<Duration>, pending: F) -> Result<WorldState>
    where
        F: Fn(&Inner) -> Option<String>,
    {
        let start = Instant::now();
        let mut inner = self.inner.lock();
        loop {
            let Some(what) = pending(&inner) else {
                return Ok(inner.to_world_state());
            };
            match deadline {
                None => self.changed.wait(&mut inner),
                Some(limit) => {
                    let until = start + limit;
                    if Instant::now() >= until {
                        return Err(EnvError::Timeout {
                            what,
                            waited: start.elapsed(),
                        });
                    }
                    self.changed.wait_until(&mut inner, until);
                }
            }
        }
    }
}
