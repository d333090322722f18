// src/context.rs
//
// Process-level plumbing owned by whoever runs the control loop.
//
// Built once at start-up and handed to the episode controller; dropping it
// flushes telemetry. Transports and scenes get producer handles from
// `sensor_hub()` instead of reaching for any global state.

use std::sync::Arc;

use crate::sensors::SensorHub;
use crate::telemetry::{TelemetryConfig, TelemetrySink};
use crate::world_state::WorldStateStore;

pub struct ControlContext {
    store: Arc<WorldStateStore>,
    telemetry: TelemetrySink,
}

impl ControlContext {
    pub fn new(telemetry: TelemetrySink) -> Self {
        Self {
            store: Arc::new(WorldStateStore::new()),
            telemetry,
        }
    }

    /// Telemetry configured from SMARTLOADER_TELEMETRY_* variables.
    pub fn from_env() -> Self {
        Self::new(TelemetrySink::from_config(TelemetryConfig::from_env()))
    }

    /// No telemetry.
    pub fn quiet() -> Self {
        Self::new(TelemetrySink::disabled())
    }

    pub fn store(&self) -> &Arc<WorldStateStore> {
        &self.store
    }

    /// Fresh producer handle onto this context's store.
    pub fn sensor_hub(&self) -> SensorHub {
        SensorHub::new(Arc::clone(&self.store))
    }

    pub fn telemetry(&mut self) -> &mut TelemetrySink {
        &mut self.telemetry
    }
}
