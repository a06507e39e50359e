//! Snapshot assembly: folding per-sensor read results into one immutable
//! record. The I/O half (drivers, timeouts) lives in the agent binary.

use std::collections::BTreeMap;

use crate::{
    error::AgentError,
    types::{SensorReading, TelemetrySnapshot},
};

// Reading names as published by the node. The evaluator keys off these.
pub const SENSOR_AIR_TEMP: &str = "air_temp_dht";
pub const SENSOR_AIR_HUMIDITY: &str = "air_humidity_dht";
pub const SENSOR_SOIL_MOISTURE: &str = "soil_moisture_percent";
pub const SENSOR_MOTION: &str = "motion";

impl TelemetrySnapshot {
    /// Builds a snapshot from named read results. A failed read is recorded
    /// as a `status: error` reading for that name; it never aborts assembly.
    pub fn from_samples(
        device_id: impl Into<String>,
        captured_at_millis: u64,
        samples: Vec<(String, Result<f32, AgentError>)>,
        battery_voltage: Option<f32>,
        signal_strength_dbm: Option<i32>,
        free_memory_bytes: Option<u64>,
    ) -> Self {
        let mut readings = BTreeMap::new();
        for (name, result) in samples {
            let reading = match result {
                Ok(value) => SensorReading::ok(value),
                Err(_) => SensorReading::error(),
            };
            readings.insert(name, reading);
        }

        Self {
            captured_at_millis,
            device_id: device_id.into(),
            readings,
            battery_voltage,
            signal_strength_dbm,
            free_memory_bytes,
        }
    }
}
