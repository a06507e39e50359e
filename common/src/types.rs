use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Ok,
    Error,
}

impl ReadingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// One named sensor value. A reading with `status: error` still carries the
/// raw value for diagnostics, but consumers must not trust it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: f32,
    pub status: ReadingStatus,
}

impl SensorReading {
    pub fn ok(value: f32) -> Self {
        Self {
            value,
            status: ReadingStatus::Ok,
        }
    }

    pub fn error() -> Self {
        Self {
            value: 0.0,
            status: ReadingStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReadingStatus::Ok
    }
}

/// Immutable snapshot of everything the node knows about itself, created
/// once per sampling cycle and published on the telemetry topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(rename = "capturedAtMillis")]
    pub captured_at_millis: u64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub readings: BTreeMap<String, SensorReading>,
    #[serde(rename = "batteryVoltage")]
    pub battery_voltage: Option<f32>,
    #[serde(rename = "signalStrengthDbm")]
    pub signal_strength_dbm: Option<i32>,
    #[serde(rename = "freeMemoryBytes")]
    pub free_memory_bytes: Option<u64>,
}

impl TelemetrySnapshot {
    /// Returns the value of a named reading only when its status is `ok`.
    pub fn valid_reading(&self, name: &str) -> Option<f32> {
        self.readings
            .get(name)
            .filter(|reading| reading.is_ok())
            .map(|reading| reading.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl OnlineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Retained status record. A late-joining observer always sees the last
/// known state; the broker publishes the `offline` variant as a last will
/// if the connection drops ungracefully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: OnlineStatus,
    #[serde(rename = "firmwareVersion")]
    pub firmware_version: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: Option<String>,
    #[serde(rename = "batteryVoltage")]
    pub battery_voltage: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement of a processed command, published on the response topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub message: String,
}
