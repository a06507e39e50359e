use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Numeric boundaries that convert raw readings into alerts, and the
/// battery bands that drive sleep scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub battery_low_v: f32,
    pub battery_critical_v: f32,
    /// Readings at or below this are treated as a bad/disconnected battery
    /// sensor, not a real voltage.
    pub battery_plausible_min_v: f32,
    pub temp_high_c: f32,
    pub temp_low_c: f32,
    pub humidity_high_pct: f32,
    pub soil_moisture_low_pct: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            battery_low_v: 3.4,
            battery_critical_v: 3.2,
            battery_plausible_min_v: 2.0,
            temp_high_c: 35.0,
            temp_low_c: 5.0,
            humidity_high_pct: 80.0,
            soil_moisture_low_pct: 20.0,
        }
    }
}

impl ThresholdConfig {
    /// Rejects voltages at or below the plausible minimum. Callers skip
    /// battery-driven behavior for the cycle on the error path; the raw
    /// value still lands in telemetry unmodified.
    pub fn check_battery(&self, voltage: f32) -> Result<f32, AgentError> {
        if voltage <= self.battery_plausible_min_v {
            Err(AgentError::InvalidBatteryReading(voltage))
        } else {
            Ok(voltage)
        }
    }

    pub fn sanitize(&mut self) {
        if self.battery_critical_v > self.battery_low_v {
            self.battery_critical_v = self.battery_low_v;
        }
        if self.battery_plausible_min_v >= self.battery_critical_v {
            self.battery_plausible_min_v = 2.0;
        }
        if self.temp_low_c > self.temp_high_c {
            self.temp_low_c = self.temp_high_c;
        }
        self.humidity_high_pct = self.humidity_high_pct.clamp(0.0, 100.0);
        self.soil_moisture_low_pct = self.soil_moisture_low_pct.clamp(0.0, 100.0);
    }
}

/// Duty-cycle intervals and the bounded time budgets for sensor and broker
/// operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub normal_interval_secs: u64,
    pub low_battery_interval_secs: u64,
    pub emergency_interval_secs: u64,
    pub default_command_sleep_secs: u64,
    pub sensor_read_timeout_ms: u64,
    pub reconnect_backoff_secs: u64,
    pub mqtt_op_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            normal_interval_secs: 300,
            low_battery_interval_secs: 900,
            emergency_interval_secs: 3_600,
            default_command_sleep_secs: 60,
            sensor_read_timeout_ms: 2_000,
            reconnect_backoff_secs: 5,
            mqtt_op_timeout_secs: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn sanitize(&mut self) {
        if self.normal_interval_secs == 0 {
            self.normal_interval_secs = 300;
        }
        if self.low_battery_interval_secs < self.normal_interval_secs {
            self.low_battery_interval_secs = self.normal_interval_secs;
        }
        if self.emergency_interval_secs < self.low_battery_interval_secs {
            self.emergency_interval_secs = self.low_battery_interval_secs;
        }
        if self.default_command_sleep_secs == 0 {
            self.default_command_sleep_secs = 60;
        }
        self.sensor_read_timeout_ms = self.sensor_read_timeout_ms.clamp(100, 30_000);
        self.reconnect_backoff_secs = self.reconnect_backoff_secs.clamp(1, 300);
        self.mqtt_op_timeout_secs = self.mqtt_op_timeout_secs.clamp(1, 60);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

/// Everything the agent consumes at construction. The core never reads
/// configuration from ambient global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub device_id: String,
    pub firmware_version: String,
    pub thresholds: ThresholdConfig,
    pub schedule: ScheduleConfig,
    pub network: NetworkConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: "sensornode-01".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            thresholds: ThresholdConfig::default(),
            schedule: ScheduleConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn sanitize(&mut self) {
        if self.device_id.trim().is_empty() {
            self.device_id = "sensornode-01".to_string();
        }
        self.thresholds.sanitize();
        self.schedule.sanitize();
    }
}
