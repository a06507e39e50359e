//! Telemetry sampler: named async read sources with a bounded time budget
//! per sensor. A non-responding sensor becomes an error reading after the
//! timeout, never an infinite stall.

use std::{future::Future, pin::Pin, time::Duration};

use sensornode_common::{
    AgentError, ScheduleConfig, SENSOR_AIR_HUMIDITY, SENSOR_AIR_TEMP, SENSOR_MOTION,
    SENSOR_SOIL_MOISTURE,
};

type ReadFuture = Pin<Box<dyn Future<Output = Result<f32, AgentError>> + Send>>;

pub struct SensorSource {
    name: String,
    read: Box<dyn Fn() -> ReadFuture + Send + Sync>,
}

impl SensorSource {
    pub fn new(
        name: impl Into<String>,
        read: impl Fn() -> ReadFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            read: Box::new(read),
        }
    }

    /// Wraps a synchronous read capability, for drivers that resolve
    /// immediately.
    pub fn from_fn(
        name: impl Into<String>,
        read: impl Fn() -> Result<f32, AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move || {
            let result = read();
            Box::pin(async move { result })
        })
    }
}

/// Board-level readings that ride along with the sensor map.
#[derive(Debug, Clone, Copy)]
pub struct BoardReadings {
    pub battery_voltage: Option<f32>,
    pub signal_strength_dbm: Option<i32>,
    pub free_memory_bytes: Option<u64>,
}

pub struct Sampler {
    sources: Vec<SensorSource>,
    read_timeout: Duration,
}

impl Sampler {
    pub fn new(sources: Vec<SensorSource>, schedule: &ScheduleConfig) -> Self {
        Self {
            sources,
            read_timeout: Duration::from_millis(schedule.sensor_read_timeout_ms),
        }
    }

    /// Reads every source in order. A failed or timed-out read is recorded
    /// against that sensor's name; it never aborts the rest of the sweep.
    pub async fn sample(&self) -> Vec<(String, Result<f32, AgentError>)> {
        let mut samples = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let result = match tokio::time::timeout(self.read_timeout, (source.read)()).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::SensorTimeout {
                    sensor: source.name.clone(),
                }),
            };
            samples.push((source.name.clone(), result));
        }
        samples
    }
}

/// Hardware integration point:
/// replace these simulated readings with DHT22 + capacitive soil probe +
/// PIR drivers on the ESP target.
pub fn simulated_sources() -> Vec<SensorSource> {
    vec![
        SensorSource::from_fn(SENSOR_AIR_TEMP, || Ok(21.0 + sim_phase(8) * 0.2)),
        SensorSource::from_fn(SENSOR_AIR_HUMIDITY, || Ok(52.0 + sim_phase(6) * 0.5)),
        SensorSource::from_fn(SENSOR_SOIL_MOISTURE, || Ok(40.0 + sim_phase(10))),
        SensorSource::from_fn(SENSOR_MOTION, || Ok(0.0)),
    ]
}

/// Simulated board readings. `AGENT_BATTERY_VOLTS` overrides the battery
/// voltage so the sleep bands can be exercised against a live broker.
pub fn simulated_board() -> BoardReadings {
    let battery_voltage = std::env::var("AGENT_BATTERY_VOLTS")
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .or(Some(3.82));

    BoardReadings {
        battery_voltage,
        signal_strength_dbm: Some(-62),
        free_memory_bytes: Some(148_000),
    }
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn sim_phase(modulus: u64) -> f32 {
    (now_millis() / 30_000 % modulus) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schedule(timeout_ms: u64) -> ScheduleConfig {
        ScheduleConfig {
            sensor_read_timeout_ms: timeout_ms,
            ..ScheduleConfig::default()
        }
    }

    #[tokio::test]
    async fn stalled_sensor_times_out_without_aborting_sweep() {
        let sources = vec![
            SensorSource::new("stuck", || {
                Box::pin(std::future::pending::<Result<f32, AgentError>>())
            }),
            SensorSource::from_fn("fine", || Ok(12.5)),
        ];
        let sampler = Sampler::new(sources, &test_schedule(100));

        let samples = sampler.sample().await;

        assert_eq!(samples.len(), 2);
        assert!(matches!(
            samples[0].1,
            Err(AgentError::SensorTimeout { .. })
        ));
        assert_eq!(samples[1].0, "fine");
        assert_eq!(samples[1].1.as_ref().ok(), Some(&12.5));
    }

    #[tokio::test]
    async fn failed_read_is_reported_per_sensor() {
        let sources = vec![SensorSource::from_fn("flaky", || {
            Err(AgentError::SensorRead {
                sensor: "flaky".to_string(),
                reason: "checksum mismatch".to_string(),
            })
        })];
        let sampler = Sampler::new(sources, &test_schedule(1_000));

        let samples = sampler.sample().await;
        assert!(matches!(samples[0].1, Err(AgentError::SensorRead { .. })));
    }
}
