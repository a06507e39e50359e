//! Threshold evaluation: snapshot in, alerts out. Pure so it is testable
//! without a broker.

use serde::{Deserialize, Serialize};

use crate::{
    config::ThresholdConfig,
    telemetry::{SENSOR_AIR_HUMIDITY, SENSOR_AIR_TEMP, SENSOR_MOTION, SENSOR_SOIL_MOISTURE},
    types::TelemetrySnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowBattery,
    CriticalBattery,
    HighTemperature,
    LowTemperature,
    HighHumidity,
    LowSoilMoisture,
    MotionDetected,
}

impl AlertKind {
    /// Topic category segment for `alerts/{deviceId}/{category}`.
    pub fn category(self) -> &'static str {
        match self {
            Self::LowBattery | Self::CriticalBattery => "battery",
            Self::HighTemperature | Self::LowTemperature => "temperature",
            Self::HighHumidity => "humidity",
            Self::LowSoilMoisture => "soil_moisture",
            Self::MotionDetected => "motion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Value object produced from one snapshot: constructed, serialized,
/// published, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub value: Option<f32>,
    pub threshold: Option<f32>,
    pub message: String,
}

/// Evaluates a snapshot against the configured thresholds. Order is fixed
/// (battery, temperature, humidity, soil moisture, motion) so the output is
/// stable. Error readings are skipped; an implausible battery voltage skips
/// the battery checks entirely.
pub fn evaluate(snapshot: &TelemetrySnapshot, thresholds: &ThresholdConfig) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(Ok(voltage)) = snapshot
        .battery_voltage
        .map(|voltage| thresholds.check_battery(voltage))
    {
        if voltage < thresholds.battery_critical_v {
            alerts.push(Alert {
                kind: AlertKind::CriticalBattery,
                severity: Severity::Critical,
                value: Some(voltage),
                threshold: Some(thresholds.battery_critical_v),
                message: format!("battery critically low: {voltage:.2}V"),
            });
        } else if voltage < thresholds.battery_low_v {
            alerts.push(Alert {
                kind: AlertKind::LowBattery,
                severity: Severity::Warning,
                value: Some(voltage),
                threshold: Some(thresholds.battery_low_v),
                message: format!("battery low: {voltage:.2}V"),
            });
        }
    }

    if let Some(temp) = snapshot.valid_reading(SENSOR_AIR_TEMP) {
        if temp > thresholds.temp_high_c {
            alerts.push(Alert {
                kind: AlertKind::HighTemperature,
                severity: Severity::Warning,
                value: Some(temp),
                threshold: Some(thresholds.temp_high_c),
                message: format!("temperature high: {temp:.1}C"),
            });
        } else if temp < thresholds.temp_low_c {
            alerts.push(Alert {
                kind: AlertKind::LowTemperature,
                severity: Severity::Warning,
                value: Some(temp),
                threshold: Some(thresholds.temp_low_c),
                message: format!("temperature low: {temp:.1}C"),
            });
        }
    }

    if let Some(humidity) = snapshot.valid_reading(SENSOR_AIR_HUMIDITY) {
        if humidity > thresholds.humidity_high_pct {
            alerts.push(Alert {
                kind: AlertKind::HighHumidity,
                severity: Severity::Warning,
                value: Some(humidity),
                threshold: Some(thresholds.humidity_high_pct),
                message: format!("humidity high: {humidity:.1}%"),
            });
        }
    }

    if let Some(moisture) = snapshot.valid_reading(SENSOR_SOIL_MOISTURE) {
        if moisture < thresholds.soil_moisture_low_pct {
            alerts.push(Alert {
                kind: AlertKind::LowSoilMoisture,
                severity: Severity::Warning,
                value: Some(moisture),
                threshold: Some(thresholds.soil_moisture_low_pct),
                message: format!("soil moisture low: {moisture:.1}%"),
            });
        }
    }

    if let Some(motion) = snapshot.valid_reading(SENSOR_MOTION) {
        if motion > 0.5 {
            alerts.push(Alert {
                kind: AlertKind::MotionDetected,
                severity: Severity::Info,
                value: Some(motion),
                threshold: None,
                message: "motion detected".to_string(),
            });
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::AgentError;

    fn snapshot(
        samples: Vec<(&str, Result<f32, AgentError>)>,
        battery_voltage: Option<f32>,
    ) -> TelemetrySnapshot {
        TelemetrySnapshot::from_samples(
            "node-1",
            0,
            samples
                .into_iter()
                .map(|(name, result)| (name.to_string(), result))
                .collect(),
            battery_voltage,
            None,
            None,
        )
    }

    #[test]
    fn nominal_snapshot_produces_no_alerts() {
        let snapshot = snapshot(
            vec![
                (SENSOR_AIR_TEMP, Ok(22.0)),
                (SENSOR_AIR_HUMIDITY, Ok(50.0)),
                (SENSOR_SOIL_MOISTURE, Ok(45.0)),
            ],
            Some(3.9),
        );

        assert_eq!(evaluate(&snapshot, &ThresholdConfig::default()), vec![]);
    }

    #[test]
    fn high_temperature_only_yields_one_warning() {
        // End-to-end scenario: 36.0C air temp with everything else nominal.
        let snapshot = snapshot(
            vec![
                (SENSOR_AIR_TEMP, Ok(36.0)),
                (SENSOR_AIR_HUMIDITY, Ok(50.0)),
                (SENSOR_SOIL_MOISTURE, Ok(50.0)),
            ],
            None,
        );

        let alerts = evaluate(&snapshot, &ThresholdConfig::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighTemperature);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].value, Some(36.0));
        assert_eq!(alerts[0].threshold, Some(35.0));
    }

    #[test]
    fn error_reading_never_alerts() {
        // A failed temperature read carries value 0.0, which would look
        // like a low-temperature condition if trusted.
        let snapshot = snapshot(
            vec![(
                SENSOR_AIR_TEMP,
                Err(AgentError::SensorRead {
                    sensor: SENSOR_AIR_TEMP.to_string(),
                    reason: "checksum mismatch".to_string(),
                }),
            )],
            None,
        );

        assert_eq!(evaluate(&snapshot, &ThresholdConfig::default()), vec![]);
    }

    #[test]
    fn implausible_battery_voltage_skips_battery_checks() {
        let snapshot = snapshot(vec![], Some(1.4));
        assert_eq!(evaluate(&snapshot, &ThresholdConfig::default()), vec![]);
    }

    #[test]
    fn critical_battery_takes_precedence_over_low() {
        let snapshot = snapshot(vec![], Some(3.1));
        let alerts = evaluate(&snapshot, &ThresholdConfig::default());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CriticalBattery);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn multiple_alerts_fire_in_deterministic_order() {
        let snapshot = snapshot(
            vec![
                (SENSOR_AIR_TEMP, Ok(40.0)),
                (SENSOR_AIR_HUMIDITY, Ok(90.0)),
                (SENSOR_SOIL_MOISTURE, Ok(10.0)),
                (SENSOR_MOTION, Ok(1.0)),
            ],
            Some(3.3),
        );

        let kinds: Vec<AlertKind> = evaluate(&snapshot, &ThresholdConfig::default())
            .into_iter()
            .map(|alert| alert.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                AlertKind::LowBattery,
                AlertKind::HighTemperature,
                AlertKind::HighHumidity,
                AlertKind::LowSoilMoisture,
                AlertKind::MotionDetected,
            ]
        );
    }

    #[test]
    fn alert_kind_serializes_snake_case() {
        let alert = Alert {
            kind: AlertKind::HighTemperature,
            severity: Severity::Warning,
            value: Some(36.0),
            threshold: Some(35.0),
            message: "temperature high: 36.0C".to_string(),
        };

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "high_temperature");
        assert_eq!(json["severity"], "warning");
    }
}
