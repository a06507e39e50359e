//! Power-state bookkeeping and the end-of-cycle sleep decision.

use serde::{Deserialize, Serialize};

use crate::config::{ScheduleConfig, ThresholdConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    Active,
    Sleeping,
}

impl PowerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sleeping => "sleeping",
        }
    }
}

/// Cross-cycle agent state. The only piece of state that survives the
/// suspension boundary, via [`PersistedPowerState`].
#[derive(Debug, Clone, PartialEq)]
pub struct PowerState {
    pub mode: PowerMode,
    pub consecutive_failures: u32,
    pub last_battery_voltage: f32,
    pub boot_count: u32,
    pub total_uptime_millis: u64,
}

impl PowerState {
    pub fn first_boot() -> Self {
        Self {
            mode: PowerMode::Active,
            consecutive_failures: 0,
            last_battery_voltage: 0.0,
            boot_count: 1,
            total_uptime_millis: 0,
        }
    }

    pub fn from_persisted(persisted: &PersistedPowerState) -> Self {
        Self {
            mode: PowerMode::Active,
            consecutive_failures: persisted.consecutive_failures,
            last_battery_voltage: persisted.last_battery_voltage,
            boot_count: persisted.boot_count,
            total_uptime_millis: persisted.total_uptime_millis,
        }
    }

    pub fn to_persisted(&self) -> PersistedPowerState {
        PersistedPowerState {
            boot_count: self.boot_count,
            last_battery_voltage: self.last_battery_voltage,
            consecutive_failures: self.consecutive_failures,
            total_uptime_millis: self.total_uptime_millis,
        }
    }

    /// Any successful publish cycle resets the counter.
    pub fn record_publish_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Failed connects and failed publishes count; the counter saturates
    /// rather than wraps.
    pub fn record_publish_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn note_battery_voltage(&mut self, voltage: Option<f32>) {
        if let Some(voltage) = voltage {
            self.last_battery_voltage = voltage;
        }
    }

    pub fn add_uptime(&mut self, elapsed_millis: u64) {
        self.total_uptime_millis = self.total_uptime_millis.saturating_add(elapsed_millis);
    }

    pub fn record_boot(&mut self) {
        self.boot_count = self.boot_count.saturating_add(1);
        self.mode = PowerMode::Active;
    }
}

/// The fixed-size record persisted across sleep/restart boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPowerState {
    #[serde(rename = "bootCount")]
    pub boot_count: u32,
    #[serde(rename = "lastBatteryVoltage")]
    pub last_battery_voltage: f32,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
    #[serde(rename = "totalUptimeMillis")]
    pub total_uptime_millis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerDecision {
    pub mode: PowerMode,
    pub sleep_duration_secs: u64,
}

/// Decides the post-cycle sleep duration. Rules, in order:
///
/// 1. An implausible voltage (at or below the plausible minimum) or a
///    missing battery reading disables battery-driven scheduling.
/// 2. Below the critical threshold: emergency sleep, bypassing normal
///    scheduling.
/// 3. Below the low threshold: extended interval.
/// 4. More than one consecutive failure doubles whichever interval was
///    chosen above.
pub fn decide_next_state(
    power: &PowerState,
    battery_voltage: Option<f32>,
    schedule: &ScheduleConfig,
    thresholds: &ThresholdConfig,
) -> PowerDecision {
    let plausible = battery_voltage.and_then(|v| thresholds.check_battery(v).ok());

    let base = match plausible {
        Some(voltage) if voltage < thresholds.battery_critical_v => {
            schedule.emergency_interval_secs
        }
        Some(voltage) if voltage < thresholds.battery_low_v => {
            schedule.low_battery_interval_secs
        }
        _ => schedule.normal_interval_secs,
    };

    let sleep_duration_secs = if power.consecutive_failures > 1 {
        base.saturating_mul(2)
    } else {
        base
    };

    PowerDecision {
        mode: PowerMode::Sleeping,
        sleep_duration_secs,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn decide(battery_voltage: Option<f32>, consecutive_failures: u32) -> PowerDecision {
        let power = PowerState {
            consecutive_failures,
            ..PowerState::first_boot()
        };
        decide_next_state(
            &power,
            battery_voltage,
            &ScheduleConfig::default(),
            &ThresholdConfig::default(),
        )
    }

    #[test]
    fn healthy_battery_selects_normal_interval() {
        // End-to-end scenario: 3.7V, zero failures.
        let decision = decide(Some(3.7), 0);
        assert_eq!(decision.mode, PowerMode::Sleeping);
        assert_eq!(decision.sleep_duration_secs, 300);
    }

    #[test]
    fn low_battery_selects_extended_interval() {
        // End-to-end scenario: 3.3V, zero failures.
        let decision = decide(Some(3.3), 0);
        assert_eq!(decision.sleep_duration_secs, 900);
    }

    #[test]
    fn critical_battery_selects_emergency_interval() {
        assert_eq!(decide(Some(3.0), 0).sleep_duration_secs, 3_600);
        assert_eq!(decide(Some(3.19), 0).sleep_duration_secs, 3_600);
    }

    #[test]
    fn emergency_interval_doubles_with_prior_failures() {
        // End-to-end scenario: 3.0V with more than one consecutive failure.
        let decision = decide(Some(3.0), 2);
        assert_eq!(decision.mode, PowerMode::Sleeping);
        assert_eq!(decision.sleep_duration_secs, 7_200);
    }

    #[test]
    fn implausible_voltage_falls_back_to_normal_interval() {
        assert_eq!(decide(Some(2.0), 0).sleep_duration_secs, 300);
        assert_eq!(decide(Some(0.0), 0).sleep_duration_secs, 300);
        assert_eq!(decide(None, 0).sleep_duration_secs, 300);
    }

    #[test]
    fn one_failure_does_not_double() {
        assert_eq!(decide(Some(3.7), 1).sleep_duration_secs, 300);
        assert_eq!(decide(Some(3.3), 1).sleep_duration_secs, 900);
    }

    #[test]
    fn doubling_applies_to_every_band() {
        assert_eq!(decide(Some(3.7), 2).sleep_duration_secs, 600);
        assert_eq!(decide(Some(3.3), 3).sleep_duration_secs, 1_800);
        assert_eq!(decide(Some(2.1), 5).sleep_duration_secs, 7_200);
        assert_eq!(decide(None, 2).sleep_duration_secs, 600);
    }

    #[test]
    fn failure_counter_saturates_and_resets() {
        let mut power = PowerState::first_boot();

        power.record_publish_failure();
        assert_eq!(power.consecutive_failures, 1);

        power.consecutive_failures = u32::MAX;
        power.record_publish_failure();
        assert_eq!(power.consecutive_failures, u32::MAX);

        power.record_publish_success();
        assert_eq!(power.consecutive_failures, 0);
    }

    #[test]
    fn persisted_round_trip_keeps_cross_cycle_fields() {
        let mut power = PowerState::first_boot();
        power.record_publish_failure();
        power.note_battery_voltage(Some(3.55));
        power.add_uptime(12_345);
        power.record_boot();

        let restored = PowerState::from_persisted(&power.to_persisted());
        assert_eq!(restored, power);
    }

    #[test]
    fn persisted_state_serializes_camel_case() {
        let persisted = PersistedPowerState {
            boot_count: 7,
            last_battery_voltage: 3.62,
            consecutive_failures: 1,
            total_uptime_millis: 90_000,
        };

        let json = serde_json::to_value(&persisted).unwrap();
        assert_eq!(json["bootCount"], 7);
        assert_eq!(json["consecutiveFailures"], 1);
        assert_eq!(json["totalUptimeMillis"], 90_000);
    }
}
