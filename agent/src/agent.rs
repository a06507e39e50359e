//! The device agent orchestrator. One cycle runs to completion before the
//! next begins: ensure connectivity, sample, evaluate, publish, drain and
//! dispatch queued commands, then decide how long to sleep.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use sensornode_common::{
    alert_topic, decide_next_state, evaluate, response_topic, status_topic, telemetry_topic,
    AgentConfig, AgentError, Alert, Command, CommandAction, CommandDispatcher, OnlineStatus,
    PowerDecision, PowerState, ResponsePayload, StatusPayload, TelemetrySnapshot,
};

use crate::{
    mqtt::{ConnectionState, Connectivity},
    sampler::{self, Sampler},
    store::StateStore,
};

enum CycleEnd {
    Scheduled(PowerDecision),
    CommandSleep(u64),
    Restart,
}

pub struct DeviceAgent {
    config: AgentConfig,
    store: StateStore,
    power: PowerState,
    dispatcher: CommandDispatcher,
    sampler: Sampler,
    connectivity: Connectivity,
    last_battery: Option<f32>,
}

impl DeviceAgent {
    pub fn new(config: AgentConfig, store: StateStore, power: PowerState) -> Self {
        let sampler = Sampler::new(sampler::simulated_sources(), &config.schedule);
        let connectivity = Connectivity::connect(&config);

        Self {
            config,
            store,
            power,
            dispatcher: CommandDispatcher::new(),
            sampler,
            connectivity,
            last_battery: None,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!(
            device = %self.config.device_id,
            boot = self.power.boot_count,
            "agent started"
        );

        loop {
            let started = Instant::now();
            let end = self.run_cycle().await;

            let elapsed = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
            self.power.add_uptime(elapsed);
            self.persist().await;

            match end {
                CycleEnd::Restart => self.restart().await,
                CycleEnd::CommandSleep(duration_secs) => self.suspend(duration_secs).await,
                CycleEnd::Scheduled(decision) => {
                    self.suspend(decision.sleep_duration_secs).await
                }
            }
        }
    }

    /// Persists state and announces a clean offline. Used on operator
    /// shutdown; an ungraceful exit is covered by the last will instead.
    pub async fn shutdown(&mut self) {
        self.persist().await;
        self.connectivity
            .go_offline(&self.config.firmware_version, self.last_battery)
            .await;
    }

    async fn run_cycle(&mut self) -> CycleEnd {
        let wait = Duration::from_secs(self.config.schedule.mqtt_op_timeout_secs);
        let connection = self.connectivity.ensure_connected(wait).await;

        // One increment per cycle, whether the connect or a publish failed.
        let mut cycle_failed = connection != ConnectionState::Connected;
        if cycle_failed {
            warn!("broker not reachable this cycle");
        }

        let samples = self.sampler.sample().await;
        let board = sampler::simulated_board();
        let snapshot = TelemetrySnapshot::from_samples(
            self.config.device_id.clone(),
            sampler::now_millis(),
            samples,
            board.battery_voltage,
            board.signal_strength_dbm,
            board.free_memory_bytes,
        );
        self.power.note_battery_voltage(snapshot.battery_voltage);
        self.last_battery = snapshot.battery_voltage;

        if let Some(Err(err)) = snapshot
            .battery_voltage
            .map(|voltage| self.config.thresholds.check_battery(voltage))
        {
            warn!("{err}; battery-driven scheduling disabled this cycle");
        }

        // Alerts, then telemetry, then status; all belong to this cycle and
        // never interleave with another.
        for alert in evaluate(&snapshot, &self.config.thresholds) {
            if let Err(err) = self.publish_alert(&alert).await {
                warn!("alert publish failed: {err}");
                cycle_failed = true;
            }
        }

        if let Err(err) = self.publish_telemetry(&snapshot).await {
            warn!("telemetry publish failed: {err}");
            cycle_failed = true;
        }

        if let Err(err) = self.publish_status().await {
            warn!("status publish failed: {err}");
            cycle_failed = true;
        }

        let command_end = self.drain_and_dispatch().await;

        if cycle_failed {
            self.power.record_publish_failure();
        } else {
            self.power.record_publish_success();
        }

        if let Some(end) = command_end {
            return end;
        }

        CycleEnd::Scheduled(decide_next_state(
            &self.power,
            snapshot.battery_voltage,
            &self.config.schedule,
            &self.config.thresholds,
        ))
    }

    /// Drains the commands queued since the last cycle. A sleep or restart
    /// command short-circuits the remainder of the cycle once its
    /// acknowledgement is flushed.
    async fn drain_and_dispatch(&mut self) -> Option<CycleEnd> {
        for payload in self.connectivity.drain_commands() {
            let command = match Command::parse(&payload) {
                Ok(command) => command,
                Err(err) => {
                    // Malformed commands never touch the failure counter.
                    warn!("rejected inbound command: {err}");
                    self.publish_response(&format!("error: {err}")).await;
                    continue;
                }
            };

            let outcome = self.dispatcher.dispatch(command, &self.config.schedule);
            self.publish_response(&outcome.ack).await;

            match outcome.action {
                CommandAction::OutputSet { output, state } => {
                    // GPIO write lands here on the ESP target.
                    info!(output = %output, state = state.as_str(), "output set");
                }
                CommandAction::PublishStatus => {
                    if let Err(err) = self.publish_status().await {
                        warn!("requested status publish failed: {err}");
                    }
                }
                CommandAction::EnterSleep { duration_secs } => {
                    return Some(CycleEnd::CommandSleep(duration_secs));
                }
                CommandAction::Restart => {
                    return Some(CycleEnd::Restart);
                }
            }
        }
        None
    }

    async fn publish_alert(&self, alert: &Alert) -> Result<(), AgentError> {
        let topic = alert_topic(&self.config.device_id, alert.kind.category());
        let body = serde_json::to_vec(alert).map_err(|err| AgentError::Publish {
            topic: topic.clone(),
            reason: err.to_string(),
        })?;
        self.connectivity.publish(&topic, body, false).await
    }

    async fn publish_telemetry(&self, snapshot: &TelemetrySnapshot) -> Result<(), AgentError> {
        let topic = telemetry_topic(&self.config.device_id);
        let body = serde_json::to_vec(snapshot).map_err(|err| AgentError::Publish {
            topic: topic.clone(),
            reason: err.to_string(),
        })?;
        self.connectivity.publish(&topic, body, false).await
    }

    async fn publish_status(&self) -> Result<(), AgentError> {
        let topic = status_topic(&self.config.device_id);
        let payload = StatusPayload {
            status: OnlineStatus::Online,
            firmware_version: self.config.firmware_version.clone(),
            // The network interface supplies this on the ESP target.
            ip_address: None,
            battery_voltage: self.last_battery,
            timestamp: Utc::now(),
        };
        let body = serde_json::to_vec(&payload).map_err(|err| AgentError::Publish {
            topic: topic.clone(),
            reason: err.to_string(),
        })?;

        // Remembered so a reconnect republishes the retained record.
        self.connectivity.remember_status(body.clone()).await;
        self.connectivity.publish(&topic, body, true).await
    }

    async fn publish_response(&self, message: &str) {
        let payload = ResponsePayload {
            timestamp: Utc::now(),
            device_id: self.config.device_id.clone(),
            message: message.to_string(),
        };
        match serde_json::to_vec(&payload) {
            Ok(body) => {
                let topic = response_topic(&self.config.device_id);
                if let Err(err) = self.connectivity.publish(&topic, body, false).await {
                    warn!("command acknowledgement publish failed: {err}");
                }
            }
            Err(err) => warn!("command acknowledgement serialization failed: {err}"),
        }
    }

    /// Deep-sleep stand-in on the host: the connection is dropped, only the
    /// persisted record survives, and everything else is rebuilt on wake.
    async fn suspend(&mut self, duration_secs: u64) {
        info!(
            secs = duration_secs,
            failures = self.power.consecutive_failures,
            "entering sleep"
        );
        self.connectivity
            .go_offline(&self.config.firmware_version, self.last_battery)
            .await;
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
        self.wake();
        info!(boot = self.power.boot_count, "woke from sleep");
    }

    async fn restart(&mut self) {
        self.connectivity
            .go_offline(&self.config.firmware_version, self.last_battery)
            .await;
        self.wake();
        info!(boot = self.power.boot_count, "restarted by command");
    }

    fn wake(&mut self) {
        self.power.record_boot();
        self.dispatcher = CommandDispatcher::new();
        self.connectivity = Connectivity::connect(&self.config);
    }

    async fn persist(&self) {
        if let Err(err) = self.store.save_power_state(&self.power.to_persisted()).await {
            warn!("failed to persist power state: {err:#}");
        }
    }
}
