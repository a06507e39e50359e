//! Connectivity manager. Sole owner of the broker connection: everything
//! else hands payloads here. Registers a last-will offline status at connect
//! time so the broker announces an ungraceful drop, and on every
//! (re)connection resubscribes to the command topic and republishes the last
//! known status retained.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, Outgoing, QoS};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use sensornode_common::{
    command_topic, status_topic, AgentConfig, AgentError, OnlineStatus, StatusPayload,
};

const MAX_COMMAND_PAYLOAD_BYTES: usize = 512;
const COMMAND_QUEUE_DEPTH: usize = 64;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct Connectivity {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    command_rx: mpsc::Receiver<Vec<u8>>,
    last_status: Arc<Mutex<Option<Vec<u8>>>>,
    shutdown_tx: watch::Sender<bool>,
    event_task: JoinHandle<()>,
    device_id: String,
    op_timeout: Duration,
}

impl Connectivity {
    /// Starts the connection lifecycle. The connection itself is driven by
    /// the spawned event task; construction never blocks on the network.
    pub fn connect(config: &AgentConfig) -> Self {
        let device_id = config.device_id.clone();

        let mut options = MqttOptions::new(
            format!("{device_id}-agent"),
            config.network.mqtt_host.clone(),
            config.network.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if !config.network.mqtt_user.is_empty() {
            options.set_credentials(
                config.network.mqtt_user.clone(),
                config.network.mqtt_pass.clone(),
            );
        }

        let will = StatusPayload {
            status: OnlineStatus::Offline,
            firmware_version: config.firmware_version.clone(),
            ip_address: None,
            battery_voltage: None,
            timestamp: Utc::now(),
        };
        let will_payload = serde_json::to_vec(&will)
            .unwrap_or_else(|_| br#"{"status":"offline"}"#.to_vec());
        options.set_last_will(LastWill::new(
            status_topic(&device_id),
            will_payload,
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let last_status = Arc::new(Mutex::new(None));

        let event_task = tokio::spawn(run_event_loop(
            client.clone(),
            eventloop,
            state_tx,
            command_tx,
            Arc::clone(&last_status),
            shutdown_rx,
            device_id.clone(),
            Duration::from_secs(config.schedule.reconnect_backoff_secs),
        ));

        Self {
            client,
            state_rx,
            command_rx,
            last_status,
            shutdown_tx,
            event_task,
            device_id,
            op_timeout: Duration::from_secs(config.schedule.mqtt_op_timeout_secs),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Waits a bounded time for the event task to reach `Connected`. The
    /// event task keeps retrying regardless of the outcome here.
    pub async fn ensure_connected(&mut self, wait: Duration) -> ConnectionState {
        if self.state() == ConnectionState::Connected {
            return ConnectionState::Connected;
        }
        let connected = matches!(
            tokio::time::timeout(
                wait,
                self.state_rx
                    .wait_for(|state| *state == ConnectionState::Connected),
            )
            .await,
            Ok(Ok(_))
        );
        if connected {
            ConnectionState::Connected
        } else {
            self.state()
        }
    }

    /// Bounded publish: fails fast when disconnected and never blocks past
    /// the operation timeout.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), AgentError> {
        if self.state() != ConnectionState::Connected {
            return Err(AgentError::Connection("not connected".to_string()));
        }

        let send = self.client.publish(topic, QoS::AtLeastOnce, retain, payload);
        match tokio::time::timeout(self.op_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: "timed out".to_string(),
            }),
        }
    }

    /// Remembers the last status body so the event task can republish it
    /// retained after a reconnect.
    pub async fn remember_status(&self, payload: Vec<u8>) {
        *self.last_status.lock().await = Some(payload);
    }

    /// Returns the commands queued since the last drain. Called at exactly
    /// one point in the cycle so command handling never interleaves with
    /// telemetry publication.
    pub fn drain_commands(&mut self) -> Vec<Vec<u8>> {
        let mut queued = Vec::new();
        while let Ok(payload) = self.command_rx.try_recv() {
            queued.push(payload);
        }
        queued
    }

    /// Clean teardown: retained offline status, disconnect, and stop the
    /// event task so nothing holds or re-opens the connection during a
    /// suspension. The remembered status is replaced with the offline body
    /// first, so a reconnect racing the teardown can only republish
    /// `offline`.
    pub async fn go_offline(&self, firmware_version: &str, battery_voltage: Option<f32>) {
        let payload = StatusPayload {
            status: OnlineStatus::Offline,
            firmware_version: firmware_version.to_string(),
            ip_address: None,
            battery_voltage,
            timestamp: Utc::now(),
        };
        match serde_json::to_vec(&payload) {
            Ok(body) => {
                *self.last_status.lock().await = Some(body.clone());
                if let Err(err) = self
                    .publish(&status_topic(&self.device_id), body, true)
                    .await
                {
                    warn!("offline status publish failed: {err}");
                }
            }
            Err(err) => warn!("offline status serialization failed: {err}"),
        }
        if let Err(err) = self.client.disconnect().await {
            warn!("mqtt disconnect failed: {err}");
        }
        let _ = self.shutdown_tx.send(true);
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.event_task.is_finished()
    }
}

impl Drop for Connectivity {
    fn drop(&mut self) {
        // Backstop for paths that replace the connection without a clean
        // teardown: the event task must never outlive its owner.
        let _ = self.shutdown_tx.send(true);
        self.event_task.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    command_tx: mpsc::Sender<Vec<u8>>,
    last_status: Arc<Mutex<Option<Vec<u8>>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    device_id: String,
    backoff: Duration,
) {
    let commands = command_topic(&device_id);
    let status = status_topic(&device_id);

    loop {
        let event = tokio::select! {
            _ = shutdown_rx.changed() => {
                flush_until_disconnect(&mut eventloop).await;
                break;
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("mqtt connected");
                let _ = state_tx.send(ConnectionState::Connected);

                if let Err(err) = client.subscribe(&commands, QoS::AtLeastOnce).await {
                    warn!("command topic subscribe failed: {err}");
                }

                let retained = last_status.lock().await.clone();
                if let Some(body) = retained {
                    if let Err(err) = client.publish(&status, QoS::AtLeastOnce, true, body).await {
                        warn!("status republish failed: {err}");
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(message))) => {
                if message.topic != commands {
                    continue;
                }
                if message.payload.len() > MAX_COMMAND_PAYLOAD_BYTES {
                    warn!(
                        "dropping oversized command payload ({} bytes)",
                        message.payload.len()
                    );
                    continue;
                }
                if command_tx.try_send(message.payload.to_vec()).is_err() {
                    warn!("command queue full, dropping command");
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                let _ = state_tx.send(ConnectionState::Disconnected);
            }
            Ok(_) => {}
            Err(err) => {
                warn!("mqtt poll error: {err}");
                let _ = state_tx.send(ConnectionState::Disconnected);
                // The backoff must not delay a shutdown request.
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                let _ = state_tx.send(ConnectionState::Connecting);
            }
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    info!("mqtt event loop stopped");
}

/// Drives the event loop just long enough to push out the queued offline
/// status and the disconnect packet, then gives up after a short deadline.
async fn flush_until_disconnect(eventloop: &mut rumqttc::EventLoop) {
    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
        warn!("mqtt flush timed out before disconnect completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sensornode_common::ScheduleConfig;

    // Port 1 refuses immediately, so the event task cycles through the
    // error arm instead of holding a connection.
    fn unreachable_config() -> AgentConfig {
        let mut config = AgentConfig {
            device_id: "test-node".to_string(),
            schedule: ScheduleConfig {
                reconnect_backoff_secs: 1,
                mqtt_op_timeout_secs: 1,
                ..ScheduleConfig::default()
            },
            ..AgentConfig::default()
        };
        config.network.mqtt_host = "127.0.0.1".to_string();
        config.network.mqtt_port = 1;
        config
    }

    async fn wait_for_stop(connectivity: &Connectivity) -> bool {
        for _ in 0..50 {
            if connectivity.is_stopped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn go_offline_stops_event_task() {
        let connectivity = Connectivity::connect(&unreachable_config());

        connectivity.go_offline("0.1.0", Some(3.8)).await;

        assert!(wait_for_stop(&connectivity).await);
        assert_eq!(connectivity.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn go_offline_replaces_remembered_status_with_offline() {
        let connectivity = Connectivity::connect(&unreachable_config());
        connectivity
            .remember_status(br#"{"status":"online"}"#.to_vec())
            .await;

        connectivity.go_offline("0.1.0", None).await;

        let remembered = connectivity.last_status.lock().await.clone().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&remembered).unwrap();
        assert_eq!(body["status"], "offline");
    }
}
