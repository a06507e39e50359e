mod agent;
mod mqtt;
mod sampler;
mod store;

use tracing::{info, warn};

use sensornode_common::{AgentConfig, PowerState};

use crate::{agent::DeviceAgent, store::StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = config_from_env();
    let store = StateStore::new();

    let persisted = store.load_power_state().await.unwrap_or_else(|err| {
        warn!("failed to load power state from store: {err:#}");
        Default::default()
    });
    let mut power = PowerState::from_persisted(&persisted);
    power.record_boot();

    let mut agent = DeviceAgent::new(config, store, power);

    tokio::select! {
        result = agent.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, going offline");
        }
    }

    agent.shutdown().await;
    Ok(())
}

fn config_from_env() -> AgentConfig {
    let mut config = AgentConfig::default();

    if let Ok(device_id) = std::env::var("DEVICE_ID") {
        config.device_id = device_id;
    }
    if let Ok(host) = std::env::var("MQTT_HOST") {
        config.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        config.network.mqtt_user = user;
        config.network.mqtt_pass = std::env::var("MQTT_PASS").unwrap_or_default();
    }

    config.sanitize();
    config
}
