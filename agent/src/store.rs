//! Durable home for the one record that must survive the suspension
//! boundary. Everything else is recomputed every cycle.

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use sensornode_common::PersistedPowerState;

#[derive(Clone)]
pub struct StateStore {
    power_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl StateStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("AGENT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.sensornode"));
        Self::with_dir(data_dir)
    }

    pub fn with_dir(data_dir: PathBuf) -> Self {
        Self {
            power_path: Arc::new(data_dir.join("power.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_power_state(&self) -> anyhow::Result<PersistedPowerState> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.power_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<PersistedPowerState>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(PersistedPowerState::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_power_state(&self, state: &PersistedPowerState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.power_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_power_state() {
        let dir = std::env::temp_dir().join(format!("sensornode-store-{}", std::process::id()));
        let store = StateStore::with_dir(dir.clone());

        let missing = store.load_power_state().await.unwrap();
        assert_eq!(missing, PersistedPowerState::default());

        let state = PersistedPowerState {
            boot_count: 3,
            last_battery_voltage: 3.41,
            consecutive_failures: 2,
            total_uptime_millis: 42_000,
        };
        store.save_power_state(&state).await.unwrap();

        let loaded = store.load_power_state().await.unwrap();
        assert_eq!(loaded, state);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
