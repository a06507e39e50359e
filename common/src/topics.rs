//! MQTT topic layout. Every topic embeds the device id, so these are
//! builders rather than constants.

/// Telemetry snapshot, JSON body, not retained.
pub fn telemetry_topic(device_id: &str) -> String {
    format!("sensors/{device_id}/data")
}

/// Retained status record; also the last-will topic.
pub fn status_topic(device_id: &str) -> String {
    format!("{device_id}/status")
}

/// One message per alert, grouped by category, not retained.
pub fn alert_topic(device_id: &str, category: &str) -> String {
    format!("alerts/{device_id}/{category}")
}

/// Inbound command JSON, subscribed by the agent.
pub fn command_topic(device_id: &str) -> String {
    format!("{device_id}/command")
}

/// Acknowledgement of a processed command.
pub fn response_topic(device_id: &str) -> String {
    format!("{device_id}/response")
}
