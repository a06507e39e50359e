use thiserror::Error;

/// Failure categories for one agent cycle. All of these are contained at
/// their origin: none of them stops the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("sensor '{sensor}' read failed: {reason}")]
    SensorRead { sensor: String, reason: String },

    #[error("sensor '{sensor}' did not respond within its time budget")]
    SensorTimeout { sensor: String },

    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("implausible battery reading: {0}V")]
    InvalidBatteryReading(f32),
}
