pub mod alert;
pub mod command;
pub mod config;
pub mod error;
pub mod power;
pub mod telemetry;
pub mod topics;
pub mod types;

pub use alert::{evaluate, Alert, AlertKind, Severity};
pub use command::{
    Command, CommandAction, CommandDispatcher, CommandOutcome, OutputState, DEFAULT_OUTPUT,
};
pub use config::{AgentConfig, NetworkConfig, ScheduleConfig, ThresholdConfig};
pub use error::AgentError;
pub use power::{
    decide_next_state, PersistedPowerState, PowerDecision, PowerMode, PowerState,
};
pub use telemetry::{
    SENSOR_AIR_HUMIDITY, SENSOR_AIR_TEMP, SENSOR_MOTION, SENSOR_SOIL_MOISTURE,
};
pub use topics::*;
pub use types::{
    OnlineStatus, ReadingStatus, ResponsePayload, SensorReading, StatusPayload, TelemetrySnapshot,
};
