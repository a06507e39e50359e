//! Inbound command decoding and dispatch. Commands are decoded once at the
//! boundary into a closed enum, then dispatched by exhaustive match, so a
//! new command type is a compile-checked change. Dispatch resolves
//! synchronously against already-known state; any publish the outcome needs
//! is deferred to the connectivity layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{config::ScheduleConfig, error::AgentError};

/// Name used when a `set_output` command omits the output field.
pub const DEFAULT_OUTPUT: &str = "relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputState {
    On,
    Off,
}

impl OutputState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Inbound instruction, tagged by `"type"` in the JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SetOutput {
        #[serde(default)]
        output: Option<String>,
        state: OutputState,
    },
    Sleep {
        #[serde(rename = "durationSeconds", default)]
        duration_seconds: Option<u64>,
    },
    Restart,
    Status,
}

impl Command {
    /// Decodes a command payload. An unknown `type` or malformed body fails
    /// here and is reported via an error acknowledgement, never silently
    /// acknowledged as processed.
    pub fn parse(payload: &[u8]) -> Result<Self, AgentError> {
        serde_json::from_slice(payload).map_err(|err| AgentError::UnknownCommand(err.to_string()))
    }
}

/// What the orchestrator must do after a dispatch. Sleep and restart only
/// take effect after the acknowledgement has been flushed.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    OutputSet { output: String, state: OutputState },
    EnterSleep { duration_secs: u64 },
    Restart,
    PublishStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub action: CommandAction,
    pub ack: String,
}

/// Tracks the named digital outputs and maps commands onto outcomes.
#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    outputs: BTreeMap<String, bool>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_state(&self, name: &str) -> Option<bool> {
        self.outputs.get(name).copied()
    }

    pub fn dispatch(&mut self, command: Command, schedule: &ScheduleConfig) -> CommandOutcome {
        match command {
            Command::SetOutput { output, state } => {
                let output = output.unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
                self.outputs.insert(output.clone(), state.is_on());
                CommandOutcome {
                    ack: format!("output '{output}' set to {}", state.as_str()),
                    action: CommandAction::OutputSet { output, state },
                }
            }
            Command::Sleep { duration_seconds } => {
                let duration_secs =
                    duration_seconds.unwrap_or(schedule.default_command_sleep_secs);
                CommandOutcome {
                    ack: format!("sleeping for {duration_secs}s"),
                    action: CommandAction::EnterSleep { duration_secs },
                }
            }
            Command::Restart => CommandOutcome {
                ack: "restarting".to_string(),
                action: CommandAction::Restart,
            },
            Command::Status => CommandOutcome {
                ack: "status requested".to_string(),
                action: CommandAction::PublishStatus,
            },
        }
    }
}
