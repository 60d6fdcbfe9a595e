// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request side of the fulfillment protocol.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::ErrorCode;
use crate::error::ParseError;

/// Intent name for SYNC.
pub const INTENT_SYNC: &str = "action.devices.SYNC";
/// Intent name for QUERY.
pub const INTENT_QUERY: &str = "action.devices.QUERY";
/// Intent name for EXECUTE.
pub const INTENT_EXECUTE: &str = "action.devices.EXECUTE";

/// Command name for OnOff.
pub const COMMAND_ON_OFF: &str = "action.devices.commands.OnOff";
/// Command name for ActivateScene.
pub const COMMAND_ACTIVATE_SCENE: &str = "action.devices.commands.ActivateScene";
/// Command name for StartStop.
pub const COMMAND_START_STOP: &str = "action.devices.commands.StartStop";

/// Raw request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRequest {
    /// Correlation id echoed in the response.
    pub request_id: String,
    /// Request inputs, exactly one is supported.
    #[serde(default)]
    pub inputs: Vec<RawInput>,
}

/// One input before its payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    /// Intent name.
    pub intent: String,
    /// Intent-specific payload.
    #[serde(default)]
    pub payload: Value,
}

/// A decoded intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// List every cloud-visible device.
    Sync,
    /// Report the state of the given devices.
    Query(QueryPayload),
    /// Run commands on devices.
    Execute(ExecutePayload),
}

/// Why an input could not be decoded.
#[derive(Debug, Error)]
pub enum IntentError {
    /// The intent name is not one of the three supported intents.
    #[error("unknown intent {0}")]
    Unknown(String),
    /// The payload does not match the intent.
    #[error("invalid payload: {0}")]
    Payload(ParseError),
}

impl RawInput {
    /// Interprets the payload according to the intent name.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError`] for unknown intents or mismatched payloads.
    pub fn decode(&self) -> Result<Intent, IntentError> {
        fn payload<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, IntentError> {
            serde_json::from_value(value.clone())
                .map_err(|e| IntentError::Payload(ParseError::Json(e)))
        }

        match self.intent.as_str() {
            INTENT_SYNC => Ok(Intent::Sync),
            INTENT_QUERY => payload(&self.payload).map(Intent::Query),
            INTENT_EXECUTE => payload(&self.payload).map(Intent::Execute),
            other => Err(IntentError::Unknown(other.to_string())),
        }
    }
}

/// Reference to a device inside a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceHandle {
    /// Device id as returned by SYNC.
    pub id: String,
}

/// QUERY payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryPayload {
    /// Devices to report.
    #[serde(default)]
    pub devices: Vec<DeviceHandle>,
}

/// EXECUTE payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutePayload {
    /// Commands to run.
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// A set of executions applied to a set of devices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    /// Target devices.
    #[serde(default)]
    pub devices: Vec<DeviceHandle>,
    /// Executions, applied in order.
    #[serde(default)]
    pub execution: Vec<Execution>,
}

/// One command name with its parameters, as sent by the assistant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Execution {
    /// Command name.
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub params: Value,
}

/// A command the hub knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudCommand {
    /// Switch on or off.
    OnOff {
        /// Target state.
        on: bool,
    },
    /// Activate or deactivate a scene.
    ActivateScene {
        /// True to deactivate.
        deactivate: bool,
    },
    /// Start or stop.
    StartStop {
        /// True to start.
        start: bool,
    },
}

#[derive(Deserialize)]
struct OnOffParams {
    on: bool,
}

#[derive(Deserialize)]
struct ActivateSceneParams {
    #[serde(default)]
    deactivate: bool,
}

#[derive(Deserialize)]
struct StartStopParams {
    start: bool,
}

impl Execution {
    /// Creates an execution from a command name and parameters.
    #[must_use]
    pub fn new(command: impl Into<String>, params: Value) -> Self {
        Self {
            command: command.into(),
            params,
        }
    }

    /// Interprets the command.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ActionNotAvailable`] for unknown command names and
    /// [`ErrorCode::ProtocolError`] for parameters that do not fit the command.
    pub fn parse(&self) -> Result<CloudCommand, ErrorCode> {
        fn params<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, ErrorCode> {
            // Commands without parameters arrive with `params` absent.
            let value = if value.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                value.clone()
            };
            serde_json::from_value(value).map_err(|_| ErrorCode::ProtocolError)
        }

        match self.command.as_str() {
            COMMAND_ON_OFF => {
                params::<OnOffParams>(&self.params).map(|p| CloudCommand::OnOff { on: p.on })
            }
            COMMAND_ACTIVATE_SCENE => params::<ActivateSceneParams>(&self.params)
                .map(|p| CloudCommand::ActivateScene {
                    deactivate: p.deactivate,
                }),
            COMMAND_START_STOP => {
                params::<StartStopParams>(&self.params)
                    .map(|p| CloudCommand::StartStop { start: p.start })
            }
            _ => Err(ErrorCode::ActionNotAvailable),
        }
    }
}
