// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state snapshots and outcome codes.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Result status of a device in a QUERY or EXECUTE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The request succeeded.
    Success,
    /// The device is unreachable.
    Offline,
    /// The request succeeded with exceptions.
    Exceptions,
    /// The request failed, see the error code.
    Error,
}

/// Protocol error codes a device can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// The command is not implemented by the device.
    ActionNotAvailable,
    /// The command parameters could not be understood.
    ProtocolError,
    /// The device reported a failure that may go away on retry.
    TransientError,
}

impl ErrorCode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActionNotAvailable => "actionNotAvailable",
            Self::ProtocolError => "protocolError",
            Self::TransientError => "transientError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State snapshot of one device.
///
/// Serializes as a flat object: `online`, optional `status`, then every
/// recorded trait field.
///
/// # Examples
///
/// ```
/// use homehub_lib::fulfillment::{CloudState, Status};
///
/// let state = CloudState::new(true).with_status(Status::Success).record_on_off(true);
/// let json = serde_json::to_value(&state).unwrap();
/// assert_eq!(json, serde_json::json!({"online": true, "status": "SUCCESS", "on": true}));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CloudState {
    /// Whether the device is reachable.
    pub online: bool,
    /// Optional status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl CloudState {
    /// Creates an empty state with the given online flag.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online,
            status: None,
            fields: Map::new(),
        }
    }

    /// Online state with `SUCCESS`, or offline state with `OFFLINE`.
    #[must_use]
    pub fn reachable(online: bool) -> Self {
        let status = if online { Status::Success } else { Status::Offline };
        Self::new(online).with_status(status)
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Records the OnOff trait state.
    #[must_use]
    pub fn record_on_off(mut self, on: bool) -> Self {
        self.fields.insert("on".to_string(), Value::Bool(on));
        self
    }

    /// Records the StartStop trait state.
    #[must_use]
    pub fn record_start_stop(mut self, running: bool) -> Self {
        self.fields
            .insert("isRunning".to_string(), Value::Bool(running));
        self
    }

    /// Returns a recorded trait field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns true if no trait field was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies every trait field of `other` into this state.
    pub fn merge(&mut self, other: &CloudState) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Outcome of one execution on one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutcome {
    /// Whether the device answered within this call.
    pub online: bool,
    /// Protocol error, if the command failed.
    pub error: Option<ErrorCode>,
    /// State after the command, merged into the success group.
    pub state: CloudState,
}

impl ExecuteOutcome {
    /// The command was applied and produced `state`.
    #[must_use]
    pub fn success(state: CloudState) -> Self {
        Self {
            online: true,
            error: None,
            state,
        }
    }

    /// The device did not answer within this call.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            online: false,
            error: None,
            state: CloudState::new(false),
        }
    }

    /// The command failed with `code`; `online` is the device's last known
    /// connectivity.
    #[must_use]
    pub fn failed(code: ErrorCode, online: bool) -> Self {
        Self {
            online,
            error: Some(code),
            state: CloudState::new(online),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_value(Status::Success).unwrap(), "SUCCESS");
        assert_eq!(serde_json::to_value(Status::Offline).unwrap(), "OFFLINE");
        assert_eq!(serde_json::to_value(Status::Exceptions).unwrap(), "EXCEPTIONS");
        assert_eq!(serde_json::to_value(Status::Error).unwrap(), "ERROR");
    }

    #[test]
    fn error_code_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorCode::ActionNotAvailable).unwrap(),
            ErrorCode::ActionNotAvailable.as_str()
        );
        assert_eq!(ErrorCode::TransientError.to_string(), "transientError");
    }

    #[test]
    fn reachable_sets_status() {
        assert_eq!(CloudState::reachable(true).status, Some(Status::Success));
        let offline = CloudState::reachable(false);
        assert!(!offline.online);
        assert_eq!(offline.status, Some(Status::Offline));
    }

    #[test]
    fn status_is_omitted_when_unset() {
        let json = serde_json::to_value(CloudState::new(false)).unwrap();
        assert_eq!(json, serde_json::json!({"online": false}));
    }

    #[test]
    fn merge_overwrites_fields() {
        let mut merged = CloudState::new(true).record_on_off(false);
        merged.merge(&CloudState::new(true).record_on_off(true).record_start_stop(true));

        assert_eq!(merged.field("on"), Some(&Value::Bool(true)));
        assert_eq!(merged.field("isRunning"), Some(&Value::Bool(true)));
    }
}
