// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON payloads of the automation topics.

use serde::{Deserialize, Serialize};

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Presence of one source, or the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// Someone is home.
    pub state: bool,
    /// Epoch milliseconds of the change.
    #[serde(default)]
    pub updated: i64,
}

impl PresencePayload {
    /// Stamps `state` with the current time.
    #[must_use]
    pub fn now(state: bool) -> Self {
        Self {
            state,
            updated: now_millis(),
        }
    }
}

/// Confirmed darkness of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarknessPayload {
    /// The room is dark.
    pub is_dark: bool,
    /// Epoch milliseconds of the change.
    #[serde(default)]
    pub updated: i64,
}

impl DarknessPayload {
    /// Stamps `is_dark` with the current time.
    #[must_use]
    pub fn now(is_dark: bool) -> Self {
        Self {
            is_dark,
            updated: now_millis(),
        }
    }
}

/// Activation request for an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatePayload {
    /// Activate (`true`) or deactivate (`false`).
    pub activate: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn darkness_wire_shape() {
        let payload = DarknessPayload {
            is_dark: true,
            updated: 1_700_000_000_000,
        };
        assert_eq!(
            serde_json::to_value(payload).unwrap(),
            json!({"is_dark": true, "updated": 1_700_000_000_000_i64})
        );
    }

    #[test]
    fn presence_without_timestamp() {
        let payload: PresencePayload = serde_json::from_str(r#"{"state":false}"#).unwrap();
        assert!(!payload.state);
        assert_eq!(payload.updated, 0);
    }

    #[test]
    fn now_is_recent() {
        assert!(PresencePayload::now(true).updated > 1_600_000_000_000);
    }
}
