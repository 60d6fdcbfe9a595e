// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic names used by the hub.

/// Aggregated presence (retained).
pub const PRESENCE: &str = "automation/presence";

/// Filter matching every presence source.
pub const PRESENCE_SOURCES: &str = "automation/presence/+";

/// Filter matching every darkness topic.
pub const DARKNESS_ALL: &str = "automation/darkness/+";

/// Filter matching every appliance activation topic.
pub const APPLIANCE_ALL: &str = "automation/appliance/#";

const APPLIANCE_PREFIX: &str = "automation/appliance/";

/// Presence of one source (retained, empty payload removes the source).
#[must_use]
pub fn presence_source(source: &str) -> String {
    format!("{PRESENCE}/{source}")
}

/// Darkness of one room (retained).
#[must_use]
pub fn darkness(room: &str) -> String {
    format!("automation/darkness/{room}")
}

/// Activation requests for one appliance.
#[must_use]
pub fn appliance(identity: &str) -> String {
    format!("{APPLIANCE_PREFIX}{identity}")
}

/// Extracts the appliance identity from an activation topic.
#[must_use]
pub fn appliance_identity(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(APPLIANCE_PREFIX)
        .filter(|identity| !identity.is_empty())
}

/// Zigbee bridge device list (retained snapshot).
#[must_use]
pub fn zigbee_devices(prefix: &str) -> String {
    format!("{prefix}/bridge/devices")
}

/// State topic of a zigbee device.
#[must_use]
pub fn zigbee_state(prefix: &str, friendly_name: &str) -> String {
    format!("{prefix}/{friendly_name}")
}

/// Command topic of a zigbee device.
#[must_use]
pub fn zigbee_set(prefix: &str, friendly_name: &str) -> String {
    format!("{prefix}/{friendly_name}/set")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_topics() {
        assert_eq!(presence_source("phone"), "automation/presence/phone");
        assert_eq!(darkness("living_room"), "automation/darkness/living_room");
        assert_eq!(zigbee_devices("zigbee2mqtt"), "zigbee2mqtt/bridge/devices");
        assert_eq!(
            zigbee_set("zigbee2mqtt", "kitchen/kettle"),
            "zigbee2mqtt/kitchen/kettle/set"
        );
    }

    #[test]
    fn appliance_identity_round_trip() {
        let topic = appliance("study/computer");
        assert_eq!(appliance_identity(&topic), Some("study/computer"));
        assert_eq!(appliance_identity("automation/appliance/"), None);
        assert_eq!(appliance_identity("automation/presence/x"), None);
    }
}
