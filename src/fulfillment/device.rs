// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud device descriptors returned by SYNC.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::device::DeviceIdentity;

/// Device type advertised to the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    /// A kettle.
    #[serde(rename = "action.devices.types.KETTLE")]
    Kettle,
    /// A mains outlet.
    #[serde(rename = "action.devices.types.OUTLET")]
    Outlet,
    /// A scene that can be activated.
    #[serde(rename = "action.devices.types.SCENE")]
    Scene,
}

/// Trait (in the assistant's sense) a device advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trait {
    /// Boolean on/off control.
    #[serde(rename = "action.devices.traits.OnOff")]
    OnOff,
    /// Scene activation.
    #[serde(rename = "action.devices.traits.Scene")]
    Scene,
    /// Start/stop control.
    #[serde(rename = "action.devices.traits.StartStop")]
    StartStop,
}

/// Names the assistant may use for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceName {
    /// Names given by the manufacturer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_names: Vec<String>,
    /// Primary name shown to the user.
    pub name: String,
    /// Additional names the user may say.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nicknames: Vec<String>,
}

/// Manufacturer metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Manufacturer name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manufacturer: String,
    /// Model identifier.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    /// Hardware version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hw_version: String,
    /// Software version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sw_version: String,
}

impl DeviceInfo {
    fn is_empty(&self) -> bool {
        self.manufacturer.is_empty()
            && self.model.is_empty()
            && self.hw_version.is_empty()
            && self.sw_version.is_empty()
    }
}

/// One device as described in a SYNC response.
///
/// # Examples
///
/// ```
/// use homehub_lib::DeviceIdentity;
/// use homehub_lib::fulfillment::{CloudDevice, DeviceType};
///
/// let id = DeviceIdentity::new("kitchen/kettle");
/// let device = CloudDevice::new(&id, DeviceType::Kettle)
///     .with_on_off_trait(false, false)
///     .with_default_name("Kettle");
///
/// let json = serde_json::to_value(&device).unwrap();
/// assert_eq!(json["id"], "kitchen/kettle");
/// assert_eq!(json["name"]["name"], "Kettle");
/// assert_eq!(json["roomHint"], "Kitchen");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDevice {
    /// Stable id, the device identity key.
    pub id: String,
    /// Device type.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Advertised traits.
    pub traits: Vec<Trait>,
    /// Names.
    pub name: DeviceName,
    /// Whether the hub reports state changes on its own.
    pub will_report_state: bool,
    /// Room the device lives in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub room_hint: String,
    /// Manufacturer metadata.
    #[serde(skip_serializing_if = "DeviceInfo::is_empty")]
    pub device_info: DeviceInfo,
    /// Trait attributes.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl CloudDevice {
    /// Creates a descriptor with name and room hint derived from the identity.
    #[must_use]
    pub fn new(identity: &DeviceIdentity, device_type: DeviceType) -> Self {
        Self {
            id: identity.to_string(),
            device_type,
            traits: Vec::new(),
            name: DeviceName {
                name: identity.display_name(),
                ..DeviceName::default()
            },
            will_report_state: false,
            room_hint: identity.room_hint(),
            device_info: DeviceInfo::default(),
            attributes: Map::new(),
        }
    }

    /// Adds the OnOff trait.
    #[must_use]
    pub fn with_on_off_trait(mut self, command_only: bool, query_only: bool) -> Self {
        self.traits.push(Trait::OnOff);
        if command_only {
            self.attributes
                .insert("commandOnlyOnOff".to_string(), Value::Bool(true));
        }
        if query_only {
            self.attributes
                .insert("queryOnlyOnOff".to_string(), Value::Bool(true));
        }
        self
    }

    /// Adds the Scene trait.
    #[must_use]
    pub fn with_scene_trait(mut self, reversible: bool) -> Self {
        self.traits.push(Trait::Scene);
        if reversible {
            self.attributes
                .insert("sceneReversible".to_string(), Value::Bool(true));
        }
        self
    }

    /// Adds a manufacturer default name.
    #[must_use]
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.name.default_names.push(name.into());
        self
    }

    /// Sets the manufacturer metadata.
    #[must_use]
    pub fn with_device_info(mut self, info: DeviceInfo) -> Self {
        self.device_info = info;
        self
    }

    /// Declares that the hub reports state on its own.
    #[must_use]
    pub fn reporting_state(mut self) -> Self {
        self.will_report_state = true;
        self
    }

    /// Returns true if the descriptor advertises the given trait.
    #[must_use]
    pub fn has_trait(&self, t: Trait) -> bool {
        self.traits.contains(&t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_protocol_shape() {
        let id = DeviceIdentity::new("living_room/zeus");
        let device = CloudDevice::new(&id, DeviceType::Scene)
            .with_scene_trait(false)
            .with_default_name("Computer");

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["type"], "action.devices.types.SCENE");
        assert_eq!(json["traits"][0], "action.devices.traits.Scene");
        assert_eq!(json["name"]["defaultNames"][0], "Computer");
        assert_eq!(json["name"]["name"], "Zeus");
        assert_eq!(json["roomHint"], "Living Room");
        assert_eq!(json["willReportState"], false);
        assert!(json.get("deviceInfo").is_none());
        assert!(json.get("attributes").is_none());
    }

    #[test]
    fn on_off_attributes() {
        let id = DeviceIdentity::new("kettle");
        let device = CloudDevice::new(&id, DeviceType::Kettle).with_on_off_trait(true, false);

        assert!(device.has_trait(Trait::OnOff));
        assert_eq!(device.attributes["commandOnlyOnOff"], Value::Bool(true));
        assert!(!device.attributes.contains_key("queryOnlyOnOff"));

        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("roomHint").is_none());
    }

    #[test]
    fn device_info_is_serialized_when_present() {
        let id = DeviceIdentity::new("kitchen/kettle");
        let device = CloudDevice::new(&id, DeviceType::Kettle).with_device_info(DeviceInfo {
            manufacturer: "Tuya".to_string(),
            model: "TS0001".to_string(),
            ..DeviceInfo::default()
        });

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["deviceInfo"]["manufacturer"], "Tuya");
        assert_eq!(json["deviceInfo"]["model"], "TS0001");
        assert!(json["deviceInfo"].get("swVersion").is_none());
    }
}
