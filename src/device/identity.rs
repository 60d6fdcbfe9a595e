// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device identity type.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Separator between the room and the name segments of an identity.
pub const SEPARATOR: char = '/';

/// Stable key identifying one controllable device.
///
/// The key is opaque for lookups and cloud ids, but by convention it is
/// structured as `room/name`. A key without separator has no room and
/// the whole key is the name.
///
/// # Examples
///
/// ```
/// use homehub_lib::DeviceIdentity;
///
/// let id = DeviceIdentity::new("living_room/zeus");
/// assert_eq!(id.room(), "living_room");
/// assert_eq!(id.name(), "zeus");
/// assert_eq!(id.room_hint(), "Living Room");
///
/// let bare = DeviceIdentity::new("kettle");
/// assert_eq!(bare.room(), "");
/// assert_eq!(bare.name(), "kettle");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(Arc<str>);

impl DeviceIdentity {
    /// Creates an identity from its key.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Returns the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the room segment, or an empty string if the key has none.
    #[must_use]
    pub fn room(&self) -> &str {
        match self.0.split_once(SEPARATOR) {
            Some((room, _)) => room,
            None => "",
        }
    }

    /// Returns the name segment, or the whole key if it has no room.
    #[must_use]
    pub fn name(&self) -> &str {
        let mut segments = self.0.split(SEPARATOR);
        let first = segments.next().unwrap_or_default();
        segments.next().unwrap_or(first)
    }

    /// Room formatted for display: underscores become spaces, words are
    /// capitalised.
    #[must_use]
    pub fn room_hint(&self) -> String {
        title_case(self.room())
    }

    /// Name formatted for display.
    #[must_use]
    pub fn display_name(&self) -> String {
        title_case(self.name())
    }
}

fn title_case(segment: &str) -> String {
    segment
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceIdentity({})", self.0)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for DeviceIdentity {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DeviceIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_room_and_name() {
        let id = DeviceIdentity::new("kitchen/kettle");
        assert_eq!(id.room(), "kitchen");
        assert_eq!(id.name(), "kettle");
    }

    #[test]
    fn key_without_separator_is_the_name() {
        let id = DeviceIdentity::new("hallway_light");
        assert_eq!(id.room(), "");
        assert_eq!(id.name(), "hallway_light");
        assert_eq!(id.room_hint(), "");
    }

    #[test]
    fn extra_segments_are_ignored_for_name() {
        let id = DeviceIdentity::new("bedroom/lamp/left");
        assert_eq!(id.room(), "bedroom");
        assert_eq!(id.name(), "lamp");
    }

    #[test]
    fn display_formatting() {
        let id = DeviceIdentity::new("living_room/mixer");
        assert_eq!(id.room_hint(), "Living Room");
        assert_eq!(id.display_name(), "Mixer");
        assert_eq!(id.to_string(), "living_room/mixer");
    }

    #[test]
    fn debug_format() {
        let id = DeviceIdentity::new("kitchen/kettle");
        assert_eq!(format!("{id:?}"), "DeviceIdentity(kitchen/kettle)");
    }

    #[test]
    fn hashable() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(DeviceIdentity::new("a/b"));
        assert!(set.contains(&DeviceIdentity::from("a/b")));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = DeviceIdentity::new("kitchen/kettle");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"kitchen/kettle\"");
        let back: DeviceIdentity = serde_json::from_str("\"kitchen/kettle\"").unwrap();
        assert_eq!(back, id);
    }
}
