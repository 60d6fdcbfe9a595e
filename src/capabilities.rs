// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability names and capability sets.
//!
//! Devices do not belong to a class hierarchy. Each device answers probes
//! for the capabilities it implements (see [`Device`]), and everything else
//! in the hub acts only on what the probes return. [`Capabilities`] is the
//! summary of those probes, used for filtering and logging.

use std::fmt;

use crate::device::Device;

/// A named contract a device may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Readable and settable on/off state.
    Toggleable,
    /// Fire-and-forget activation without readable state.
    Activatable,
    /// Exposed to the voice assistant.
    CloudSyncable,
    /// Tracks whether the device is reachable.
    ConnectivityAware,
}

impl Capability {
    /// All capabilities, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Toggleable,
        Self::Activatable,
        Self::CloudSyncable,
        Self::ConnectivityAware,
    ];

    /// Returns the lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Toggleable => "toggleable",
            Self::Activatable => "activatable",
            Self::CloudSyncable => "cloud-syncable",
            Self::ConnectivityAware => "connectivity-aware",
        }
    }

    /// Probes `device` for this capability.
    #[must_use]
    pub fn is_supported_by(self, device: &dyn Device) -> bool {
        match self {
            Self::Toggleable => device.as_toggleable().is_some(),
            Self::Activatable => device.as_activatable().is_some(),
            Self::CloudSyncable => device.as_cloud_syncable().is_some(),
            Self::ConnectivityAware => device.as_connectivity_aware().is_some(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of capabilities a device implements.
///
/// # Examples
///
/// ```
/// use homehub_lib::{Capabilities, Capability};
///
/// let caps = Capabilities {
///     toggleable: true,
///     cloud_syncable: true,
///     ..Capabilities::default()
/// };
/// assert!(caps.supports(Capability::Toggleable));
/// assert!(!caps.supports(Capability::Activatable));
/// assert_eq!(caps.to_string(), "toggleable+cloud-syncable");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
// Each flag is an independent capability, devices mix them freely.
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Implements [`Capability::Toggleable`].
    pub toggleable: bool,
    /// Implements [`Capability::Activatable`].
    pub activatable: bool,
    /// Implements [`Capability::CloudSyncable`].
    pub cloud_syncable: bool,
    /// Implements [`Capability::ConnectivityAware`].
    pub connectivity_aware: bool,
}

impl Capabilities {
    /// Probes every capability of `device`.
    #[must_use]
    pub fn of(device: &dyn Device) -> Self {
        Self {
            toggleable: Capability::Toggleable.is_supported_by(device),
            activatable: Capability::Activatable.is_supported_by(device),
            cloud_syncable: Capability::CloudSyncable.is_supported_by(device),
            connectivity_aware: Capability::ConnectivityAware.is_supported_by(device),
        }
    }

    /// Returns whether the set contains `capability`.
    #[must_use]
    pub const fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Toggleable => self.toggleable,
            Capability::Activatable => self.activatable,
            Capability::CloudSyncable => self.cloud_syncable,
            Capability::ConnectivityAware => self.connectivity_aware,
        }
    }

    /// Returns whether the set is empty (an identifiable-only device).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.toggleable || self.activatable || self.cloud_syncable || self.connectivity_aware)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("identifiable");
        }
        let names: Vec<&str> = Capability::ALL
            .iter()
            .filter(|c| self.supports(**c))
            .map(Capability::as_str)
            .collect();
        f.write_str(&names.join("+"))
    }
}
