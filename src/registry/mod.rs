// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry.
//!
//! The registry owns every device and splits them into two partitions:
//!
//! - **manual** devices are added once at startup and live for the whole
//!   process
//! - **dynamic** devices come from discovery snapshots and are replaced
//!   wholesale on every snapshot
//!
//! Lookups see the union. An identity is unique across the union: a manual
//! device always shadows a dynamic one with the same identity, which is then
//! torn down instead of being registered.
//!
//! Reads go through a `parking_lot` read lock and never wait on a device.
//! Mutations are serialized by an async mutex because they await device
//! teardown, and teardown of discarded devices completes before they are
//! dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::capabilities::{Capabilities, Capability};
use crate::device::{Device, DeviceIdentity};
use crate::error::{Error, Result};

type Partition = BTreeMap<DeviceIdentity, Arc<dyn Device>>;

#[derive(Default)]
struct Partitions {
    manual: Partition,
    dynamic: Partition,
}

/// Registry of manual and discovered devices.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use homehub_lib::Capability;
/// use homehub_lib::device::KasaOutlet;
/// use homehub_lib::registry::Registry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = Registry::new();
/// registry.add_manual(Arc::new(KasaOutlet::new("living_room/lamp", "192.168.1.20"))).await;
///
/// assert!(registry.lookup("living_room/lamp").is_ok());
/// assert_eq!(registry.filter(Capability::Toggleable).len(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct Registry {
    partitions: RwLock<Partitions>,
    mutation: Mutex<()>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a manual device.
    ///
    /// Returns `false` if a manual device with the same identity already
    /// exists; the new device is then ignored. A dynamic device with the
    /// same identity is removed and torn down.
    pub async fn add_manual(&self, device: Arc<dyn Device>) -> bool {
        let _guard = self.mutation.lock().await;
        let id = device.identity().clone();

        let shadowed = {
            let mut partitions = self.partitions.write();
            if partitions.manual.contains_key(&id) {
                tracing::warn!(device = %id, "Duplicate manual device ignored");
                return false;
            }
            tracing::info!(
                device = %id,
                capabilities = %Capabilities::of(device.as_ref()),
                "Registered manual device"
            );
            partitions.manual.insert(id.clone(), device);
            partitions.dynamic.remove(&id)
        };

        if let Some(shadowed) = shadowed {
            tracing::warn!(device = %id, "Manual device shadows a discovered device");
            shadowed.teardown().await;
        }
        true
    }

    /// Replaces the whole dynamic partition.
    ///
    /// Devices whose identity is taken by a manual device, or repeated
    /// within `devices`, are torn down and dropped. Every previously
    /// registered dynamic device is torn down after the swap.
    ///
    /// Returns the number of dynamic devices now registered.
    pub async fn replace_dynamic(&self, devices: Vec<Arc<dyn Device>>) -> usize {
        let _guard = self.mutation.lock().await;

        let mut rejected: Vec<Arc<dyn Device>> = Vec::new();
        let (previous, count) = {
            let mut partitions = self.partitions.write();
            let mut next = Partition::new();
            for device in devices {
                let id = device.identity().clone();
                if partitions.manual.contains_key(&id) {
                    tracing::warn!(device = %id, "Discovered device collides with a manual device");
                    rejected.push(device);
                } else if next.contains_key(&id) {
                    tracing::warn!(device = %id, "Duplicate discovered device");
                    rejected.push(device);
                } else {
                    next.insert(id, device);
                }
            }
            let count = next.len();
            (std::mem::replace(&mut partitions.dynamic, next), count)
        };

        for device in rejected.iter().chain(previous.values()) {
            device.teardown().await;
        }

        tracing::info!(
            removed = previous.len(),
            registered = count,
            "Replaced discovered devices"
        );
        count
    }

    /// Looks up a device by identity key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if no visible device has the key.
    pub fn lookup(&self, id: impl AsRef<str>) -> Result<Arc<dyn Device>> {
        let id = id.as_ref();
        let partitions = self.partitions.read();
        partitions
            .manual
            .get(id)
            .or_else(|| partitions.dynamic.get(id))
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))
    }

    /// Returns every visible device implementing `capability`, manual
    /// devices first, each partition in identity order.
    #[must_use]
    pub fn filter(&self, capability: Capability) -> Vec<Arc<dyn Device>> {
        let partitions = self.partitions.read();
        partitions
            .manual
            .values()
            .chain(partitions.dynamic.values())
            .filter(|device| capability.is_supported_by(device.as_ref()))
            .cloned()
            .collect()
    }

    /// Returns every visible device.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        let partitions = self.partitions.read();
        partitions
            .manual
            .values()
            .chain(partitions.dynamic.values())
            .cloned()
            .collect()
    }

    /// Returns the number of visible devices.
    #[must_use]
    pub fn len(&self) -> usize {
        let partitions = self.partitions.read();
        partitions.manual.len() + partitions.dynamic.len()
    }

    /// Returns true if no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of dynamic devices.
    #[must_use]
    pub fn dynamic_len(&self) -> usize {
        self.partitions.read().dynamic.len()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let partitions = self.partitions.read();
        f.debug_struct("Registry")
            .field("manual", &partitions.manual.keys().collect::<Vec<_>>())
            .field("dynamic", &partitions.dynamic.keys().collect::<Vec<_>>())
            .finish()
    }
}
