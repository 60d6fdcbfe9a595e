// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device capability model and the concrete device families.
//!
//! Every device implements [`Device`], which carries its identity and
//! answers capability probes. A probe returns the device itself viewed
//! through one capability trait, or `None`:
//!
//! | Device          | Toggleable | Activatable | CloudSyncable | ConnectivityAware |
//! |-----------------|:----------:|:-----------:|:-------------:|:-----------------:|
//! | [`KasaOutlet`]  | yes        |             | yes           | yes               |
//! | [`Computer`]    |            | yes         | yes           |                   |
//! | [`Kettle`]      | yes        |             | yes           | yes               |
//! | [`LightSensor`] |            |             |               |                   |
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use homehub_lib::device::{Device, KasaOutlet};
//!
//! let outlet: Arc<dyn Device> = Arc::new(KasaOutlet::new("living_room/lamp", "192.168.1.20"));
//! if let Some(toggle) = outlet.as_toggleable() {
//!     // toggle.set_on(true).await?;
//! #   let _ = toggle;
//! }
//! assert!(outlet.as_activatable().is_none());
//! ```

#[cfg(feature = "http")]
mod computer;
mod identity;
mod kettle;
mod light_sensor;
mod outlet;
mod pending;

use std::fmt;

use async_trait::async_trait;

#[cfg(feature = "http")]
pub use computer::Computer;
pub use identity::{DeviceIdentity, SEPARATOR};
pub use kettle::{Kettle, ZigbeeInfo};
pub use light_sensor::LightSensor;
pub use outlet::KasaOutlet;
pub use pending::{Confirmation, PendingCommand};

use crate::error::Result;
use crate::fulfillment::{CloudDevice, CloudState, Execution, ExecuteOutcome};

/// A registered device.
///
/// The capability probes default to `None`; a device overrides the ones it
/// implements by returning `Some(self)`.
#[async_trait]
pub trait Device: fmt::Debug + Send + Sync {
    /// Returns the stable identity.
    fn identity(&self) -> &DeviceIdentity;

    /// Probes for [`Toggleable`].
    fn as_toggleable(&self) -> Option<&dyn Toggleable> {
        None
    }

    /// Probes for [`Activatable`].
    fn as_activatable(&self) -> Option<&dyn Activatable> {
        None
    }

    /// Probes for [`CloudSyncable`].
    fn as_cloud_syncable(&self) -> Option<&dyn CloudSyncable> {
        None
    }

    /// Probes for [`ConnectivityAware`].
    fn as_connectivity_aware(&self) -> Option<&dyn ConnectivityAware> {
        None
    }

    /// Releases telemetry subscriptions and timers.
    ///
    /// Called by the registry before a dynamic device is dropped. After it
    /// returns no callback may touch the device any more.
    async fn teardown(&self) {}
}

/// Readable and settable on/off state.
#[async_trait]
pub trait Toggleable: Send + Sync {
    /// Returns whether the device is on.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read from the device.
    async fn is_on(&self) -> Result<bool>;

    /// Switches the device on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be delivered.
    async fn set_on(&self, on: bool) -> Result<()>;
}

/// Fire-and-forget activation.
#[async_trait]
pub trait Activatable: Send + Sync {
    /// Activates (`true`) or deactivates (`false`) the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the activation cannot be delivered or the
    /// direction is not supported.
    async fn activate(&self, activate: bool) -> Result<()>;
}

/// Visible to the voice assistant.
#[async_trait]
pub trait CloudSyncable: Send + Sync {
    /// Describes the device for SYNC.
    fn describe(&self) -> CloudDevice;

    /// Reports the current state for QUERY.
    async fn query(&self) -> CloudState;

    /// Runs one execution for EXECUTE.
    async fn execute(&self, execution: &Execution) -> ExecuteOutcome;
}

/// Tracks the last known reachability.
pub trait ConnectivityAware: Send + Sync {
    /// Returns the last known online flag.
    fn is_online(&self) -> bool;
}
