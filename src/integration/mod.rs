// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vendor REST collaborators.
//!
//! Automations and devices only see the [`FlagBridge`], [`Notifier`] and
//! [`StateReporter`] traits; the HTTP clients behind them live in the
//! `http` feature.

#[cfg(feature = "http")]
mod home_graph;
#[cfg(feature = "http")]
mod hue;
#[cfg(feature = "http")]
mod ntfy;

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(feature = "http")]
pub use home_graph::HomeGraph;
#[cfg(feature = "http")]
pub use hue::HueBridge;
#[cfg(feature = "http")]
pub use ntfy::Ntfy;

use crate::error::Result;
use crate::fulfillment::CloudState;

/// A bridge exposing boolean flag sensors.
#[async_trait]
pub trait FlagBridge: std::fmt::Debug + Send + Sync {
    /// Sets flag sensor `id` to `value`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the bridge cannot be reached or
    /// rejects the request.
    async fn set_flag(&self, id: u32, value: bool) -> Result<()>;
}

/// Push notifications to the household.
#[async_trait]
pub trait Notifier: std::fmt::Debug + Send + Sync {
    /// Announces that somebody is home (`true`) or everybody left.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the notification cannot be delivered.
    async fn presence(&self, home: bool) -> Result<()>;
}

/// Outgoing notifications to the assistant's device graph.
///
/// Devices that advertise `willReportState` push their state through it when
/// it changes, and discovery asks for a fresh SYNC after the device list
/// changed.
#[async_trait]
pub trait StateReporter: std::fmt::Debug + Send + Sync {
    /// Asks the assistant to issue a fresh SYNC.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails.
    async fn request_sync(&self) -> Result<()>;

    /// Reports the current state of the given devices, keyed by device id.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails.
    async fn report_state(&self, states: BTreeMap<String, CloudState>) -> Result<()>;
}
