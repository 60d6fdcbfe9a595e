// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `HomeHub` Lib - a home automation hub.
//!
//! The hub keeps a registry of heterogeneous devices, exposes it to a cloud
//! voice assistant through the SYNC / QUERY / EXECUTE fulfillment protocol,
//! and runs a few always-on automations over a publish/subscribe bus.
//!
//! # Building blocks
//!
//! - [`device`]: the capability traits and the device families (Kasa
//!   outlets, zigbee kettles and light sensors, wake-on-URL computers)
//! - [`registry`]: manual and discovered devices, looked up by identity or
//!   filtered by capability
//! - [`fulfillment`]: the assistant protocol, caller authentication and
//!   per-device outcome aggregation
//! - [`automation`]: presence aggregation, darkness hysteresis, idle
//!   shutoff and the reactions built on them
//! - [`telemetry`]: the bus abstraction with an in-process and an MQTT
//!   implementation
//! - [`kasa`]: the length-framed XOR cipher used by Kasa outlets
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use homehub_lib::Capability;
//! use homehub_lib::device::KasaOutlet;
//! use homehub_lib::registry::Registry;
//!
//! #[tokio::main]
//! async fn main() -> homehub_lib::Result<()> {
//!     let registry = Registry::new();
//!     registry.add_manual(Arc::new(KasaOutlet::new("living_room/lamp", "192.168.1.20"))).await;
//!
//!     for device in registry.filter(Capability::Toggleable) {
//!         if let Some(toggle) = device.as_toggleable() {
//!             toggle.set_on(false).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `http` (default): REST collaborators, computers, userinfo lookup
//! - `mqtt` (default): [`telemetry::MqttBus`]
//! - `server`: the axum endpoint and the `homehub` binary

pub mod automation;
mod capabilities;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod fulfillment;
pub mod integration;
pub mod kasa;
pub mod registry;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;

pub use capabilities::{Capabilities, Capability};
pub use device::{Device, DeviceIdentity};
pub use error::{Error, Result};
