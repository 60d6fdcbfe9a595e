// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zigbee device discovery.
//!
//! The zigbee bridge publishes its full device list on
//! `{prefix}/bridge/devices`. Every snapshot replaces the dynamic partition
//! of the [`Registry`]: entries are turned into devices by their
//! `description` and everything else is ignored.
//!
//! | Description   | Device          |
//! |---------------|-----------------|
//! | `Kettle`      | [`Kettle`]      |
//! | `LightSensor` | [`LightSensor`] |
//!
//! Snapshots are applied by a single worker task in arrival order, so a
//! slow rebuild can never be overtaken by an older snapshot. With a
//! [`StateReporter`] configured, every applied snapshot is followed by a
//! sync request and discovered kettles push their state changes.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use homehub_lib::discovery::{DiscoveryOptions, ZigbeeDiscovery};
//! use homehub_lib::registry::Registry;
//! use homehub_lib::telemetry::{LocalBus, Telemetry};
//!
//! # async fn example() -> homehub_lib::Result<()> {
//! let bus: Arc<dyn Telemetry> = Arc::new(LocalBus::new());
//! let registry = Arc::new(Registry::new());
//!
//! let discovery = ZigbeeDiscovery::start(bus, registry, DiscoveryOptions::default()).await?;
//! // ...
//! discovery.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::automation::DEFAULT_IDLE_TIMEOUT;
use crate::device::{Device, Kettle, LightSensor, PendingCommand, ZigbeeInfo};
use crate::error::Result;
use crate::integration::StateReporter;
use crate::registry::Registry;
use crate::telemetry::{self, SubscriptionId, Telemetry, topics};

/// Description marking a kettle.
pub const KETTLE_DESCRIPTION: &str = "Kettle";

/// Description marking an illuminance sensor.
pub const LIGHT_SENSOR_DESCRIPTION: &str = "LightSensor";

/// Default zigbee2mqtt base topic.
pub const DEFAULT_PREFIX: &str = "zigbee2mqtt";

/// Options for zigbee discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    prefix: String,
    kettle_idle_timeout: Duration,
    confirm_timeout: Duration,
    reporter: Option<Arc<dyn StateReporter>>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            kettle_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            confirm_timeout: PendingCommand::DEFAULT_TIMEOUT,
            reporter: None,
        }
    }
}

impl DiscoveryOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the zigbee2mqtt base topic.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the kettle idle shutoff delay.
    #[must_use]
    pub fn with_kettle_idle_timeout(mut self, timeout: Duration) -> Self {
        self.kettle_idle_timeout = timeout;
        self
    }

    /// Sets how long an EXECUTE waits for a kettle to confirm.
    #[must_use]
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Sets the collaborator told about device list and state changes.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn StateReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Returns the zigbee2mqtt base topic.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Decodes a bridge snapshot, skipping entries that are not device info.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the payload is not a JSON array.
pub fn parse_snapshot(payload: &[u8]) -> Result<Vec<ZigbeeInfo>> {
    let entries: Vec<Value> =
        serde_json::from_slice(payload).map_err(crate::error::ParseError::Json)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ZigbeeInfo>(entry) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping snapshot entry");
                None
            }
        })
        .collect())
}

/// Builds the devices described by a snapshot.
///
/// Entries with an unknown description are ignored, as are devices whose
/// binding fails.
pub async fn build_devices(
    snapshot: Vec<ZigbeeInfo>,
    bus: &Arc<dyn Telemetry>,
    options: &DiscoveryOptions,
) -> Vec<Arc<dyn Device>> {
    let mut devices: Vec<Arc<dyn Device>> = Vec::new();

    for info in snapshot {
        let identity = info.friendly_name.clone();
        let built: Result<Arc<dyn Device>> = match info.description.as_deref() {
            Some(KETTLE_DESCRIPTION) => Kettle::spawn_reporting(
                info,
                &options.prefix,
                Arc::clone(bus),
                options.kettle_idle_timeout,
                options.confirm_timeout,
                options.reporter.clone(),
            )
            .await
            .map(|kettle| kettle as Arc<dyn Device>),
            Some(LIGHT_SENSOR_DESCRIPTION) => {
                LightSensor::spawn(info, &options.prefix, Arc::clone(bus))
                    .await
                    .map(|sensor| sensor as Arc<dyn Device>)
            }
            _ => continue,
        };

        match built {
            Ok(device) => devices.push(device),
            Err(e) => {
                tracing::warn!(device = %identity, error = %e, "Failed to bind discovered device");
            }
        }
    }

    devices
}

/// Keeps the dynamic registry partition in sync with the zigbee bridge.
#[derive(Debug)]
pub struct ZigbeeDiscovery {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
    worker: JoinHandle<()>,
}

impl ZigbeeDiscovery {
    /// Subscribes to the bridge snapshot topic and starts the worker.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(
        bus: Arc<dyn Telemetry>,
        registry: Arc<Registry>,
        options: DiscoveryOptions,
    ) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let topic = topics::zigbee_devices(&options.prefix);

        let worker_bus = Arc::clone(&bus);
        let worker = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let snapshot = match parse_snapshot(&payload) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed bridge snapshot");
                        continue;
                    }
                };
                let devices = build_devices(snapshot, &worker_bus, &options).await;
                let accepted = registry.replace_dynamic(devices).await;
                tracing::info!(devices = accepted, "Applied bridge snapshot");

                if let Some(reporter) = &options.reporter {
                    if let Err(e) = reporter.request_sync().await {
                        tracing::warn!(error = %e, "Failed to request a cloud sync");
                    }
                }
            }
        });

        let subscription = bus
            .subscribe(
                &topic,
                telemetry::handler(move |message| {
                    if message.is_empty() {
                        return;
                    }
                    if tx.send(message.payload.clone()).is_err() {
                        tracing::warn!("Discovery worker is gone, dropping snapshot");
                    }
                }),
            )
            .await;

        let subscription = match subscription {
            Ok(id) => id,
            Err(e) => {
                worker.abort();
                return Err(e);
            }
        };

        tracing::info!(topic = %topic, "Zigbee discovery started");
        Ok(Self {
            bus,
            subscription,
            worker,
        })
    }

    /// Stops listening for snapshots.
    ///
    /// Devices already in the registry stay there.
    pub async fn stop(self) {
        self.bus.unsubscribe(self.subscription).await;
        // Dropping the handler closes the channel; the worker drains and exits.
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "Discovery worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot_and_skips_garbage() {
        let payload = br#"[
            {"ieee_address":"0x01","friendly_name":"kitchen/kettle","description":"Kettle"},
            {"ieee_address":"0x02","type":"Coordinator"},
            {"friendly_name":"living/light_sensor","description":"LightSensor",
             "model_id":"RTCGQ11LM"}
        ]"#;

        let snapshot = parse_snapshot(payload).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].friendly_name.as_str(), "kitchen/kettle");
        assert_eq!(snapshot[1].model_id.as_deref(), Some("RTCGQ11LM"));
    }

    #[test]
    fn rejects_non_array() {
        assert!(parse_snapshot(br#"{"devices":[]}"#).is_err());
    }

    #[test]
    fn options_builder() {
        let options = DiscoveryOptions::new()
            .with_prefix("z2m")
            .with_kettle_idle_timeout(Duration::from_secs(60));
        assert_eq!(options.prefix(), "z2m");
        assert_eq!(options.kettle_idle_timeout, Duration::from_secs(60));
        assert_eq!(options.confirm_timeout, PendingCommand::DEFAULT_TIMEOUT);
    }
}
