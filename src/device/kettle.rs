// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zigbee kettle.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{
    CloudSyncable, Confirmation, ConnectivityAware, Device, DeviceIdentity, PendingCommand,
    Toggleable,
};
use crate::automation::IdleShutoff;
use crate::error::{ParseError, Result};
use crate::fulfillment::{
    CloudCommand, CloudDevice, CloudState, DeviceInfo, DeviceType, ErrorCode, ExecuteOutcome,
    Execution,
};
use crate::integration::StateReporter;
use crate::telemetry::{self, Message, SubscriptionId, Telemetry, topics};

/// Device entry of a zigbee bridge snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZigbeeInfo {
    /// Radio address.
    #[serde(default)]
    pub ieee_address: String,
    /// Name configured on the bridge, used as the device identity.
    pub friendly_name: DeviceIdentity,
    /// Free text set on the bridge, selects the device family.
    #[serde(default)]
    pub description: Option<String>,
    /// Manufacturer reported by the device.
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Model reported by the device.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Firmware build.
    #[serde(default)]
    pub software_build_id: Option<String>,
}

impl ZigbeeInfo {
    /// Creates an entry with only a friendly name and description.
    #[must_use]
    pub fn new(friendly_name: impl Into<DeviceIdentity>, description: &str) -> Self {
        Self {
            ieee_address: String::new(),
            friendly_name: friendly_name.into(),
            description: Some(description.to_string()),
            manufacturer: None,
            model_id: None,
            software_build_id: None,
        }
    }

    /// Manufacturer metadata for SYNC.
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            manufacturer: self.manufacturer.clone().unwrap_or_default(),
            model: self.model_id.clone().unwrap_or_default(),
            hw_version: String::new(),
            sw_version: self.software_build_id.clone().unwrap_or_default(),
        }
    }
}

/// `{"state":"ON"}` as published by zigbee2mqtt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OnOffState(pub bool);

impl<'de> Deserialize<'de> for OnOffState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            state: String,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self(raw.state.eq_ignore_ascii_case("ON")))
    }
}

impl Serialize for OnOffState {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("OnOffState", 1)?;
        s.serialize_field("state", if self.0 { "ON" } else { "OFF" })?;
        s.end()
    }
}

#[derive(Debug, Default)]
struct KettleState {
    on: bool,
    online: bool,
}

/// A zigbee kettle driven through zigbee2mqtt.
///
/// The state topic is the only source of truth: it updates the cached
/// state, marks the kettle online, resolves a pending command and feeds the
/// idle shutoff. Commands are published on the `/set` topic and, for
/// EXECUTE, confirmed by the next state report.
pub struct Kettle {
    info: ZigbeeInfo,
    state_topic: String,
    set_topic: String,
    bus: Arc<dyn Telemetry>,
    state: Mutex<KettleState>,
    confirmation: Confirmation,
    confirm_timeout: Duration,
    command: tokio::sync::Mutex<()>,
    shutoff: IdleShutoff,
    reporter: Option<Arc<dyn StateReporter>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Kettle {
    /// Creates the kettle and subscribes to its state topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn spawn(
        info: ZigbeeInfo,
        prefix: &str,
        bus: Arc<dyn Telemetry>,
        idle_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let confirm_timeout = PendingCommand::DEFAULT_TIMEOUT;
        Self::spawn_with_timeout(info, prefix, bus, idle_timeout, confirm_timeout).await
    }

    /// Like [`spawn`](Self::spawn) with a custom confirmation timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn spawn_with_timeout(
        info: ZigbeeInfo,
        prefix: &str,
        bus: Arc<dyn Telemetry>,
        idle_timeout: Duration,
        confirm_timeout: Duration,
    ) -> Result<Arc<Self>> {
        Self::spawn_reporting(info, prefix, bus, idle_timeout, confirm_timeout, None).await
    }

    /// Like [`spawn_with_timeout`](Self::spawn_with_timeout), pushing every
    /// state change to `reporter`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn spawn_reporting(
        info: ZigbeeInfo,
        prefix: &str,
        bus: Arc<dyn Telemetry>,
        idle_timeout: Duration,
        confirm_timeout: Duration,
        reporter: Option<Arc<dyn StateReporter>>,
    ) -> Result<Arc<Self>> {
        let name = info.friendly_name.as_str().to_string();
        let kettle = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let shutoff = IdleShutoff::new(idle_timeout, move || {
                let Some(kettle) = weak.upgrade() else {
                    return;
                };
                let device = kettle.identity().clone();
                tracing::info!(device = %device, "Turning kettle off after idle timeout");
                tokio::spawn(async move {
                    if let Err(e) = kettle.set_on(false).await {
                        tracing::warn!(device = %device, error = %e, "Idle shutoff failed");
                    }
                });
            });

            Self {
                state_topic: topics::zigbee_state(prefix, &name),
                set_topic: topics::zigbee_set(prefix, &name),
                info,
                bus: Arc::clone(&bus),
                state: Mutex::new(KettleState::default()),
                confirmation: Confirmation::new(),
                confirm_timeout,
                command: tokio::sync::Mutex::new(()),
                shutoff,
                reporter,
                subscription: Mutex::new(None),
            }
        });

        let weak = Arc::downgrade(&kettle);
        let id = bus
            .subscribe(
                &kettle.state_topic,
                telemetry::handler(move |message| {
                    if let Some(kettle) = weak.upgrade() {
                        kettle.on_state(message);
                    }
                }),
            )
            .await?;
        *kettle.subscription.lock() = Some(id);

        tracing::debug!(device = %kettle.identity(), topic = %kettle.state_topic, "Kettle bound");
        Ok(kettle)
    }

    /// Returns the bridge entry the kettle was built from.
    #[must_use]
    pub fn info(&self) -> &ZigbeeInfo {
        &self.info
    }

    /// Returns whether an idle shutoff is pending.
    #[must_use]
    pub fn shutoff_pending(&self) -> bool {
        self.shutoff.is_pending()
    }

    fn on_state(&self, message: &Message) {
        if message.is_empty() {
            return;
        }
        let OnOffState(on) = match message.json::<OnOffState>() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(device = %self.identity(), error = %e, "Ignoring kettle state");
                return;
            }
        };

        let changed = {
            let mut state = self.state.lock();
            let changed = state.on != on || !state.online;
            state.on = on;
            state.online = true;
            changed
        };
        tracing::debug!(device = %self.identity(), on, "Kettle state");

        self.confirmation.confirm(on);
        self.shutoff.observe(on);

        if changed {
            self.report(on);
        }
    }

    fn report(&self, on: bool) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let reporter = Arc::clone(reporter);
        let id = self.identity().as_str().to_string();
        let states = BTreeMap::from([(id.clone(), CloudState::new(true).record_on_off(on))]);
        tokio::spawn(async move {
            if let Err(e) = reporter.report_state(states).await {
                tracing::warn!(device = %id, error = %e, "Failed to report kettle state");
            }
        });
    }

    async fn publish_command(&self, on: bool) -> Result<()> {
        let payload = serde_json::to_vec(&OnOffState(on)).map_err(ParseError::Json)?;
        self.bus.publish(&self.set_topic, payload, false).await
    }

    fn cached(&self) -> (bool, bool) {
        let state = self.state.lock();
        (state.on, state.online)
    }
}

#[async_trait]
impl Toggleable for Kettle {
    async fn is_on(&self) -> Result<bool> {
        Ok(self.cached().0)
    }

    async fn set_on(&self, on: bool) -> Result<()> {
        tracing::debug!(device = %self.identity(), on, "Switching kettle");
        self.publish_command(on).await
    }
}

#[async_trait]
impl CloudSyncable for Kettle {
    fn describe(&self) -> CloudDevice {
        CloudDevice::new(&self.info.friendly_name, DeviceType::Kettle)
            .with_on_off_trait(false, false)
            .with_default_name("Kettle")
            .with_device_info(self.info.device_info())
            .reporting_state()
    }

    async fn query(&self) -> CloudState {
        let (on, online) = self.cached();
        CloudState::reachable(online).record_on_off(on)
    }

    async fn execute(&self, execution: &Execution) -> ExecuteOutcome {
        let on = match execution.parse() {
            Ok(CloudCommand::OnOff { on }) => on,
            Ok(_) => {
                tracing::warn!(
                    device = %self.identity(),
                    command = %execution.command,
                    "Command not supported"
                );
                return ExecuteOutcome::failed(ErrorCode::ActionNotAvailable, self.is_online());
            }
            Err(code) => return ExecuteOutcome::failed(code, self.is_online()),
        };

        // One command in flight per kettle, so a confirmation always
        // belongs to the command that armed it.
        let _guard = self.command.lock().await;
        let pending = self.confirmation.arm();

        if let Err(e) = self.publish_command(on).await {
            tracing::warn!(device = %self.identity(), error = %e, "Failed to send kettle command");
            return ExecuteOutcome::offline();
        }

        match pending.wait(self.confirm_timeout).await {
            Ok(confirmed) => {
                ExecuteOutcome::success(CloudState::new(true).record_on_off(confirmed))
            }
            Err(e) => {
                tracing::warn!(
                    device = %self.identity(),
                    error = %e,
                    "Kettle did not confirm, reporting offline"
                );
                ExecuteOutcome::offline()
            }
        }
    }
}

impl ConnectivityAware for Kettle {
    fn is_online(&self) -> bool {
        self.cached().1
    }
}

#[async_trait]
impl Device for Kettle {
    fn identity(&self) -> &DeviceIdentity {
        &self.info.friendly_name
    }

    fn as_toggleable(&self) -> Option<&dyn Toggleable> {
        Some(self)
    }

    fn as_cloud_syncable(&self) -> Option<&dyn CloudSyncable> {
        Some(self)
    }

    fn as_connectivity_aware(&self) -> Option<&dyn ConnectivityAware> {
        Some(self)
    }

    async fn teardown(&self) {
        let id = self.subscription.lock().take();
        if let Some(id) = id {
            self.bus.unsubscribe(id).await;
        }
        self.shutoff.stop();
        tracing::debug!(device = %self.identity(), "Kettle torn down");
    }
}

impl std::fmt::Debug for Kettle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (on, online) = self.cached();
        f.debug_struct("Kettle")
            .field("identity", &self.info.friendly_name)
            .field("on", &on)
            .field("online", &online)
            .finish_non_exhaustive()
    }
}
