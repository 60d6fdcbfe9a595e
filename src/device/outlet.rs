// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kasa smart outlet.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CloudSyncable, ConnectivityAware, Device, DeviceIdentity, Toggleable};
use crate::error::{Error, Result, TransportError};
use crate::fulfillment::{
    CloudCommand, CloudDevice, CloudState, DeviceInfo, DeviceType, ErrorCode, ExecuteOutcome,
    Execution,
};
use crate::kasa::{KasaClient, KasaReply, KasaRequest};

/// A Kasa outlet reachable over the local network.
///
/// The relay state is read from the outlet on every query; the online flag
/// follows the outcome of the last exchange. Exchanges with one outlet are
/// serialized.
#[derive(Debug)]
pub struct KasaOutlet {
    identity: DeviceIdentity,
    client: KasaClient,
    online: AtomicBool,
    exchange: Mutex<()>,
}

impl KasaOutlet {
    /// Creates an outlet at `host` on the default port.
    #[must_use]
    pub fn new(identity: impl Into<DeviceIdentity>, host: impl Into<String>) -> Self {
        Self::with_client(identity, KasaClient::new(host))
    }

    /// Creates an outlet using a preconfigured client.
    #[must_use]
    pub fn with_client(identity: impl Into<DeviceIdentity>, client: KasaClient) -> Self {
        Self {
            identity: identity.into(),
            client,
            online: AtomicBool::new(true),
            exchange: Mutex::new(()),
        }
    }

    /// Returns the outlet host.
    #[must_use]
    pub fn host(&self) -> &str {
        self.client.host()
    }

    async fn send(&self, request: &KasaRequest) -> Result<KasaReply> {
        let _guard = self.exchange.lock().await;
        let result = self.client.send(request).await;
        let reachable = !matches!(result, Err(Error::Transport(_)));
        if self.online.swap(reachable, Ordering::AcqRel) != reachable {
            tracing::info!(
                device = %self.identity,
                online = reachable,
                "Outlet connectivity changed"
            );
        }
        result
    }
}

#[async_trait]
impl Toggleable for KasaOutlet {
    async fn is_on(&self) -> Result<bool> {
        let reply = self.send(&KasaRequest::get_sysinfo()).await?;
        let info = reply.sysinfo()?;
        if info.err_code != 0 {
            return Err(TransportError::DeviceError(info.err_code).into());
        }
        Ok(info.is_on())
    }

    async fn set_on(&self, on: bool) -> Result<()> {
        tracing::debug!(device = %self.identity, on, "Switching outlet");
        let reply = self.send(&KasaRequest::set_relay_state(on)).await?;
        let relay = reply.relay_state()?;
        if relay.err_code != 0 {
            tracing::warn!(
                device = %self.identity,
                code = relay.err_code,
                "Outlet refused relay change"
            );
            return Err(TransportError::DeviceError(relay.err_code).into());
        }
        Ok(())
    }
}

#[async_trait]
impl CloudSyncable for KasaOutlet {
    fn describe(&self) -> CloudDevice {
        CloudDevice::new(&self.identity, DeviceType::Outlet)
            .with_on_off_trait(false, false)
            .with_default_name("Outlet")
            .with_device_info(DeviceInfo {
                manufacturer: "TP-Link".to_string(),
                model: "Kasa".to_string(),
                ..DeviceInfo::default()
            })
    }

    async fn query(&self) -> CloudState {
        match self.is_on().await {
            Ok(on) => CloudState::reachable(true).record_on_off(on),
            Err(e) => {
                tracing::warn!(device = %self.identity, error = %e, "Outlet query failed");
                CloudState::reachable(self.is_online())
            }
        }
    }

    async fn execute(&self, execution: &Execution) -> ExecuteOutcome {
        let on = match execution.parse() {
            Ok(CloudCommand::OnOff { on }) => on,
            Ok(_) => {
                tracing::warn!(
                    device = %self.identity,
                    command = %execution.command,
                    "Command not supported"
                );
                return ExecuteOutcome::failed(ErrorCode::ActionNotAvailable, self.is_online());
            }
            Err(code) => {
                tracing::warn!(
                    device = %self.identity,
                    command = %execution.command,
                    %code,
                    "Command rejected"
                );
                return ExecuteOutcome::failed(code, self.is_online());
            }
        };

        match self.set_on(on).await {
            Ok(()) => ExecuteOutcome::success(CloudState::new(true).record_on_off(on)),
            Err(Error::Transport(TransportError::DeviceError(_)) | Error::Malformed(_)) => {
                ExecuteOutcome::failed(ErrorCode::TransientError, true)
            }
            Err(e) => {
                tracing::warn!(device = %self.identity, error = %e, "Outlet unreachable");
                ExecuteOutcome::offline()
            }
        }
    }
}

impl ConnectivityAware for KasaOutlet {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Device for KasaOutlet {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
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
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::capabilities::Capabilities;
    use crate::fulfillment::Trait;

    #[test]
    fn capabilities() {
        let outlet = KasaOutlet::new("living_room/lamp", "10.0.0.2");
        let caps = Capabilities::of(&outlet);
        assert!(caps.toggleable && caps.cloud_syncable && caps.connectivity_aware);
        assert!(!caps.activatable);
    }

    #[test]
    fn describes_as_outlet() {
        let outlet = KasaOutlet::new("living_room/lamp", "10.0.0.2");
        let device = outlet.describe();
        assert_eq!(device.device_type, DeviceType::Outlet);
        assert!(device.has_trait(Trait::OnOff));
        assert_eq!(device.room_hint, "Living Room");
        assert_eq!(device.name.name, "Lamp");
    }

    #[tokio::test]
    async fn unsupported_command_keeps_online() {
        let outlet = KasaOutlet::new("living_room/lamp", "10.0.0.2");
        let execution =
            Execution::new("action.devices.commands.BrightnessAbsolute", json!({"brightness": 10}));
        let outcome = outlet.execute(&execution).await;
        assert_eq!(outcome.error, Some(ErrorCode::ActionNotAvailable));
        assert!(outcome.online);
    }
}
