// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Computer woken through an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Activatable, CloudSyncable, Device, DeviceIdentity};
use crate::error::{Error, Result, TransportError};
use crate::fulfillment::{
    CloudCommand, CloudDevice, CloudState, DeviceType, ErrorCode, ExecuteOutcome, Execution,
};

/// A computer started by requesting a wake URL.
///
/// Only activation is possible: the device cannot be switched off and has
/// no readable state.
#[derive(Debug, Clone)]
pub struct Computer {
    identity: DeviceIdentity,
    url: String,
    client: Client,
}

impl Computer {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a computer woken by a GET on `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(identity: impl Into<DeviceIdentity>, url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            identity: identity.into(),
            url: url.into(),
            client,
        })
    }

    /// Returns the wake URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Activatable for Computer {
    async fn activate(&self, activate: bool) -> Result<()> {
        if !activate {
            tracing::warn!(device = %self.identity, "Computer cannot be deactivated");
            return Err(Error::Unsupported(format!("{} cannot be deactivated", self.identity)));
        }

        tracing::info!(device = %self.identity, "Waking computer");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl CloudSyncable for Computer {
    fn describe(&self) -> CloudDevice {
        CloudDevice::new(&self.identity, DeviceType::Scene)
            .with_scene_trait(false)
            .with_default_name("Computer")
    }

    async fn query(&self) -> CloudState {
        CloudState::reachable(true)
    }

    async fn execute(&self, execution: &Execution) -> ExecuteOutcome {
        match execution.parse() {
            Ok(CloudCommand::ActivateScene { deactivate: true }) => {
                ExecuteOutcome::failed(ErrorCode::ActionNotAvailable, true)
            }
            Ok(CloudCommand::ActivateScene { deactivate: false }) => {
                match self.activate(true).await {
                    Ok(()) => ExecuteOutcome::success(CloudState::new(true)),
                    Err(e) => {
                        let device = &self.identity;
                        tracing::warn!(device = %device, error = %e, "Failed to wake computer");
                        ExecuteOutcome::offline()
                    }
                }
            }
            Ok(_) => ExecuteOutcome::failed(ErrorCode::ActionNotAvailable, true),
            Err(code) => ExecuteOutcome::failed(code, true),
        }
    }
}

#[async_trait]
impl Device for Computer {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn as_activatable(&self) -> Option<&dyn Activatable> {
        Some(self)
    }

    fn as_cloud_syncable(&self) -> Option<&dyn CloudSyncable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fulfillment::{COMMAND_ACTIVATE_SCENE, COMMAND_ON_OFF, Trait};

    fn computer() -> Computer {
        Computer::new("bedroom/computer", "http://127.0.0.1:1/wake").unwrap()
    }

    #[test]
    fn describes_irreversible_scene() {
        let device = computer().describe();
        assert_eq!(device.device_type, DeviceType::Scene);
        assert!(device.has_trait(Trait::Scene));
        assert!(!device.has_trait(Trait::OnOff));
        assert!(!device.will_report_state);
    }

    #[tokio::test]
    async fn deactivate_is_refused() {
        let computer = computer();
        assert!(matches!(computer.activate(false).await, Err(Error::Unsupported(_))));

        let outcome = computer
            .execute(&Execution::new(COMMAND_ACTIVATE_SCENE, json!({"deactivate": true})))
            .await;
        assert_eq!(outcome.error, Some(ErrorCode::ActionNotAvailable));
        assert!(outcome.online);
    }

    #[tokio::test]
    async fn on_off_is_not_available() {
        let outcome = computer()
            .execute(&Execution::new(COMMAND_ON_OFF, json!({"on": true})))
            .await;
        assert_eq!(outcome.error, Some(ErrorCode::ActionNotAvailable));
    }

    #[test]
    fn probes() {
        let computer = computer();
        assert!(computer.as_activatable().is_some());
        assert!(computer.as_toggleable().is_none());
        assert!(computer.as_connectivity_aware().is_none());
    }
}
