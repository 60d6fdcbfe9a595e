// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Philips Hue bridge flag sensors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::FlagBridge;
use crate::error::{Result, TransportError};

/// Client for the flag sensors of a Hue bridge.
///
/// # Examples
///
/// ```no_run
/// use homehub_lib::integration::{FlagBridge, HueBridge};
///
/// # async fn example() -> homehub_lib::Result<()> {
/// let hue = HueBridge::new("192.168.1.2", "token")?;
/// hue.set_flag(41, true).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HueBridge {
    base_url: String,
    client: Client,
}

impl HueBridge {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a client for the bridge at `ip` using application `token`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(ip: &str, token: &str) -> Result<Self> {
        Self::with_base_url(format!("http://{ip}"), token)
    }

    /// Creates a client for a bridge at an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: impl Into<String>, token: &str) -> Result<Self> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            base_url: format!(
                "{}/api/{}",
                base_url.trim_end_matches('/'),
                urlencoding::encode(token)
            ),
            client,
        })
    }

    fn flag_url(&self, id: u32) -> String {
        format!("{}/sensors/{id}/state", self.base_url)
    }
}

#[async_trait]
impl FlagBridge for HueBridge {
    async fn set_flag(&self, id: u32, value: bool) -> Result<()> {
        tracing::debug!(flag = id, value, "Setting Hue flag");
        let response = self
            .client
            .put(self.flag_url(id))
            .json(&json!({ "flag": value }))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_flag_url() {
        let hue = HueBridge::new("10.0.0.2", "abc").unwrap();
        assert_eq!(hue.flag_url(41), "http://10.0.0.2/api/abc/sensors/41/state");
    }

    #[test]
    fn trims_trailing_slash() {
        let hue = HueBridge::with_base_url("http://127.0.0.1:8080/", "t").unwrap();
        assert_eq!(hue.flag_url(43), "http://127.0.0.1:8080/api/t/sensors/43/state");
    }
}
