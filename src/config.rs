// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub configuration.
//!
//! The configuration is a TOML file in which every section and key is
//! optional. Secrets can be supplied through the environment instead:
//!
//! | Variable                  | Overrides         |
//! |---------------------------|-------------------|
//! | `HOMEHUB_MQTT_HOST`       | `mqtt.host`       |
//! | `HOMEHUB_MQTT_PASSWORD`   | `mqtt.password`   |
//! | `HOMEHUB_HUE_TOKEN`       | `hue.token`       |
//! | `HOMEHUB_NTFY_TOPIC`      | `ntfy.topic`      |
//! | `HOMEHUB_HOMEGRAPH_TOKEN` | `homegraph.token` |
//!
//! # Examples
//!
//! ```
//! use homehub_lib::config::HubConfig;
//!
//! let config = HubConfig::from_toml(r#"
//!     [mqtt]
//!     host = "10.0.0.5"
//!
//!     [kasa.outlets]
//!     "living_room/lamp" = "10.0.0.20"
//!
//!     [fulfillment]
//!     userinfo_url = "https://login.example.com/userinfo"
//! "#).unwrap();
//!
//! assert_eq!(config.mqtt.port, 1883);
//! assert_eq!(config.kasa.outlets["living_room/lamp"], "10.0.0.20");
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable overriding the MQTT host.
pub const ENV_MQTT_HOST: &str = "HOMEHUB_MQTT_HOST";
/// Environment variable overriding the MQTT password.
pub const ENV_MQTT_PASSWORD: &str = "HOMEHUB_MQTT_PASSWORD";
/// Environment variable overriding the Hue application token.
pub const ENV_HUE_TOKEN: &str = "HOMEHUB_HUE_TOKEN";
/// Environment variable overriding the ntfy topic.
pub const ENV_NTFY_TOPIC: &str = "HOMEHUB_NTFY_TOPIC";
/// Environment variable overriding the HomeGraph access token.
pub const ENV_HOMEGRAPH_TOKEN: &str = "HOMEHUB_HOMEGRAPH_TOKEN";

/// Complete hub configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Zigbee bridge.
    pub zigbee: ZigbeeConfig,
    /// Kasa outlets.
    pub kasa: KasaConfig,
    /// Computers by identity.
    pub computers: BTreeMap<String, ComputerConfig>,
    /// Fulfillment endpoint.
    pub fulfillment: FulfillmentConfig,
    /// Hue bridge.
    pub hue: HueConfig,
    /// Push notifications.
    pub ntfy: NtfyConfig,
    /// Cloud state reporting.
    pub homegraph: HomeGraphConfig,
    /// Automation tuning.
    pub automation: AutomationConfig,
}

/// `[mqtt]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Client id, generated when absent.
    pub client_id: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: None,
        }
    }
}

/// `[zigbee]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ZigbeeConfig {
    /// zigbee2mqtt base topic.
    pub prefix: String,
}

impl Default for ZigbeeConfig {
    fn default() -> Self {
        Self {
            prefix: crate::discovery::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// `[kasa]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KasaConfig {
    /// Outlet host by identity.
    pub outlets: BTreeMap<String, String>,
}

/// `[computers.<identity>]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComputerConfig {
    /// Wake URL.
    pub url: String,
}

/// `[fulfillment]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// Socket address the HTTP server binds to.
    pub listen: String,
    /// Identity provider userinfo endpoint.
    pub userinfo_url: String,
    /// How long a resolved caller is cached, in seconds.
    pub identity_cache_ttl_secs: u64,
    /// How long EXECUTE waits for a device confirmation, in milliseconds.
    pub confirm_timeout_ms: u64,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8090".to_string(),
            userinfo_url: String::new(),
            identity_cache_ttl_secs: 30 * 60,
            confirm_timeout_ms: 1000,
        }
    }
}

impl FulfillmentConfig {
    /// Identity cache lifetime.
    #[must_use]
    pub fn identity_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_cache_ttl_secs)
    }

    /// Confirmation wait budget.
    #[must_use]
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

/// `[hue]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HueConfig {
    /// Bridge address; the Hue reactions are disabled without it.
    pub ip: Option<String>,
    /// Application token.
    pub token: Option<String>,
    /// Flag sensor mirroring presence.
    pub presence_flag: u32,
    /// Flag sensor mirroring darkness.
    pub darkness_flag: u32,
    /// Room whose darkness is mirrored.
    pub darkness_room: String,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self {
            ip: None,
            token: None,
            presence_flag: 41,
            darkness_flag: 43,
            darkness_room: "living".to_string(),
        }
    }
}

/// `[ntfy]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NtfyConfig {
    /// Server base URL.
    pub base_url: String,
    /// Topic; notifications are disabled without it.
    pub topic: Option<String>,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ntfy.sh".to_string(),
            topic: None,
        }
    }
}

/// `[homegraph]`
///
/// Reporting is enabled when both the agent user and the token are set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HomeGraphConfig {
    /// Endpoint base URL.
    pub base_url: String,
    /// Agent user the hub reports for.
    pub agent_user_id: Option<String>,
    /// Bearer access token.
    pub token: Option<String>,
}

impl Default for HomeGraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://homegraph.googleapis.com".to_string(),
            agent_user_id: None,
            token: None,
        }
    }
}

/// `[automation]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Kettle idle shutoff, in seconds.
    pub kettle_idle_secs: u64,
    /// Friendly name of the front door contact sensor.
    pub frontdoor: String,
    /// Front door presence window, in seconds.
    pub frontdoor_timeout_secs: u64,
    /// Friendly name of the mixer remote.
    pub remote: String,
    /// Identity of the mixer outlet.
    pub mixer: String,
    /// Identity of the speakers outlet.
    pub speakers: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            kettle_idle_secs: 5 * 60,
            frontdoor: "hallway/frontdoor".to_string(),
            frontdoor_timeout_secs: 15 * 60,
            remote: "living/remote".to_string(),
            mixer: "living_room/mixer".to_string(),
            speakers: "living_room/speakers".to_string(),
        }
    }
}

impl AutomationConfig {
    /// Kettle idle shutoff delay.
    #[must_use]
    pub fn kettle_idle(&self) -> Duration {
        Duration::from_secs(self.kettle_idle_secs)
    }

    /// Front door presence window.
    #[must_use]
    pub fn frontdoor_timeout(&self) -> Duration {
        Duration::from_secs(self.frontdoor_timeout_secs)
    }
}

impl HubConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads the file at `path`, applies environment overrides and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or the
    /// result is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Replaces values with the non-empty results of `lookup` for the
    /// `HOMEHUB_*` variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(host) = get(ENV_MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(password) = get(ENV_MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
        if let Some(token) = get(ENV_HUE_TOKEN) {
            self.hue.token = Some(token);
        }
        if let Some(topic) = get(ENV_NTFY_TOPIC) {
            self.ntfy.topic = Some(topic);
        }
        if let Some(token) = get(ENV_HOMEGRAPH_TOKEN) {
            self.homegraph.token = Some(token);
        }
    }

    /// Checks values the hub cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host must not be empty".to_string()));
        }
        if self.fulfillment.userinfo_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "fulfillment.userinfo_url must not be empty".to_string(),
            ));
        }
        if self.hue.ip.is_some() && self.hue.token.is_none() {
            return Err(ConfigError::Invalid("hue.token is required with hue.ip".to_string()));
        }
        if self.homegraph.agent_user_id.is_some() && self.homegraph.token.is_none() {
            return Err(ConfigError::Invalid(
                "homegraph.token is required with homegraph.agent_user_id".to_string(),
            ));
        }
        Ok(())
    }
}
