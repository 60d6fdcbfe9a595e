// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publish/subscribe telemetry bus.
//!
//! Devices and automations talk to the outside world through the
//! [`Telemetry`] trait. Two implementations ship with the crate:
//!
//! - [`LocalBus`]: in-process delivery with retained messages
//! - [`MqttBus`] (feature `mqtt`): a broker connection through `rumqttc`
//!
//! Handlers are plain synchronous closures. They run on the bus delivery
//! path and must not block; follow-up work that needs to await is spawned.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use homehub_lib::telemetry::{LocalBus, Telemetry, handler};
//!
//! # async fn example() -> homehub_lib::Result<()> {
//! let bus = LocalBus::new();
//! let id = bus
//!     .subscribe("automation/presence/+", handler(|msg| {
//!         println!("{} -> {}", msg.topic, msg.payload_str());
//!     }))
//!     .await?;
//!
//! bus.publish("automation/presence/phone", br#"{"state":true}"#.to_vec(), true).await?;
//! bus.unsubscribe(id).await;
//! # Ok(())
//! # }
//! ```

mod local;
#[cfg(feature = "mqtt")]
mod mqtt;
mod payload;
mod router;
pub mod topics;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use local::LocalBus;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBus, MqttBusBuilder};
pub use payload::{ActivatePayload, DarknessPayload, PresencePayload, now_millis};
pub use router::{TopicRouter, filter_matches};

use crate::error::{ParseError, Result};

/// A message delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Whether the message is (or replays) a retained message.
    pub retained: bool,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, retained: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retained,
        }
    }

    /// Returns true for an empty payload (a retained tombstone).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Decodes the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if the payload does not decode into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, ParseError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Returns the last topic level.
    #[must_use]
    pub fn last_level(&self) -> &str {
        self.topic.rsplit('/').next().unwrap_or_default()
    }
}

/// Callback invoked for each matching message.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Wraps a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifies one subscription for [`Telemetry::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A publish/subscribe transport.
#[async_trait]
pub trait Telemetry: fmt::Debug + Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// A retained message with an empty payload clears the retained value
    /// of the topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the message could not be queued.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retained: bool) -> Result<()>;

    /// Registers `handler` for every topic matching `filter`.
    ///
    /// Filters use MQTT syntax: `+` matches one level, a trailing `#`
    /// matches any remaining levels.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription could not be placed.
    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<SubscriptionId>;

    /// Removes a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId);
}

/// Serializes `value` and publishes it.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if serialization fails, or the
/// transport error of the bus.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn Telemetry,
    topic: &str,
    value: &T,
    retained: bool,
) -> Result<()> {
    let payload = serde_json::to_vec(value).map_err(ParseError::Json)?;
    bus.publish(topic, payload, retained).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_helpers() {
        let msg = Message::new("automation/presence/phone", r#"{"state":true}"#, true);
        assert!(!msg.is_empty());
        assert_eq!(msg.last_level(), "phone");

        let payload: PresencePayload = msg.json().unwrap();
        assert!(payload.state);
    }

    #[test]
    fn tombstone_is_empty() {
        let msg = Message::new("automation/presence/phone", Vec::new(), true);
        assert!(msg.is_empty());
        assert!(msg.json::<PresencePayload>().is_err());
    }

    #[test]
    fn subscription_id_display() {
        assert_eq!(SubscriptionId::new(7).to_string(), "sub-7");
    }
}
