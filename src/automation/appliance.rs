// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote-control and activation automations.

use std::sync::Arc;

use serde::Deserialize;

use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::telemetry::{self, ActivatePayload, Message, SubscriptionId, Telemetry, topics};

/// Remote button that toggles the mixer.
pub const ACTION_ON: &str = "on";
/// Remote button that toggles the speakers.
pub const ACTION_BRIGHTNESS_UP: &str = "brightness_move_up";

#[derive(Debug, Deserialize)]
struct RemotePayload {
    #[serde(default)]
    action: String,
}

/// Mixer and speakers driven by a zigbee remote.
///
/// `on` toggles the mixer and takes the speakers down with it;
/// `brightness_move_up` toggles the speakers and brings the mixer up with
/// them.
#[derive(Debug)]
pub struct MixerRemote {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
}

impl MixerRemote {
    /// Subscribes to the remote's state topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(
        bus: Arc<dyn Telemetry>,
        remote_topic: &str,
        registry: Arc<Registry>,
        mixer: DeviceIdentity,
        speakers: DeviceIdentity,
    ) -> Result<Self> {
        let handler = telemetry::handler(move |message: &Message| {
            if message.is_empty() {
                return;
            }
            let action = match message.json::<RemotePayload>() {
                Ok(payload) => payload.action,
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring remote payload");
                    return;
                }
            };
            if action != ACTION_ON && action != ACTION_BRIGHTNESS_UP {
                return;
            }

            let registry = Arc::clone(&registry);
            let mixer = mixer.clone();
            let speakers = speakers.clone();
            tokio::spawn(async move {
                if let Err(e) = press(&registry, &action, &mixer, &speakers).await {
                    tracing::warn!(action = %action, error = %e, "Remote action failed");
                }
            });
        });

        let subscription = bus.subscribe(remote_topic, handler).await?;
        Ok(Self { bus, subscription })
    }

    /// Removes the subscription.
    pub async fn stop(self) {
        self.bus.unsubscribe(self.subscription).await;
    }
}

async fn press(
    registry: &Registry,
    action: &str,
    mixer: &DeviceIdentity,
    speakers: &DeviceIdentity,
) -> Result<()> {
    let mixer = registry.lookup(mixer)?;
    let speakers = registry.lookup(speakers)?;
    let mixer_toggle = mixer
        .as_toggleable()
        .ok_or_else(|| Error::unsupported(mixer.identity(), "toggleable"))?;
    let speakers_toggle = speakers
        .as_toggleable()
        .ok_or_else(|| Error::unsupported(speakers.identity(), "toggleable"))?;

    match action {
        ACTION_ON => {
            if mixer_toggle.is_on().await? {
                mixer_toggle.set_on(false).await?;
                speakers_toggle.set_on(false).await?;
            } else {
                mixer_toggle.set_on(true).await?;
            }
        }
        ACTION_BRIGHTNESS_UP => {
            if speakers_toggle.is_on().await? {
                speakers_toggle.set_on(false).await?;
            } else {
                speakers_toggle.set_on(true).await?;
                mixer_toggle.set_on(true).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Forwards `automation/appliance/{identity}` requests to activatable devices.
#[derive(Debug)]
pub struct ApplianceActivation {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
}

impl ApplianceActivation {
    /// Subscribes to every appliance topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(bus: Arc<dyn Telemetry>, registry: Arc<Registry>) -> Result<Self> {
        let handler = telemetry::handler(move |message: &Message| {
            if message.is_empty() {
                return;
            }
            let Some(identity) = topics::appliance_identity(&message.topic) else {
                return;
            };
            let payload: ActivatePayload = match message.json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        topic = %message.topic,
                        error = %e,
                        "Ignoring activation payload"
                    );
                    return;
                }
            };

            let identity = DeviceIdentity::new(identity);
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                if let Err(e) = activate(&registry, &identity, payload.activate).await {
                    tracing::warn!(device = %identity, error = %e, "Activation failed");
                }
            });
        });

        let subscription = bus.subscribe(topics::APPLIANCE_ALL, handler).await?;
        Ok(Self { bus, subscription })
    }

    /// Removes the subscription.
    pub async fn stop(self) {
        self.bus.unsubscribe(self.subscription).await;
    }
}

async fn activate(registry: &Registry, identity: &DeviceIdentity, on: bool) -> Result<()> {
    let device = registry.lookup(identity)?;
    let activatable = device
        .as_activatable()
        .ok_or_else(|| Error::unsupported(identity, "activatable"))?;
    tracing::info!(device = %identity, activate = on, "Activating appliance");
    activatable.activate(on).await
}
