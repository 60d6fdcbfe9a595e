// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Front door presence escalation.
//!
//! Opening the door while nobody is home marks the `frontdoor` presence
//! source as present. Every contact report restarts a countdown; when it
//! runs out the source is cleared with a retained tombstone, so presence
//! falls back to whatever the other sources say.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;

use super::{PresenceService, ResettableTimer};
use crate::error::Result;
use crate::telemetry::{self, Message, PresencePayload, SubscriptionId, Telemetry, topics};

/// Default time the door keeps the house occupied.
pub const DEFAULT_DOOR_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Presence source name used by the door.
pub const FRONTDOOR_SOURCE: &str = "frontdoor";

#[derive(Debug, Deserialize)]
struct ContactPayload {
    /// `true` while the door is closed.
    contact: bool,
}

/// Door-contact driven presence source.
#[derive(Debug)]
pub struct FrontDoor {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
    timer: Arc<ResettableTimer>,
}

impl FrontDoor {
    /// Subscribes to the door's contact topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(
        bus: Arc<dyn Telemetry>,
        contact_topic: &str,
        presence: Arc<PresenceService>,
        timeout: Duration,
    ) -> Result<Self> {
        let source_topic = topics::presence_source(FRONTDOOR_SOURCE);

        // Serialises contact events with the expiry.
        let gate = Arc::new(Mutex::new(()));

        let expiry_gate = Arc::clone(&gate);
        let expiry_bus = Arc::clone(&bus);
        let expiry_topic = source_topic.clone();
        let timer = Arc::new(ResettableTimer::new(timeout, move |expiry| {
            let _gate = expiry_gate.lock();
            if !expiry.is_current() {
                return;
            }
            tracing::debug!(topic = %expiry_topic, "Front door timeout, clearing presence source");
            let bus = Arc::clone(&expiry_bus);
            let topic = expiry_topic.clone();
            tokio::spawn(async move {
                if let Err(e) = bus.publish(&topic, Vec::new(), true).await {
                    tracing::warn!(topic = %topic, error = %e, "Failed to clear presence source");
                }
            });
        }));

        let handler_bus = Arc::clone(&bus);
        let handler_timer = Arc::clone(&timer);
        let handler = telemetry::handler(move |message: &Message| {
            if message.is_empty() {
                return;
            }
            let payload: ContactPayload = match message.json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring contact payload");
                    return;
                }
            };

            let _gate = gate.lock();
            handler_timer.reset();

            if !payload.contact && !presence.current() {
                tracing::info!("Front door opened while nobody is home");
                let bus = Arc::clone(&handler_bus);
                let topic = source_topic.clone();
                tokio::spawn(async move {
                    let payload = PresencePayload::now(true);
                    let published =
                        telemetry::publish_json(bus.as_ref(), &topic, &payload, true).await;
                    if let Err(e) = published {
                        tracing::warn!(
                            topic = %topic,
                            error = %e,
                            "Failed to publish door presence"
                        );
                    }
                });
            }
        });

        let subscription = bus.subscribe(contact_topic, handler).await?;
        Ok(Self {
            bus,
            subscription,
            timer,
        })
    }

    /// Returns whether the countdown is running.
    #[must_use]
    pub fn is_counting_down(&self) -> bool {
        self.timer.is_armed()
    }

    /// Removes the subscription and cancels the countdown.
    pub async fn stop(self) {
        self.timer.stop();
        self.bus.unsubscribe(self.subscription).await;
    }
}
