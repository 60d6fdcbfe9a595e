// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Occupancy aggregation and the reaction to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::capabilities::Capability;
use crate::error::Result;
use crate::integration::{FlagBridge, Notifier};
use crate::registry::Registry;
use crate::telemetry::{self, Message, PresencePayload, SubscriptionId, Telemetry, topics};

/// Per-source occupancy folded into one overall flag.
///
/// A source is either unknown (absent from the map) or reports a boolean.
/// The overall flag is the OR of the known sources, and the aggregator
/// remembers the last value it asked to publish, starting from `false`.
///
/// # Examples
///
/// ```
/// use homehub_lib::automation::PresenceAggregator;
///
/// let mut presence = PresenceAggregator::new();
/// assert_eq!(presence.update("phone", Some(true)), Some(true));
/// assert_eq!(presence.update("laptop", Some(true)), None);
/// assert_eq!(presence.update("phone", None), None);
/// assert_eq!(presence.update("laptop", Some(false)), Some(false));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PresenceAggregator {
    sources: BTreeMap<String, bool>,
    published: bool,
}

impl PresenceAggregator {
    /// Creates an aggregator with no known source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a source report; `None` removes the source.
    ///
    /// Returns the new overall value if it differs from the last published
    /// one, in which case it becomes the published value.
    pub fn update(&mut self, source: &str, state: Option<bool>) -> Option<bool> {
        match state {
            Some(state) => {
                self.sources.insert(source.to_string(), state);
            }
            None => {
                self.sources.remove(source);
            }
        }

        let overall = self.overall();
        if overall == self.published {
            None
        } else {
            self.published = overall;
            Some(overall)
        }
    }

    /// OR of every known source.
    #[must_use]
    pub fn overall(&self) -> bool {
        self.sources.values().any(|present| *present)
    }

    /// Last value handed out for publishing.
    #[must_use]
    pub fn published(&self) -> bool {
        self.published
    }

    /// Known sources and their state.
    #[must_use]
    pub fn sources(&self) -> &BTreeMap<String, bool> {
        &self.sources
    }
}

/// Listens to every presence source and publishes the aggregate.
///
/// Aggregate changes are published (retained) in the order they were
/// computed by a single writer task.
#[derive(Debug)]
pub struct PresenceService {
    aggregator: Mutex<PresenceAggregator>,
    outbox: mpsc::UnboundedSender<bool>,
    bus: Arc<dyn Telemetry>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl PresenceService {
    /// Subscribes to `automation/presence/+`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(bus: Arc<dyn Telemetry>) -> Result<Arc<Self>> {
        let (outbox, mut rx) = mpsc::unbounded_channel::<bool>();

        let writer_bus = Arc::clone(&bus);
        tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                let payload = PresencePayload::now(state);
                let published =
                    telemetry::publish_json(writer_bus.as_ref(), topics::PRESENCE, &payload, true);
                if let Err(e) = published.await {
                    tracing::warn!(error = %e, "Failed to publish presence");
                }
            }
        });

        let service = Arc::new(Self {
            aggregator: Mutex::new(PresenceAggregator::new()),
            outbox,
            bus: Arc::clone(&bus),
            subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&service);
        let id = bus
            .subscribe(
                topics::PRESENCE_SOURCES,
                telemetry::handler(move |message| {
                    if let Some(service) = weak.upgrade() {
                        service.handle(message);
                    }
                }),
            )
            .await?;
        *service.subscription.lock() = Some(id);

        Ok(service)
    }

    /// Returns whether someone is considered home.
    #[must_use]
    pub fn current(&self) -> bool {
        self.aggregator.lock().published()
    }

    /// Returns a copy of the aggregation state.
    #[must_use]
    pub fn snapshot(&self) -> PresenceAggregator {
        self.aggregator.lock().clone()
    }

    /// Removes the source subscription.
    pub async fn stop(&self) {
        let id = self.subscription.lock().take();
        if let Some(id) = id {
            self.bus.unsubscribe(id).await;
        }
    }

    fn handle(&self, message: &Message) {
        let source = message.last_level();
        let state = if message.is_empty() {
            None
        } else {
            match message.json::<PresencePayload>() {
                Ok(payload) => Some(payload.state),
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring presence payload");
                    return;
                }
            }
        };

        let mut aggregator = self.aggregator.lock();
        let changed = aggregator.update(source, state);
        tracing::debug!(source, ?state, sources = ?aggregator.sources(), "Presence source updated");

        if let Some(overall) = changed {
            tracing::info!(present = overall, "Presence changed");
            // Sent under the lock so the writer sees changes in order.
            if self.outbox.send(overall).is_err() {
                tracing::error!("Presence writer stopped");
            }
        }
    }
}

/// Reacts to the aggregate: bridge flag, notification and, when everybody
/// left, switching every toggleable device off.
#[derive(Debug)]
pub struct PresenceReaction {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
}

impl PresenceReaction {
    /// Subscribes to `automation/presence`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(
        bus: Arc<dyn Telemetry>,
        registry: Arc<Registry>,
        bridge: Arc<dyn FlagBridge>,
        notifier: Arc<dyn Notifier>,
        flag: u32,
    ) -> Result<Self> {
        let handler = telemetry::handler(move |message: &Message| {
            if message.is_empty() {
                return;
            }
            let payload: PresencePayload = match message.json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring presence payload");
                    return;
                }
            };

            let registry = Arc::clone(&registry);
            let bridge = Arc::clone(&bridge);
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move {
                react(payload.state, &registry, bridge.as_ref(), notifier.as_ref(), flag).await;
            });
        });

        let subscription = bus.subscribe(topics::PRESENCE, handler).await?;
        Ok(Self { bus, subscription })
    }

    /// Removes the subscription.
    pub async fn stop(self) {
        self.bus.unsubscribe(self.subscription).await;
    }
}

async fn react(
    present: bool,
    registry: &Registry,
    bridge: &dyn FlagBridge,
    notifier: &dyn Notifier,
    flag: u32,
) {
    tracing::info!(present, "Reacting to presence");

    if let Err(e) = bridge.set_flag(flag, present).await {
        tracing::warn!(flag, error = %e, "Failed to set presence flag");
    }

    if !present {
        for device in registry.filter(Capability::Toggleable) {
            let Some(toggle) = device.as_toggleable() else {
                continue;
            };
            if let Err(e) = toggle.set_on(false).await {
                tracing::warn!(device = %device.identity(), error = %e, "Failed to switch off");
            }
        }
    }

    if let Err(e) = notifier.presence(present).await {
        tracing::warn!(error = %e, "Failed to send presence notification");
    }
}
