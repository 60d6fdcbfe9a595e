// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process telemetry bus.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Handler, Message, SubscriptionId, Telemetry, TopicRouter, filter_matches};
use crate::error::Result;

/// In-process [`Telemetry`] implementation.
///
/// Publishing delivers synchronously to every matching handler. Retained
/// messages are kept per topic and replayed to new subscribers, and a
/// retained publish with an empty payload clears the topic, which is how a
/// broker treats retained tombstones.
///
/// With [`LocalBus::with_history`] every publish is also recorded, which
/// lets tests assert on outgoing traffic.
#[derive(Debug, Default)]
pub struct LocalBus {
    router: TopicRouter,
    retained: Mutex<BTreeMap<String, Message>>,
    history: Option<Mutex<Vec<Message>>>,
}

impl LocalBus {
    /// Creates a bus without history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that records every published message.
    #[must_use]
    pub fn with_history() -> Self {
        Self {
            history: Some(Mutex::new(Vec::new())),
            ..Self::default()
        }
    }

    /// Returns the recorded messages published on `topic`.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.history
            .as_ref()
            .map(|h| h.lock().iter().filter(|m| m.topic == topic).cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every recorded message.
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        self.history
            .as_ref()
            .map(|h| h.lock().clone())
            .unwrap_or_default()
    }

    /// Returns the retained message of `topic`.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.retained.lock().get(topic).cloned()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.router.len()
    }

    /// Delivers a message as if it arrived from outside, without recording it.
    pub fn inject(&self, message: &Message) -> usize {
        self.store_retained(message);
        self.router.route(message)
    }

    fn store_retained(&self, message: &Message) {
        if !message.retained {
            return;
        }
        let mut retained = self.retained.lock();
        if message.is_empty() {
            retained.remove(&message.topic);
        } else {
            retained.insert(message.topic.clone(), message.clone());
        }
    }
}

#[async_trait]
impl Telemetry for LocalBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retained: bool) -> Result<()> {
        let message = Message::new(topic, payload, retained);
        tracing::debug!(
            topic = %topic,
            payload = %message.payload_str(),
            retained,
            "Publishing"
        );
        if let Some(history) = &self.history {
            history.lock().push(message.clone());
        }
        self.inject(&message);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<SubscriptionId> {
        let id = self.router.add(filter, handler);

        let replay: Vec<Message> = self
            .retained
            .lock()
            .values()
            .filter(|m| filter_matches(filter, &m.topic))
            .cloned()
            .collect();
        for message in &replay {
            self.router.route_to(id, message);
        }

        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        self.router.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::telemetry::handler;

    fn collector() -> (Arc<Mutex<Vec<Message>>>, Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        (seen, handler(move |m| inner.lock().push(m.clone())))
    }

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let bus = LocalBus::new();
        let (seen, h) = collector();
        bus.subscribe("a/+", h).await.unwrap();

        bus.publish("a/b", b"1".to_vec(), false).await.unwrap();
        bus.publish("c/d", b"2".to_vec(), false).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic, "a/b");
    }

    #[tokio::test]
    async fn replays_retained_on_subscribe() {
        let bus = LocalBus::new();
        bus.publish("a/b", b"kept".to_vec(), true).await.unwrap();
        bus.publish("a/c", b"not kept".to_vec(), false).await.unwrap();

        let (seen, h) = collector();
        bus.subscribe("a/#", h).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, b"kept");
        assert!(seen[0].retained);
    }

    #[tokio::test]
    async fn empty_retained_clears_topic() {
        let bus = LocalBus::new();
        bus.publish("a/b", b"kept".to_vec(), true).await.unwrap();
        bus.publish("a/b", Vec::new(), true).await.unwrap();
        assert!(bus.retained("a/b").is_none());

        let (seen, h) = collector();
        bus.subscribe("a/b", h).await.unwrap();
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = LocalBus::new();
        let (seen, h) = collector();
        let id = bus.subscribe("a/b", h).await.unwrap();
        bus.unsubscribe(id).await;

        bus.publish("a/b", b"x".to_vec(), false).await.unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn history_records_publishes_only() {
        let bus = LocalBus::with_history();
        bus.publish("a/b", b"x".to_vec(), false).await.unwrap();
        bus.inject(&Message::new("a/b", "y", false));

        assert_eq!(bus.published("a/b").len(), 1);
        assert_eq!(bus.history().len(), 1);
        assert!(LocalBus::new().history().is_empty());
    }
}
