// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic routing for telemetry handlers.
//!
//! The [`TopicRouter`] keeps the subscription table shared by every bus
//! implementation and dispatches incoming messages to matching handlers.
//!
//! ```text
//! Message: zigbee2mqtt/kitchen/kettle → {"state":"ON"}
//!                     ↓
//!             TopicRouter.route()
//!                     ↓
//!     match filters: zigbee2mqtt/kitchen/kettle, zigbee2mqtt/#
//!                     ↓
//!        handlers cloned out of the table
//!                     ↓
//!           handler(&message), lock released
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{Handler, Message, SubscriptionId};

struct Route {
    id: SubscriptionId,
    filter: String,
    handler: Handler,
}

/// Subscription table with MQTT wildcard matching.
///
/// Handlers are invoked without holding the table lock, so a handler may
/// subscribe or unsubscribe while it runs.
#[derive(Default)]
pub struct TopicRouter {
    routes: RwLock<Vec<Route>>,
    next_id: AtomicU64,
}

impl TopicRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `filter`.
    pub fn add(&self, filter: impl Into<String>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let filter = filter.into();
        tracing::debug!(filter = %filter, id = %id, "Registering telemetry handler");
        self.routes.write().push(Route {
            id,
            filter,
            handler,
        });
        id
    }

    /// Removes a subscription and returns its filter.
    pub fn remove(&self, id: SubscriptionId) -> Option<String> {
        let mut routes = self.routes.write();
        let index = routes.iter().position(|r| r.id == id)?;
        let route = routes.remove(index);
        tracing::debug!(filter = %route.filter, id = %id, "Removed telemetry handler");
        Some(route.filter)
    }

    /// Returns whether any subscription uses exactly `filter`.
    #[must_use]
    pub fn has_filter(&self, filter: &str) -> bool {
        self.routes.read().iter().any(|r| r.filter == filter)
    }

    /// Returns the distinct filters currently subscribed.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> =
            self.routes.read().iter().map(|r| r.filter.clone()).collect();
        filters.sort();
        filters.dedup();
        filters
    }

    /// Delivers `message` to every matching handler.
    ///
    /// Returns the number of handlers invoked.
    pub fn route(&self, message: &Message) -> usize {
        let handlers: Vec<Handler> = self
            .routes
            .read()
            .iter()
            .filter(|r| filter_matches(&r.filter, &message.topic))
            .map(|r| Handler::clone(&r.handler))
            .collect();

        if handlers.is_empty() {
            tracing::trace!(topic = %message.topic, "No handler for topic");
        }
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Delivers `message` to one subscription only, if it matches.
    pub fn route_to(&self, id: SubscriptionId, message: &Message) -> bool {
        let handler = self
            .routes
            .read()
            .iter()
            .find(|r| r.id == id && filter_matches(&r.filter, &message.topic))
            .map(|r| Handler::clone(&r.handler));

        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    /// Returns the number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Returns true if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("filters", &self.filters())
            .finish_non_exhaustive()
    }
}

/// Returns whether `topic` matches the MQTT `filter`.
///
/// # Examples
///
/// ```
/// use homehub_lib::telemetry::filter_matches;
///
/// assert!(filter_matches("automation/presence/+", "automation/presence/phone"));
/// assert!(!filter_matches("automation/presence/+", "automation/presence"));
/// assert!(filter_matches("zigbee2mqtt/#", "zigbee2mqtt/kitchen/kettle"));
/// ```
#[must_use]
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut topic_levels = topic.split('/');

    for level in filter.split('/') {
        match level {
            "#" => return true,
            "+" => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            exact => {
                if topic_levels.next() != Some(exact) {
                    return false;
                }
            }
        }
    }

    topic_levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::telemetry::handler;

    #[test]
    fn exact_match() {
        assert!(filter_matches("a/b", "a/b"));
        assert!(!filter_matches("a/b", "a/c"));
        assert!(!filter_matches("a/b", "a/b/c"));
        assert!(!filter_matches("a/b/c", "a/b"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(filter_matches("a/+/c", "a/b/c"));
        assert!(!filter_matches("a/+/c", "a/b/d"));
        assert!(!filter_matches("a/+", "a/b/c"));
        // An empty level still counts as a level.
        assert!(filter_matches("a/+", "a/"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(filter_matches("#", "anything/at/all"));
        assert!(filter_matches("a/#", "a/b/c"));
        assert!(filter_matches("a/#", "a"));
        assert!(!filter_matches("a/#", "b/c"));
    }

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            handler(move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn routes_to_matching_handlers() {
        let router = TopicRouter::new();
        let (exact, exact_handler) = counter();
        let (wild, wild_handler) = counter();
        router.add("zigbee2mqtt/kitchen/kettle", exact_handler);
        router.add("zigbee2mqtt/#", wild_handler);

        let delivered = router.route(&Message::new("zigbee2mqtt/kitchen/kettle", "{}", false));
        assert_eq!(delivered, 2);
        router.route(&Message::new("zigbee2mqtt/bridge/devices", "[]", true));

        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(wild.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_stops_delivery() {
        let router = TopicRouter::new();
        let (count, h) = counter();
        let id = router.add("a/b", h);

        assert_eq!(router.remove(id).as_deref(), Some("a/b"));
        assert!(router.remove(id).is_none());
        assert!(router.is_empty());

        router.route(&Message::new("a/b", "x", false));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let router = Arc::new(TopicRouter::new());
        let slot = Arc::new(parking_lot::Mutex::new(None));

        let router_in = Arc::clone(&router);
        let slot_in = Arc::clone(&slot);
        let id = router.add(
            "a/b",
            handler(move |_| {
                if let Some(id) = slot_in.lock().take() {
                    router_in.remove(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        assert_eq!(router.route(&Message::new("a/b", "x", false)), 1);
        assert_eq!(router.len(), 0);
    }

    #[test]
    fn filters_are_distinct() {
        let router = TopicRouter::new();
        router.add("a/#", handler(|_| {}));
        router.add("a/#", handler(|_| {}));
        router.add("b", handler(|_| {}));

        assert_eq!(router.filters(), vec!["a/#".to_string(), "b".to_string()]);
        assert!(router.has_filter("b"));
        assert!(!router.has_filter("c"));
    }

    #[test]
    fn route_to_single_subscription() {
        let router = TopicRouter::new();
        let (first, h1) = counter();
        let (second, h2) = counter();
        let id = router.add("a/+", h1);
        router.add("a/+", h2);

        assert!(router.route_to(id, &Message::new("a/x", "", true)));
        assert!(!router.route_to(id, &Message::new("b/x", "", true)));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }
}
