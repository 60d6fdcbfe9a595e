// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ambient-light hysteresis.
//!
//! [`LightClassifier`] is the pure state machine, [`DarknessMonitor`] wires
//! it to a confirmation timer and publishes confirmed changes on
//! `automation/darkness/{room}`, and [`DarknessReaction`] mirrors that topic
//! into a bridge flag.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Expiry, ResettableTimer};
use crate::error::Result;
use crate::integration::FlagBridge;
use crate::telemetry::{self, DarknessPayload, Message, SubscriptionId, Telemetry, topics};

/// Default time a contradicting reading must persist before it is committed.
pub const DEFAULT_CONFIRMATION: Duration = Duration::from_secs(5 * 60);

/// Illuminance thresholds forming the hysteresis band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Readings below this suggest darkness.
    pub dark_enter: u32,
    /// Readings above this suggest light.
    pub light_enter: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dark_enter: 23_000,
            light_enter: 25_000,
        }
    }
}

/// What the caller must do with the confirmation timer after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightDecision {
    /// First sample: the state is committed immediately.
    Commit(bool),
    /// A contradiction started: start the confirmation timer.
    StartTimer,
    /// The contradiction went away: cancel the timer.
    CancelTimer,
    /// Nothing changes.
    Keep,
}

/// Hysteresis classifier for illuminance samples.
///
/// # Examples
///
/// ```
/// use homehub_lib::automation::{LightClassifier, LightDecision, Thresholds};
///
/// let mut classifier = LightClassifier::new(Thresholds::default());
/// assert_eq!(classifier.sample(30_000), LightDecision::Commit(false));
/// assert_eq!(classifier.sample(20_000), LightDecision::StartTimer);
/// assert_eq!(classifier.sample(30_000), LightDecision::CancelTimer);
/// assert_eq!(classifier.confirm(), None);
/// assert_eq!(classifier.is_dark(), Some(false));
/// ```
#[derive(Debug, Clone)]
pub struct LightClassifier {
    thresholds: Thresholds,
    confirmed: Option<bool>,
    could_be_dark: bool,
    pending: bool,
}

impl LightClassifier {
    /// Creates a classifier that has seen no sample yet.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            confirmed: None,
            could_be_dark: false,
            pending: false,
        }
    }

    /// Returns the confirmed state, `None` before the first sample.
    #[must_use]
    pub fn is_dark(&self) -> Option<bool> {
        self.confirmed
    }

    /// Returns whether a contradiction is waiting for confirmation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Feeds one illuminance sample.
    pub fn sample(&mut self, lux: u32) -> LightDecision {
        let Some(dark) = self.confirmed else {
            let dark = lux <= self.thresholds.light_enter;
            self.confirmed = Some(dark);
            self.could_be_dark = dark;
            self.pending = false;
            return LightDecision::Commit(dark);
        };

        let suggests = if lux > self.thresholds.light_enter {
            Some(false)
        } else if lux < self.thresholds.dark_enter {
            Some(true)
        } else {
            None
        };

        match suggests {
            Some(candidate) if candidate != dark => {
                if self.pending {
                    // The running countdown keeps its original deadline.
                    LightDecision::Keep
                } else {
                    self.could_be_dark = candidate;
                    self.pending = true;
                    LightDecision::StartTimer
                }
            }
            // Matches the confirmed state, or inside the band.
            _ => {
                self.could_be_dark = dark;
                if std::mem::take(&mut self.pending) {
                    LightDecision::CancelTimer
                } else {
                    LightDecision::Keep
                }
            }
        }
    }

    /// Commits the pending contradiction when its timer elapses.
    ///
    /// Returns the new confirmed state, or `None` if nothing was pending.
    pub fn confirm(&mut self) -> Option<bool> {
        if !std::mem::take(&mut self.pending) {
            return None;
        }
        self.confirmed = Some(self.could_be_dark);
        self.confirmed
    }
}

struct MonitorInner {
    classifier: Mutex<LightClassifier>,
    bus: Arc<dyn Telemetry>,
    topic: String,
}

impl MonitorInner {
    fn publish(&self, is_dark: bool) {
        tracing::info!(topic = %self.topic, is_dark, "Darkness changed");
        let bus = Arc::clone(&self.bus);
        let topic = self.topic.clone();
        tokio::spawn(async move {
            let payload = DarknessPayload::now(is_dark);
            if let Err(e) = telemetry::publish_json(bus.as_ref(), &topic, &payload, true).await {
                tracing::warn!(topic = %topic, error = %e, "Failed to publish darkness");
            }
        });
    }

    fn on_timer(&self, expiry: &Expiry) {
        let mut classifier = self.classifier.lock();
        // Samples reset the timer under this lock, so a countdown that is
        // still current here cannot have been overtaken.
        if !expiry.is_current() {
            return;
        }
        if let Some(is_dark) = classifier.confirm() {
            self.publish(is_dark);
        }
    }
}

/// Classifies the illuminance of one room and publishes confirmed changes.
pub struct DarknessMonitor {
    inner: Arc<MonitorInner>,
    timer: ResettableTimer,
}

impl DarknessMonitor {
    /// Creates a monitor for `room` with the default thresholds and
    /// confirmation delay.
    #[must_use]
    pub fn new(room: &str, bus: Arc<dyn Telemetry>) -> Self {
        Self::with_settings(room, bus, Thresholds::default(), DEFAULT_CONFIRMATION)
    }

    /// Creates a monitor with explicit settings.
    #[must_use]
    pub fn with_settings(
        room: &str,
        bus: Arc<dyn Telemetry>,
        thresholds: Thresholds,
        confirmation: Duration,
    ) -> Self {
        let inner = Arc::new(MonitorInner {
            classifier: Mutex::new(LightClassifier::new(thresholds)),
            bus,
            topic: topics::darkness(room),
        });
        let weak: Weak<MonitorInner> = Arc::downgrade(&inner);
        let timer = ResettableTimer::new(confirmation, move |expiry| {
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(expiry);
            }
        });
        Self { inner, timer }
    }

    /// Returns the topic confirmed changes are published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Returns the confirmed state.
    #[must_use]
    pub fn is_dark(&self) -> Option<bool> {
        self.inner.classifier.lock().is_dark()
    }

    /// Feeds one illuminance sample.
    pub fn observe(&self, lux: u32) {
        // Timer calls stay under the classifier lock so they cannot
        // interleave with a concurrent sample.
        let mut classifier = self.inner.classifier.lock();
        let decision = classifier.sample(lux);
        tracing::debug!(topic = %self.inner.topic, lux, ?decision, "Illuminance sample");

        match decision {
            LightDecision::Commit(is_dark) => {
                self.timer.stop();
                self.inner.publish(is_dark);
            }
            LightDecision::StartTimer => self.timer.reset(),
            LightDecision::CancelTimer => {
                self.timer.stop();
            }
            LightDecision::Keep => {}
        }
    }

    /// Cancels a pending confirmation.
    pub fn stop(&self) {
        self.timer.stop();
    }
}

impl std::fmt::Debug for DarknessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarknessMonitor")
            .field("topic", &self.inner.topic)
            .field("classifier", &*self.inner.classifier.lock())
            .finish_non_exhaustive()
    }
}

/// Mirrors a room's darkness into a bridge flag.
#[derive(Debug)]
pub struct DarknessReaction {
    bus: Arc<dyn Telemetry>,
    subscription: SubscriptionId,
}

impl DarknessReaction {
    /// Subscribes to the darkness topic of `room`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn start(
        bus: Arc<dyn Telemetry>,
        room: &str,
        bridge: Arc<dyn FlagBridge>,
        flag: u32,
    ) -> Result<Self> {
        let handler = telemetry::handler(move |message: &Message| {
            if message.is_empty() {
                return;
            }
            let payload: DarknessPayload = match message.json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring darkness payload");
                    return;
                }
            };
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                if let Err(e) = bridge.set_flag(flag, payload.is_dark).await {
                    tracing::warn!(flag, error = %e, "Failed to set darkness flag");
                }
            });
        });

        let subscription = bus.subscribe(&topics::darkness(room), handler).await?;
        Ok(Self { bus, subscription })
    }

    /// Removes the subscription.
    pub async fn stop(self) {
        self.bus.unsubscribe(self.subscription).await;
    }
}
