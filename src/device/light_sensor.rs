// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zigbee illuminance sensor.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{Device, DeviceIdentity, ZigbeeInfo};
use crate::automation::DarknessMonitor;
use crate::error::Result;
use crate::telemetry::{self, Message, SubscriptionId, Telemetry, topics};

#[derive(Debug, Deserialize)]
struct IlluminanceReport {
    illuminance: u32,
}

/// Feeds the illuminance reports of a zigbee sensor into a
/// [`DarknessMonitor`] for the sensor's room.
///
/// The sensor has no capabilities of its own; it only exists so that its
/// subscription lives and dies with the bridge snapshot.
pub struct LightSensor {
    info: ZigbeeInfo,
    bus: Arc<dyn Telemetry>,
    monitor: DarknessMonitor,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl LightSensor {
    /// Creates the sensor and subscribes to its state topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn spawn(
        info: ZigbeeInfo,
        prefix: &str,
        bus: Arc<dyn Telemetry>,
    ) -> Result<Arc<Self>> {
        let monitor = DarknessMonitor::new(info.friendly_name.room(), Arc::clone(&bus));
        Self::with_monitor(info, prefix, bus, monitor).await
    }

    /// Like [`spawn`](Self::spawn) with a preconfigured monitor.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the subscription fails.
    pub async fn with_monitor(
        info: ZigbeeInfo,
        prefix: &str,
        bus: Arc<dyn Telemetry>,
        monitor: DarknessMonitor,
    ) -> Result<Arc<Self>> {
        let topic = topics::zigbee_state(prefix, info.friendly_name.as_str());
        let sensor = Arc::new(Self {
            info,
            bus: Arc::clone(&bus),
            monitor,
            subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&sensor);
        let id = bus
            .subscribe(
                &topic,
                telemetry::handler(move |message| {
                    if let Some(sensor) = weak.upgrade() {
                        sensor.on_report(message);
                    }
                }),
            )
            .await?;
        *sensor.subscription.lock() = Some(id);

        Ok(sensor)
    }

    /// Returns the monitor fed by this sensor.
    #[must_use]
    pub fn monitor(&self) -> &DarknessMonitor {
        &self.monitor
    }

    fn on_report(&self, message: &Message) {
        if message.is_empty() {
            return;
        }
        match message.json::<IlluminanceReport>() {
            Ok(report) => self.monitor.observe(report.illuminance),
            Err(e) => {
                let device = &self.info.friendly_name;
                tracing::debug!(device = %device, error = %e, "Report without illuminance");
            }
        }
    }
}

#[async_trait]
impl Device for LightSensor {
    fn identity(&self) -> &DeviceIdentity {
        &self.info.friendly_name
    }

    async fn teardown(&self) {
        let id = self.subscription.lock().take();
        if let Some(id) = id {
            self.bus.unsubscribe(id).await;
        }
        self.monitor.stop();
    }
}

impl std::fmt::Debug for LightSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightSensor")
            .field("identity", &self.info.friendly_name)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Capabilities;
    use crate::telemetry::{DarknessPayload, LocalBus};

    #[tokio::test]
    async fn feeds_monitor_and_publishes() {
        let bus = Arc::new(LocalBus::new());
        let sensor = LightSensor::spawn(
            ZigbeeInfo::new("living/light_sensor", "LightSensor"),
            "zigbee2mqtt",
            Arc::clone(&bus) as Arc<dyn Telemetry>,
        )
        .await
        .unwrap();

        bus.inject(&Message::new(
            "zigbee2mqtt/living/light_sensor",
            r#"{"illuminance":20000,"battery":90}"#,
            false,
        ));
        assert_eq!(sensor.monitor().is_dark(), Some(true));

        // Publishing happens on a spawned task.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let retained = bus.retained("automation/darkness/living").unwrap();
        let payload: DarknessPayload = retained.json().unwrap();
        assert!(payload.is_dark);
    }

    #[tokio::test]
    async fn identifiable_only() {
        let bus = Arc::new(LocalBus::new());
        let sensor = LightSensor::spawn(
            ZigbeeInfo::new("living/light_sensor", "LightSensor"),
            "zigbee2mqtt",
            Arc::clone(&bus) as Arc<dyn Telemetry>,
        )
        .await
        .unwrap();

        assert!(Capabilities::of(sensor.as_ref()).is_empty());
        sensor.teardown().await;
        assert_eq!(bus.subscription_count(), 0);
    }
}
