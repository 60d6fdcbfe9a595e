// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection.
//!
//! # Examples
//!
//! ```no_run
//! use homehub_lib::telemetry::MqttBus;
//!
//! # async fn example() -> homehub_lib::Result<()> {
//! let bus = MqttBus::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("hub", "password")
//!     .build()
//!     .await?;
//!
//! if bus.is_connected() {
//!     println!("Connected to MQTT broker");
//! }
//! bus.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio::sync::oneshot;

use super::{Handler, Message, SubscriptionId, Telemetry, TopicRouter};
use crate::error::{Result, TransportError};

/// Delay before polling the event loop again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct MqttBusConfig {
    host: String,
    port: u16,
    client_id: String,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl Default for MqttBusConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            client_id: format!("homehub_{}", std::process::id()),
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// [`Telemetry`] over an MQTT broker.
///
/// One broker subscription is placed per distinct filter, however many
/// handlers share it, and removed when its last handler goes away. All
/// traffic uses QoS 1. The event loop keeps polling after connection
/// errors, so rumqttc reconnects on its own; filters are subscribed again
/// on every new session.
#[derive(Clone)]
pub struct MqttBus {
    inner: Arc<MqttBusInner>,
}

struct MqttBusInner {
    client: AsyncClient,
    router: TopicRouter,
    config: MqttBusConfig,
    connected: AtomicBool,
}

impl MqttBus {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MqttBusBuilder {
        MqttBusBuilder::default()
    }

    /// Returns whether the broker connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Disconnects from the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner
            .client
            .disconnect()
            .await
            .map_err(TransportError::Mqtt)?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn resubscribe(&self) {
        for filter in self.inner.router.filters() {
            if let Err(e) = self
                .inner
                .client
                .subscribe(filter.as_str(), QoS::AtLeastOnce)
                .await
            {
                tracing::warn!(filter = %filter, error = %e, "Failed to resubscribe");
            }
        }
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Telemetry for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retained: bool) -> Result<()> {
        tracing::debug!(
            topic = %topic,
            payload = %String::from_utf8_lossy(&payload),
            retained,
            "Publishing"
        );
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, retained, payload)
            .await
            .map_err(TransportError::Mqtt)?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<SubscriptionId> {
        let first = !self.inner.router.has_filter(filter);
        let id = self.inner.router.add(filter, handler);

        // Retained messages are replayed by the broker on every subscribe, so
        // a second handler on the same filter subscribes again to see them.
        if let Err(e) = self.inner.client.subscribe(filter, QoS::AtLeastOnce).await {
            self.inner.router.remove(id);
            return Err(TransportError::Mqtt(e).into());
        }
        tracing::debug!(filter = %filter, first, "Subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let Some(filter) = self.inner.router.remove(id) else {
            return;
        };
        if self.inner.router.has_filter(&filter) {
            return;
        }
        if let Err(e) = self.inner.client.unsubscribe(filter.as_str()).await {
            tracing::warn!(filter = %filter, error = %e, "Failed to unsubscribe");
        }
    }
}

/// Builder for [`MqttBus`].
#[derive(Debug, Default)]
pub struct MqttBusBuilder {
    config: MqttBusConfig,
}

impl MqttBusBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the client id (default: `homehub_<pid>`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Connects to the broker and starts the event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the host is missing or no connection acknowledgement
    /// arrives within the connection timeout.
    pub async fn build(self) -> Result<MqttBus> {
        if self.config.host.is_empty() {
            return Err(
                TransportError::InvalidAddress("MQTT broker host is required".to_string()).into(),
            );
        }

        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);
        if let Some((ref username, ref password)) = self.config.credentials {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        let bus = MqttBus {
            inner: Arc::new(MqttBusInner {
                client,
                router: TopicRouter::new(),
                config: self.config.clone(),
                connected: AtomicBool::new(false),
            }),
        };

        let (connack_tx, connack_rx) = oneshot::channel();
        tokio::spawn(handle_events(event_loop, bus.clone(), connack_tx));

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    "Connected to MQTT broker"
                );
                Ok(bus)
            }
            Ok(Err(_)) => Err(TransportError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )
            .into()),
            Err(_) => Err(TransportError::ConnectionFailed(format!(
                "MQTT connection timeout after {}s",
                timeout.as_secs()
            ))
            .into()),
        }
    }
}

async fn handle_events(mut event_loop: EventLoop, bus: MqttBus, connack_tx: oneshot::Sender<()>) {
    use rumqttc::{Event, Packet};

    let mut connack_tx = Some(connack_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                bus.inner.connected.store(true, Ordering::Release);
                match connack_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => {
                        tracing::info!("Reconnected to MQTT broker");
                        let bus = bus.clone();
                        tokio::spawn(async move { bus.resubscribe().await });
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = Message::new(publish.topic, publish.payload.to_vec(), publish.retain);
                tracing::debug!(
                    topic = %message.topic,
                    payload = %message.payload_str(),
                    "MQTT message received"
                );
                bus.inner.router.route(&message);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                bus.inner.connected.store(false, Ordering::Release);
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                bus.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                bus.inner.connected.store(false, Ordering::Release);
                if connack_tx.is_some() {
                    // Never connected: let build() report the failure.
                    break;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_values() {
        let builder = MqttBusBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials.is_none());
        assert!(builder.config.client_id.starts_with("homehub_"));
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn builder_chain() {
        let builder = MqttBusBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .client_id("hub")
            .credentials("admin", "secret")
            .connection_timeout(Duration::from_secs(15));

        assert_eq!(builder.config.host, "192.168.1.50");
        assert_eq!(builder.config.port, 8883);
        assert_eq!(builder.config.client_id, "hub");
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn missing_host_fails() {
        let err = MqttBusBuilder::default().build().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::InvalidAddress(_))
        ));
    }
}
