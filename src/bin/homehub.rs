// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Home automation hub.
//!
//! Loads the configuration, connects to the broker, registers the manual
//! devices, starts zigbee discovery and the automations, then serves the
//! fulfillment endpoint.
//!
//! # Usage
//!
//! ```bash
//! homehub [config.toml]
//! ```
//!
//! The configuration path defaults to `homehub.toml`. Log verbosity follows
//! `RUST_LOG` (default `info`).

use std::env;
use std::sync::Arc;

use homehub_lib::automation::{
    ApplianceActivation, DarknessReaction, FrontDoor, MixerRemote, PresenceReaction,
    PresenceService,
};
use homehub_lib::config::HubConfig;
use homehub_lib::device::{Computer, KasaOutlet};
use homehub_lib::discovery::{DiscoveryOptions, ZigbeeDiscovery};
use homehub_lib::fulfillment::{
    Authenticator, FulfillmentEngine, FulfillmentService, UserInfoClient,
};
use homehub_lib::integration::{
    FlagBridge, HomeGraph, HueBridge, Notifier, Ntfy, StateReporter,
};
use homehub_lib::registry::Registry;
use homehub_lib::telemetry::{MqttBus, Telemetry, topics};
use homehub_lib::{DeviceIdentity, server};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "homehub.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = HubConfig::load(&path)?;
    tracing::info!(config = %path, "Configuration loaded");

    let mut mqtt = MqttBus::builder()
        .host(config.mqtt.host.clone())
        .port(config.mqtt.port);
    if let Some(client_id) = &config.mqtt.client_id {
        mqtt = mqtt.client_id(client_id.clone());
    }
    if let (Some(user), Some(password)) = (&config.mqtt.username, &config.mqtt.password) {
        mqtt = mqtt.credentials(user.clone(), password.clone());
    }
    let bus: Arc<dyn Telemetry> = Arc::new(mqtt.build().await?);

    let registry = Arc::new(Registry::new());
    for (identity, host) in &config.kasa.outlets {
        registry
            .add_manual(Arc::new(KasaOutlet::new(identity.as_str(), host.clone())))
            .await;
    }
    for (identity, computer) in &config.computers {
        registry
            .add_manual(Arc::new(Computer::new(identity.as_str(), computer.url.clone())?))
            .await;
    }
    tracing::info!(devices = registry.len(), "Manual devices registered");

    let prefix = config.zigbee.prefix.as_str();
    let mut discovery = DiscoveryOptions::new()
        .with_prefix(prefix)
        .with_kettle_idle_timeout(config.automation.kettle_idle())
        .with_confirm_timeout(config.fulfillment.confirm_timeout());
    match (&config.homegraph.agent_user_id, &config.homegraph.token) {
        (Some(agent), Some(token)) => {
            let graph = HomeGraph::with_base_url(&config.homegraph.base_url, agent, token)?;
            discovery = discovery.with_reporter(Arc::new(graph) as Arc<dyn StateReporter>);
        }
        _ => tracing::info!("HomeGraph not configured, state reporting disabled"),
    }
    let _discovery = ZigbeeDiscovery::start(Arc::clone(&bus), Arc::clone(&registry), discovery)
        .await?;

    let presence = PresenceService::start(Arc::clone(&bus)).await?;
    let _frontdoor = FrontDoor::start(
        Arc::clone(&bus),
        &topics::zigbee_state(prefix, &config.automation.frontdoor),
        Arc::clone(&presence),
        config.automation.frontdoor_timeout(),
    )
    .await?;
    let _mixer = MixerRemote::start(
        Arc::clone(&bus),
        &topics::zigbee_state(prefix, &config.automation.remote),
        Arc::clone(&registry),
        DeviceIdentity::new(&config.automation.mixer),
        DeviceIdentity::new(&config.automation.speakers),
    )
    .await?;
    let _appliances = ApplianceActivation::start(Arc::clone(&bus), Arc::clone(&registry)).await?;

    let hue: Option<Arc<dyn FlagBridge>> = match (&config.hue.ip, &config.hue.token) {
        (Some(ip), Some(token)) => {
            Some(Arc::new(HueBridge::new(ip, token)?) as Arc<dyn FlagBridge>)
        }
        _ => {
            tracing::info!("Hue bridge not configured, flag reactions disabled");
            None
        }
    };
    let ntfy: Option<Arc<dyn Notifier>> = match &config.ntfy.topic {
        Some(topic) => {
            let ntfy = Ntfy::with_base_url(&config.ntfy.base_url, topic)?;
            Some(Arc::new(ntfy) as Arc<dyn Notifier>)
        }
        None => {
            tracing::info!("ntfy topic not configured, presence notifications disabled");
            None
        }
    };

    let _darkness = match &hue {
        Some(bridge) => Some(
            DarknessReaction::start(
                Arc::clone(&bus),
                &config.hue.darkness_room,
                Arc::clone(bridge),
                config.hue.darkness_flag,
            )
            .await?,
        ),
        None => None,
    };
    let _presence_reaction = match (&hue, &ntfy) {
        (Some(bridge), Some(notifier)) => Some(
            PresenceReaction::start(
                Arc::clone(&bus),
                Arc::clone(&registry),
                Arc::clone(bridge),
                Arc::clone(notifier),
                config.hue.presence_flag,
            )
            .await?,
        ),
        _ => None,
    };

    let lookup = Arc::new(UserInfoClient::new(config.fulfillment.userinfo_url.clone())?);
    let service = Arc::new(FulfillmentService::with_authenticator(
        FulfillmentEngine::new(Arc::clone(&registry)),
        Authenticator::with_ttl(lookup, config.fulfillment.identity_cache_ttl()),
    ));

    let listener = TcpListener::bind(&config.fulfillment.listen).await?;
    server::serve(listener, service).await?;
    Ok(())
}
