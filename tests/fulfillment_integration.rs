// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end fulfillment tests over an in-process bus.
//!
//! Kettles are discovered from a bridge snapshot. A responder plays the
//! zigbee bridge for the kettles that should confirm their commands.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use homehub_lib::discovery::{DiscoveryOptions, ZigbeeDiscovery};
use homehub_lib::error::AuthError;
use homehub_lib::fulfillment::{
    CloudState, ErrorCode, FulfillmentResponse, FulfillmentService, IdentityLookup,
    ResponsePayload, Status,
};
use homehub_lib::integration::StateReporter;
use homehub_lib::registry::Registry;
use homehub_lib::telemetry::{LocalBus, Message, Telemetry, handler};
use parking_lot::Mutex;
use serde_json::{Value, json};

const CONFIRM_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct FixedUser;

#[async_trait]
impl IdentityLookup for FixedUser {
    async fn lookup(&self, _authorization: &str) -> Result<String, AuthError> {
        Ok("alice".to_string())
    }
}

struct Hub {
    bus: Arc<LocalBus>,
    registry: Arc<Registry>,
    service: FulfillmentService,
    _discovery: ZigbeeDiscovery,
}

/// Starts discovery, publishes a snapshot and waits until it is applied.
async fn hub(snapshot: Value, expected: usize) -> Hub {
    hub_with(snapshot, expected, DiscoveryOptions::new()).await
}

async fn hub_with(snapshot: Value, expected: usize, options: DiscoveryOptions) -> Hub {
    let bus = Arc::new(LocalBus::new());
    let registry = Arc::new(Registry::new());

    let discovery = ZigbeeDiscovery::start(
        Arc::clone(&bus) as Arc<dyn Telemetry>,
        Arc::clone(&registry),
        options.with_confirm_timeout(CONFIRM_TIMEOUT),
    )
    .await
    .unwrap();

    bus.publish(
        "zigbee2mqtt/bridge/devices",
        serde_json::to_vec(&snapshot).unwrap(),
        true,
    )
    .await
    .unwrap();

    for _ in 0..100 {
        if registry.dynamic_len() == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registry.dynamic_len(), expected, "snapshot was not applied");

    let service = FulfillmentService::new(Arc::clone(&registry), Arc::new(FixedUser));
    Hub {
        bus,
        registry,
        service,
        _discovery: discovery,
    }
}

/// Echoes every command of `friendly_name` back on its state topic.
async fn respond_for(bus: &Arc<LocalBus>, friendly_name: &str) {
    let echo = Arc::clone(bus);
    let state_topic = format!("zigbee2mqtt/{friendly_name}");
    bus.subscribe(
        &format!("zigbee2mqtt/{friendly_name}/set"),
        handler(move |message| {
            echo.inject(&Message::new(state_topic.clone(), message.payload.clone(), false));
        }),
    )
    .await
    .unwrap();
}

fn kettle(name: &str) -> Value {
    json!({
        "ieee_address": format!("0x{name}"),
        "friendly_name": name,
        "description": "Kettle",
        "manufacturer": "Tuya",
        "model_id": "TS0001",
        "software_build_id": "1.0.4"
    })
}

fn on_off(on: bool) -> Value {
    json!({"command": "action.devices.commands.OnOff", "params": {"on": on}})
}

async fn request(hub: &Hub, body: Value) -> Value {
    let response: FulfillmentResponse = hub
        .service
        .handle(Some("Bearer token"), &serde_json::to_vec(&body).unwrap())
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

fn group<'a>(response: &'a Value, status: &str) -> Vec<&'a Value> {
    response["payload"]["commands"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["status"] == status)
        .collect()
}

// ============================================================================
// SYNC
// ============================================================================

mod sync {
    use super::*;

    #[tokio::test]
    async fn lists_cloud_syncable_devices_only() {
        let hub = hub(
            json!([
                kettle("kitchen/kettle"),
                {"friendly_name": "living/light_sensor", "description": "LightSensor"},
                {"friendly_name": "hallway/frontdoor", "description": "Door"}
            ]),
            2,
        )
        .await;

        let response = request(
            &hub,
            json!({"requestId": "s1", "inputs": [{"intent": "action.devices.SYNC"}]}),
        )
        .await;

        assert_eq!(response["requestId"], "s1");
        assert_eq!(response["payload"]["agentUserId"], "alice");

        let devices = response["payload"]["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0]["id"], "kitchen/kettle");
        assert_eq!(devices[0]["type"], "action.devices.types.KETTLE");
        assert_eq!(devices[0]["willReportState"], true);
        assert_eq!(devices[0]["roomHint"], "Kitchen");
        assert_eq!(devices[0]["deviceInfo"]["manufacturer"], "Tuya");
    }
}

// ============================================================================
// QUERY
// ============================================================================

mod query {
    use super::*;

    #[tokio::test]
    async fn reports_known_devices_and_omits_unknown() {
        let hub = hub(json!([kettle("kitchen/kettle")]), 1).await;
        hub.bus.inject(&Message::new("zigbee2mqtt/kitchen/kettle", r#"{"state":"ON"}"#, false));

        let response = request(
            &hub,
            json!({"requestId": "q1", "inputs": [{
                "intent": "action.devices.QUERY",
                "payload": {"devices": [{"id": "kitchen/kettle"}, {"id": "garage/unknown"}]}
            }]}),
        )
        .await;

        let devices = response["payload"]["devices"].as_object().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices["kitchen/kettle"],
            json!({"online": true, "status": "SUCCESS", "on": true})
        );
    }

    #[tokio::test]
    async fn omits_devices_without_cloud_state() {
        let hub = hub(
            json!([
                kettle("kitchen/kettle"),
                {"friendly_name": "living/light_sensor", "description": "LightSensor"}
            ]),
            2,
        )
        .await;

        let response = request(
            &hub,
            json!({"requestId": "q3", "inputs": [{
                "intent": "action.devices.QUERY",
                "payload": {"devices": [{"id": "living/light_sensor"}, {"id": "kitchen/kettle"}]}
            }]}),
        )
        .await;

        let devices = response["payload"]["devices"].as_object().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices.contains_key("kitchen/kettle"));
    }

    #[tokio::test]
    async fn silent_kettle_is_offline() {
        let hub = hub(json!([kettle("kitchen/kettle")]), 1).await;

        let response = request(
            &hub,
            json!({"requestId": "q2", "inputs": [{
                "intent": "action.devices.QUERY",
                "payload": {"devices": [{"id": "kitchen/kettle"}]}
            }]}),
        )
        .await;

        assert_eq!(response["payload"]["devices"]["kitchen/kettle"]["online"], false);
        assert_eq!(response["payload"]["devices"]["kitchen/kettle"]["status"], "OFFLINE");
    }
}

// ============================================================================
// EXECUTE
// ============================================================================

mod execute {
    use super::*;

    #[tokio::test]
    async fn three_outcome_groups() {
        let hub = hub(
            json!([kettle("kitchen/kettle"), kettle("office/kettle"), kettle("garage/kettle")]),
            3,
        )
        .await;
        respond_for(&hub.bus, "kitchen/kettle").await;

        let response = request(
            &hub,
            json!({"requestId": "e1", "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [
                    {
                        "devices": [{"id": "kitchen/kettle"}, {"id": "office/kettle"}],
                        "execution": [on_off(true)]
                    },
                    {
                        "devices": [{"id": "garage/kettle"}],
                        "execution": [{
                            "command": "action.devices.commands.ActivateScene",
                            "params": {}
                        }]
                    }
                ]}
            }]}),
        )
        .await;

        let commands = response["payload"]["commands"].as_array().unwrap();
        assert_eq!(commands.len(), 3);

        let success = group(&response, "SUCCESS");
        assert_eq!(success[0]["ids"], json!(["kitchen/kettle"]));
        assert_eq!(success[0]["states"], json!({"online": true, "on": true}));

        let offline = group(&response, "OFFLINE");
        assert_eq!(offline[0]["ids"], json!(["office/kettle"]));

        let error = group(&response, "ERROR");
        assert_eq!(error[0]["ids"], json!(["garage/kettle"]));
        assert_eq!(error[0]["errorCode"], "actionNotAvailable");
    }

    #[tokio::test]
    async fn timeout_does_not_change_stored_online_flag() {
        let hub = hub(json!([kettle("kitchen/kettle")]), 1).await;
        hub.bus.inject(&Message::new("zigbee2mqtt/kitchen/kettle", r#"{"state":"OFF"}"#, false));

        let response = request(
            &hub,
            json!({"requestId": "e2", "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [{
                    "devices": [{"id": "kitchen/kettle"}],
                    "execution": [on_off(true)]
                }]}
            }]}),
        )
        .await;
        assert_eq!(group(&response, "OFFLINE")[0]["ids"], json!(["kitchen/kettle"]));

        let device = hub.registry.lookup("kitchen/kettle").unwrap();
        assert!(device.as_connectivity_aware().unwrap().is_online());
    }

    #[tokio::test]
    async fn latest_outcome_wins() {
        let hub = hub(json!([kettle("kitchen/kettle")]), 1).await;
        respond_for(&hub.bus, "kitchen/kettle").await;

        let response = request(
            &hub,
            json!({"requestId": "e3", "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [
                    {
                        "devices": [{"id": "kitchen/kettle"}],
                        "execution": [on_off(true)]
                    },
                    {
                        "devices": [{"id": "kitchen/kettle"}, {"id": "nowhere/thing"}],
                        "execution": [{
                            "command": "action.devices.commands.StartStop",
                            "params": {"start": true}
                        }]
                    }
                ]}
            }]}),
        )
        .await;

        let commands = response["payload"]["commands"].as_array().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["status"], "ERROR");
        assert_eq!(commands[0]["ids"], json!(["kitchen/kettle"]));
    }

    #[tokio::test]
    async fn timeouts_run_in_parallel() {
        let hub = hub(
            json!([kettle("a/kettle"), kettle("b/kettle"), kettle("c/kettle"), kettle("d/kettle")]),
            4,
        )
        .await;

        let started = tokio::time::Instant::now();
        let response = request(
            &hub,
            json!({"requestId": "e4", "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [{
                    "devices": [
                        {"id": "a/kettle"},
                        {"id": "b/kettle"},
                        {"id": "c/kettle"},
                        {"id": "d/kettle"}
                    ],
                    "execution": [on_off(false)]
                }]}
            }]}),
        )
        .await;

        assert_eq!(
            group(&response, "OFFLINE")[0]["ids"],
            json!(["a/kettle", "b/kettle", "c/kettle", "d/kettle"])
        );
        assert!(started.elapsed() < CONFIRM_TIMEOUT * 3);
    }
}

// ============================================================================
// Typed access
// ============================================================================

#[tokio::test]
async fn typed_execute_groups() {
    let hub = hub(json!([kettle("kitchen/kettle")]), 1).await;
    respond_for(&hub.bus, "kitchen/kettle").await;

    let body = json!({"requestId": "t", "inputs": [{
        "intent": "action.devices.EXECUTE",
        "payload": {"commands": [{
            "devices": [{"id": "kitchen/kettle"}],
            "execution": [on_off(true)]
        }]}
    }]});
    let response = hub
        .service
        .handle(Some("Bearer token"), &serde_json::to_vec(&body).unwrap())
        .await
        .unwrap();

    let ResponsePayload::Execute(execute) = response.payload else {
        panic!("expected an EXECUTE payload");
    };
    assert!(execute.group(Status::Success, None).is_some());
    assert!(execute.group(Status::Error, Some(ErrorCode::ActionNotAvailable)).is_none());
}

// ============================================================================
// State reporting
// ============================================================================

mod reporting {
    use super::*;

    #[derive(Debug, Default)]
    struct Recording {
        syncs: Mutex<usize>,
        reports: Mutex<Vec<BTreeMap<String, CloudState>>>,
    }

    #[async_trait]
    impl StateReporter for Recording {
        async fn request_sync(&self) -> homehub_lib::Result<()> {
            *self.syncs.lock() += 1;
            Ok(())
        }

        async fn report_state(
            &self,
            states: BTreeMap<String, CloudState>,
        ) -> homehub_lib::Result<()> {
            self.reports.lock().push(states);
            Ok(())
        }
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never held");
    }

    #[tokio::test]
    async fn applied_snapshot_requests_sync() {
        let reporter = Arc::new(Recording::default());
        let options =
            DiscoveryOptions::new().with_reporter(Arc::clone(&reporter) as Arc<dyn StateReporter>);
        let _hub = hub_with(json!([kettle("kitchen/kettle")]), 1, options).await;

        eventually(|| *reporter.syncs.lock() == 1).await;
        assert!(reporter.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn executed_command_is_reported() {
        let reporter = Arc::new(Recording::default());
        let options =
            DiscoveryOptions::new().with_reporter(Arc::clone(&reporter) as Arc<dyn StateReporter>);
        let hub = hub_with(json!([kettle("kitchen/kettle")]), 1, options).await;
        respond_for(&hub.bus, "kitchen/kettle").await;

        let response = request(
            &hub,
            json!({"requestId": "r", "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [{
                    "devices": [{"id": "kitchen/kettle"}],
                    "execution": [on_off(true)]
                }]}
            }]}),
        )
        .await;
        assert_eq!(group(&response, "SUCCESS").len(), 1);

        eventually(|| !reporter.reports.lock().is_empty()).await;
        let reports = reporter.reports.lock().clone();
        assert_eq!(
            serde_json::to_value(&reports[0]).unwrap(),
            json!({"kitchen/kettle": {"online": true, "on": true}})
        );
    }
}
