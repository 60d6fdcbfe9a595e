// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the HTTP fulfillment endpoint.

#![cfg(feature = "server")]

use std::sync::Arc;

use async_trait::async_trait;
use homehub_lib::device::{Device, KasaOutlet};
use homehub_lib::error::AuthError;
use homehub_lib::fulfillment::{FulfillmentService, IdentityLookup};
use homehub_lib::registry::Registry;
use homehub_lib::server::{self, ASSISTANT_PATH};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Accepts exactly one token.
#[derive(Debug)]
struct SingleToken;

#[async_trait]
impl IdentityLookup for SingleToken {
    async fn lookup(&self, authorization: &str) -> Result<String, AuthError> {
        if authorization == "Bearer good" {
            Ok("alice".to_string())
        } else {
            Err(AuthError::Rejected(403))
        }
    }
}

async fn start() -> String {
    let registry = Arc::new(Registry::new());
    registry
        .add_manual(Arc::new(KasaOutlet::new("living_room/lamp", "127.0.0.1")) as Arc<dyn Device>)
        .await;
    let service = Arc::new(FulfillmentService::new(registry, Arc::new(SingleToken)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, service));

    format!("http://{addr}{ASSISTANT_PATH}")
}

fn sync_body() -> Value {
    json!({"requestId": "r-1", "inputs": [{"intent": "action.devices.SYNC"}]})
}

#[tokio::test]
async fn sync_over_http() {
    let url = start().await;

    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", "Bearer good")
        .json(&sync_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requestId"], "r-1");
    assert_eq!(body["payload"]["agentUserId"], "alice");
    assert_eq!(body["payload"]["devices"][0]["id"], "living_room/lamp");
}

#[tokio::test]
async fn missing_authorization_is_401() {
    let url = start().await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&sync_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn rejected_token_keeps_provider_status() {
    let url = start().await;

    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", "Bearer bad")
        .json(&sync_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn garbage_body_is_400() {
    let url = start().await;

    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", "Bearer good")
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}
