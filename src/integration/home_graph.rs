// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HomeGraph state reporting and sync requests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::StateReporter;
use crate::error::{Result, TransportError};
use crate::fulfillment::CloudState;

/// HomeGraph REST client.
///
/// Requests are made on behalf of one agent user with a bearer access
/// token.
///
/// # Examples
///
/// ```no_run
/// use std::collections::BTreeMap;
/// use homehub_lib::fulfillment::CloudState;
/// use homehub_lib::integration::{HomeGraph, StateReporter};
///
/// # async fn example() -> homehub_lib::Result<()> {
/// let graph = HomeGraph::new("alice", "access-token")?;
/// graph.request_sync().await?;
///
/// let mut states = BTreeMap::new();
/// states.insert("kitchen/kettle".to_string(), CloudState::new(true).record_on_off(true));
/// graph.report_state(states).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HomeGraph {
    base_url: String,
    agent_user_id: String,
    token: String,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportRequest<'a> {
    request_id: String,
    event_id: String,
    agent_user_id: &'a str,
    payload: serde_json::Value,
}

impl HomeGraph {
    /// Public HomeGraph endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://homegraph.googleapis.com";

    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a client for the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(agent_user_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL, agent_user_id, token)
    }

    /// Creates a client for an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_base_url(
        base_url: impl Into<String>,
        agent_user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent_user_id: agent_user_id.into(),
            token: token.into(),
            client,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/v1/devices:{method}", self.base_url)
    }

    async fn post<T: Serialize + Sync>(&self, method: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StateReporter for HomeGraph {
    async fn request_sync(&self) -> Result<()> {
        tracing::debug!(agent = %self.agent_user_id, "Requesting sync");
        self.post("requestSync", &json!({ "agentUserId": self.agent_user_id }))
            .await
    }

    async fn report_state(&self, states: BTreeMap<String, CloudState>) -> Result<()> {
        tracing::debug!(devices = states.len(), "Reporting state");
        let request = ReportRequest {
            request_id: Uuid::new_v4().to_string(),
            event_id: Uuid::new_v4().to_string(),
            agent_user_id: &self.agent_user_id,
            payload: json!({ "devices": { "states": states } }),
        };
        self.post("reportStateAndNotification", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_method_urls() {
        let graph = HomeGraph::with_base_url("http://127.0.0.1:9000/", "alice", "t").unwrap();
        assert_eq!(graph.url("requestSync"), "http://127.0.0.1:9000/v1/devices:requestSync");
    }

    #[test]
    fn report_request_wire_shape() {
        let request = ReportRequest {
            request_id: "r".to_string(),
            event_id: "e".to_string(),
            agent_user_id: "alice",
            payload: json!({}),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"requestId": "r", "eventId": "e", "agentUserId": "alice", "payload": {}})
        );
    }
}
