// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SYNC, QUERY and EXECUTE against the registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use super::{
    CloudDevice, CloudState, ErrorCode, ExecuteOutcome, ExecutePayload, Execution, QueryPayload,
    Status,
};
use crate::capabilities::Capability;
use crate::device::Device;
use crate::registry::Registry;

/// Response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    /// Correlation id copied from the request.
    pub request_id: String,
    /// Intent-specific payload.
    pub payload: ResponsePayload,
}

/// Payload of a response, shaped by the intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// SYNC result.
    Sync(SyncResponse),
    /// QUERY result.
    Query(QueryResponse),
    /// EXECUTE result.
    Execute(ExecuteResponse),
}

/// SYNC result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// User the device list belongs to.
    pub agent_user_id: String,
    /// Every cloud-visible device.
    pub devices: Vec<CloudDevice>,
}

/// QUERY result, keyed by device id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    /// State of every device that was found.
    pub devices: BTreeMap<String, CloudState>,
}

/// EXECUTE result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecuteResponse {
    /// One entry per outcome group.
    pub commands: Vec<CommandResult>,
}

impl ExecuteResponse {
    /// Returns the group with the given status and error code.
    #[must_use]
    pub fn group(&self, status: Status, error_code: Option<ErrorCode>) -> Option<&CommandResult> {
        self.commands
            .iter()
            .find(|c| c.status == status && c.error_code == error_code)
    }
}

/// Devices sharing one outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Device ids in this group.
    pub ids: Vec<String>,
    /// Shared status.
    pub status: Status,
    /// Shared error code, for `ERROR` groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Merged state, for the `SUCCESS` group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<CloudState>,
}

/// Buckets per-device outcomes into the response groups.
///
/// Each id lands in exactly one group: success when the outcome carries no
/// error and the device answered, offline when it did not answer, error
/// otherwise. Groups keep the order in which their first id appeared.
#[derive(Debug, Default)]
struct OutcomeGroups {
    success: Vec<String>,
    merged: Option<CloudState>,
    offline: Vec<String>,
    errors: Vec<(ErrorCode, Vec<String>)>,
}

impl OutcomeGroups {
    fn push(&mut self, id: String, outcome: &ExecuteOutcome) {
        match outcome.error {
            Some(code) => match self.errors.iter().position(|(c, _)| *c == code) {
                Some(slot) => self.errors[slot].1.push(id),
                None => self.errors.push((code, vec![id])),
            },
            None if outcome.online => {
                self.success.push(id);
                self.merged
                    .get_or_insert_with(|| CloudState::new(true))
                    .merge(&outcome.state);
            }
            None => self.offline.push(id),
        }
    }

    fn into_response(self) -> ExecuteResponse {
        let mut commands = Vec::new();
        if !self.success.is_empty() {
            commands.push(CommandResult {
                ids: self.success,
                status: Status::Success,
                error_code: None,
                states: self.merged,
            });
        }
        if !self.offline.is_empty() {
            commands.push(CommandResult {
                ids: self.offline,
                status: Status::Offline,
                error_code: None,
                states: None,
            });
        }
        for (code, ids) in self.errors {
            commands.push(CommandResult {
                ids,
                status: Status::Error,
                error_code: Some(code),
                states: None,
            });
        }
        ExecuteResponse { commands }
    }
}

/// Runs the three intents against a [`Registry`].
///
/// Devices are always reached through their [`crate::device::CloudSyncable`]
/// probe. Ids that are not registered are logged and left out of the
/// response.
#[derive(Debug, Clone)]
pub struct FulfillmentEngine {
    registry: Arc<Registry>,
}

impl FulfillmentEngine {
    /// Creates an engine over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Describes every cloud-syncable device.
    #[must_use]
    pub fn sync(&self, agent_user_id: &str) -> SyncResponse {
        let devices = self
            .registry
            .filter(Capability::CloudSyncable)
            .iter()
            .filter_map(|device| device.as_cloud_syncable().map(|cloud| cloud.describe()))
            .collect::<Vec<_>>();

        tracing::debug!(user = %agent_user_id, devices = devices.len(), "SYNC");
        SyncResponse {
            agent_user_id: agent_user_id.to_string(),
            devices,
        }
    }

    /// Reports the state of the requested devices.
    ///
    /// States are read concurrently.
    pub async fn query(&self, payload: &QueryPayload) -> QueryResponse {
        let mut tasks = JoinSet::new();
        for handle in &payload.devices {
            let Some(device) = self.resolve(&handle.id) else {
                continue;
            };
            let id = handle.id.clone();
            tasks.spawn(async move {
                let Some(cloud) = device.as_cloud_syncable() else {
                    tracing::debug!(device = %id, "Skipping device that is not cloud-syncable");
                    return None;
                };
                Some((id, cloud.query().await))
            });
        }

        let mut response = QueryResponse::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((id, state))) => {
                    response.devices.insert(id, state);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "QUERY task failed"),
            }
        }
        response
    }

    /// Runs every (command, device) pair and groups the outcomes.
    ///
    /// Devices run concurrently, each with its own confirmation window. The
    /// executions addressed to one device run in request order and the last
    /// outcome is the one reported.
    pub async fn execute(&self, payload: &ExecutePayload) -> ExecuteResponse {
        let mut plan: Vec<(String, Vec<Execution>)> = Vec::new();
        for command in &payload.commands {
            for handle in &command.devices {
                let slot = match plan.iter().position(|(id, _)| *id == handle.id) {
                    Some(slot) => slot,
                    None => {
                        plan.push((handle.id.clone(), Vec::new()));
                        plan.len() - 1
                    }
                };
                plan[slot].1.extend(command.execution.iter().cloned());
            }
        }

        let mut tasks = JoinSet::new();
        for (index, (id, executions)) in plan.into_iter().enumerate() {
            let Some(device) = self.resolve(&id) else {
                continue;
            };
            tasks.spawn(async move {
                let outcome = run_device(device.as_ref(), &executions).await;
                (index, id, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, id, Some(outcome))) => outcomes.push((index, id, outcome)),
                Ok((_, id, None)) => tracing::debug!(device = %id, "No execution for device"),
                Err(e) => tracing::error!(error = %e, "EXECUTE task failed"),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut groups = OutcomeGroups::default();
        for (_, id, outcome) in outcomes {
            tracing::debug!(
                device = %id,
                online = outcome.online,
                error = ?outcome.error,
                "EXECUTE outcome"
            );
            groups.push(id, &outcome);
        }
        groups.into_response()
    }

    fn resolve(&self, id: &str) -> Option<Arc<dyn Device>> {
        match self.registry.lookup(id) {
            Ok(device) => Some(device),
            Err(e) => {
                tracing::warn!(device = %id, error = %e, "Skipping unknown device");
                None
            }
        }
    }
}

async fn run_device(device: &dyn Device, executions: &[Execution]) -> Option<ExecuteOutcome> {
    let Some(cloud) = device.as_cloud_syncable() else {
        tracing::warn!(device = %device.identity(), "Device is not cloud-syncable");
        return Some(ExecuteOutcome::failed(ErrorCode::ActionNotAvailable, true));
    };

    let mut last = None;
    for execution in executions {
        last = Some(cloud.execute(execution).await);
    }
    last
}
