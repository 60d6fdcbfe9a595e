// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Voice-assistant fulfillment protocol.
//!
//! The assistant talks to the hub with three intents:
//!
//! - **SYNC** lists every [`CloudSyncable`](crate::device::CloudSyncable)
//!   device
//! - **QUERY** reports the state of named devices
//! - **EXECUTE** runs commands and groups the per-device outcomes into
//!   success, offline and error buckets
//!
//! [`FulfillmentService`] is the entry point: it authenticates the caller
//! and dispatches the single input of a request to the
//! [`FulfillmentEngine`]. It does not depend on any HTTP framework.
//!
//! In the other direction, a
//! [`StateReporter`](crate::integration::StateReporter) pushes state changes
//! and sync requests to the assistant.

mod auth;
mod device;
mod engine;
mod intent;
mod service;
mod state;

#[cfg(feature = "http")]
pub use auth::UserInfoClient;
pub use auth::{Authenticator, IdentityLookup};
pub use device::{CloudDevice, DeviceInfo, DeviceName, DeviceType, Trait};
pub use engine::{
    CommandResult, ExecuteResponse, FulfillmentEngine, FulfillmentResponse, QueryResponse,
    ResponsePayload, SyncResponse,
};
pub use intent::{
    COMMAND_ACTIVATE_SCENE, COMMAND_ON_OFF, COMMAND_START_STOP, CloudCommand, Command,
    DeviceHandle, ExecutePayload, Execution, FulfillmentRequest, INTENT_EXECUTE, INTENT_QUERY,
    INTENT_SYNC, Intent, IntentError, QueryPayload, RawInput,
};
pub use service::{FulfillmentError, FulfillmentService};
pub use state::{CloudState, ErrorCode, ExecuteOutcome, Status};
