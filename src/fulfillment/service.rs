// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Framework-agnostic request handling.

use std::sync::Arc;

use thiserror::Error;

use super::{
    Authenticator, FulfillmentEngine, FulfillmentRequest, FulfillmentResponse, IdentityLookup,
    Intent, ResponsePayload,
};
use crate::error::AuthError;
use crate::registry::Registry;

/// A request that is answered with an HTTP error status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct FulfillmentError {
    status: u16,
    message: String,
}

impl FulfillmentError {
    /// Creates an error answered with `status`.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// HTTP status to answer with.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<AuthError> for FulfillmentError {
    fn from(err: AuthError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

/// Authenticates fulfillment requests and runs them through the engine.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use homehub_lib::fulfillment::{FulfillmentService, UserInfoClient};
/// use homehub_lib::registry::Registry;
///
/// # async fn example() -> homehub_lib::Result<()> {
/// let registry = Arc::new(Registry::new());
/// let userinfo = Arc::new(UserInfoClient::new("https://login.example.com/userinfo")?);
/// let service = FulfillmentService::new(registry, userinfo);
///
/// let body = br#"{"requestId":"1","inputs":[{"intent":"action.devices.SYNC"}]}"#;
/// match service.handle(Some("Bearer abc"), body).await {
///     Ok(response) => println!("{}", serde_json::to_string(&response).unwrap()),
///     Err(e) => println!("answer {}", e.status()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FulfillmentService {
    auth: Authenticator,
    engine: FulfillmentEngine,
}

impl FulfillmentService {
    /// Creates a service with the default identity cache.
    #[must_use]
    pub fn new(registry: Arc<Registry>, lookup: Arc<dyn IdentityLookup>) -> Self {
        Self::with_authenticator(FulfillmentEngine::new(registry), Authenticator::new(lookup))
    }

    /// Creates a service from its parts.
    #[must_use]
    pub fn with_authenticator(engine: FulfillmentEngine, auth: Authenticator) -> Self {
        Self { auth, engine }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &FulfillmentEngine {
        &self.engine
    }

    /// Handles one request body.
    ///
    /// The caller is authenticated before the body is looked at, so a
    /// request without a valid credential never reaches the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`FulfillmentError`] carrying the HTTP status to answer
    /// with: 400 for undecodable bodies, anything but exactly one input, or
    /// an unknown intent; the authentication status otherwise.
    pub async fn handle(
        &self,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<FulfillmentResponse, FulfillmentError> {
        let user = self.auth.authenticate(authorization).await.map_err(|e| {
            tracing::warn!(error = %e, "Rejected fulfillment request");
            FulfillmentError::from(e)
        })?;

        let request: FulfillmentRequest = serde_json::from_slice(body)
            .map_err(|e| FulfillmentError::bad_request(format!("invalid request body: {e}")))?;

        let [input] = request.inputs.as_slice() else {
            return Err(FulfillmentError::bad_request(format!(
                "expected exactly one input, got {}",
                request.inputs.len()
            )));
        };

        let intent = input
            .decode()
            .map_err(|e| FulfillmentError::bad_request(e.to_string()))?;

        tracing::info!(
            request = %request.request_id,
            user = %user,
            intent = %input.intent,
            "Fulfillment request"
        );

        let payload = match intent {
            Intent::Sync => ResponsePayload::Sync(self.engine.sync(&user)),
            Intent::Query(query) => ResponsePayload::Query(self.engine.query(&query).await),
            Intent::Execute(execute) => {
                ResponsePayload::Execute(self.engine.execute(&execute).await)
            }
        };

        Ok(FulfillmentResponse {
            request_id: request.request_id,
            payload,
        })
    }
}
