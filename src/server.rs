// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP edge of the fulfillment service.
//!
//! A single route, `POST /assistant`, hands the `Authorization` header and
//! the raw body to [`FulfillmentService::handle`].

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use tokio::net::TcpListener;

use crate::error::{Result, TransportError};
use crate::fulfillment::FulfillmentService;

/// Path the assistant posts to.
pub const ASSISTANT_PATH: &str = "/assistant";

/// Builds the router.
pub fn router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route(ASSISTANT_PATH, post(assistant))
        .with_state(service)
}

/// Serves the router on `listener` until the task is cancelled.
///
/// # Errors
///
/// Returns a transport error if the server fails.
pub async fn serve(listener: TcpListener, service: Arc<FulfillmentService>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Fulfillment endpoint listening");
    }
    axum::serve(listener, router(service))
        .await
        .map_err(TransportError::Io)?;
    Ok(())
}

async fn assistant(
    State(service): State<Arc<FulfillmentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match service.handle(authorization, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.message().to_string()).into_response()
        }
    }
}
