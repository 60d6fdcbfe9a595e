// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ntfy push notifications.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::Notifier;
use crate::error::{Result, TransportError};

/// Public ntfy server.
pub const DEFAULT_BASE_URL: &str = "https://ntfy.sh";

/// Notifier posting to an ntfy topic.
#[derive(Debug, Clone)]
pub struct Ntfy {
    url: String,
    client: Client,
}

impl Ntfy {
    /// Creates a notifier for `topic` on the public server.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(topic: &str) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, topic)
    }

    /// Creates a notifier for `topic` on the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: &str, topic: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                urlencoding::encode(topic)
            ),
            client,
        })
    }

    /// Returns the topic URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn presence_message(home: bool) -> (&'static str, &'static str) {
    if home {
        (
            "Home",
            "broadcast, Set as away, extras.cmd=presence, extras.state=0, clear=true",
        )
    } else {
        (
            "Away",
            "broadcast, Set as home, extras.cmd=presence, extras.state=1, clear=true",
        )
    }
}

#[async_trait]
impl Notifier for Ntfy {
    async fn presence(&self, home: bool) -> Result<()> {
        let (body, actions) = presence_message(home);
        tracing::debug!(url = %self.url, body, "Sending presence notification");

        let response = self
            .client
            .post(&self.url)
            .header("Title", "Presence")
            .header("Tags", "house")
            .header("Actions", actions)
            .header("Priority", "1")
            .body(body)
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
