// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Caller authentication.
//!
//! The assistant sends the user's bearer credential with every request. The
//! [`Authenticator`] exchanges it for a user name through an
//! [`IdentityLookup`] and caches the answer per raw credential, so only the
//! first request of a session pays for the round trip.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::AuthError;

/// Resolves a credential to a user name.
#[async_trait]
pub trait IdentityLookup: fmt::Debug + Send + Sync {
    /// Returns the user name for the raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the credential is refused or the lookup
    /// fails.
    async fn lookup(&self, authorization: &str) -> Result<String, AuthError>;
}

/// Identity provider userinfo endpoint.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
#[derive(serde::Deserialize)]
struct UserInfo {
    #[serde(default)]
    preferred_username: String,
}

#[cfg(feature = "http")]
impl UserInfoClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a client for the userinfo endpoint at `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(crate::error::TransportError::Http)?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl IdentityLookup for UserInfoClient {
    async fn lookup(&self, authorization: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?;
        if info.preferred_username.is_empty() {
            return Err(AuthError::EmptyIdentity);
        }
        Ok(info.preferred_username)
    }
}

#[derive(Debug)]
struct CachedIdentity {
    user: String,
    expires: Instant,
}

/// Caching front of an [`IdentityLookup`].
#[derive(Debug)]
pub struct Authenticator {
    lookup: Arc<dyn IdentityLookup>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedIdentity>>,
}

impl Authenticator {
    /// How long a resolved identity is reused.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

    /// Creates an authenticator with the default cache lifetime.
    #[must_use]
    pub fn new(lookup: Arc<dyn IdentityLookup>) -> Self {
        Self::with_ttl(lookup, Self::DEFAULT_TTL)
    }

    /// Creates an authenticator with a custom cache lifetime.
    #[must_use]
    pub fn with_ttl(lookup: Arc<dyn IdentityLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredential`] without consulting the
    /// lookup when no credential is given, otherwise whatever the lookup
    /// fails with. Failures are not cached.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<String, AuthError> {
        let credential = match authorization.map(str::trim) {
            Some(credential) if !credential.is_empty() => credential,
            _ => return Err(AuthError::MissingCredential),
        };

        let now = Instant::now();
        if let Some(cached) = self.cache.lock().get(credential)
            && cached.expires > now
        {
            return Ok(cached.user.clone());
        }

        let user = self.lookup.lookup(credential).await?;
        tracing::debug!(user = %user, "Resolved caller identity");

        let mut cache = self.cache.lock();
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires > now);
        cache.insert(
            credential.to_string(),
            CachedIdentity {
                user: user.clone(),
                expires: now + self.ttl,
            },
        );
        Ok(user)
    }

    /// Returns the number of cached identities, expired ones included.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityLookup for CountingLookup {
        async fn lookup(&self, authorization: &str) -> Result<String, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match authorization {
                "Bearer good" => Ok("alice".to_string()),
                _ => Err(AuthError::Rejected(403)),
            }
        }
    }

    fn authenticator() -> (Arc<CountingLookup>, Authenticator) {
        let lookup = Arc::new(CountingLookup::default());
        let auth = Authenticator::new(Arc::clone(&lookup) as Arc<dyn IdentityLookup>);
        (lookup, auth)
    }

    #[tokio::test]
    async fn missing_credential_skips_lookup() {
        let (lookup, auth) = authenticator();
        assert_eq!(auth.authenticate(None).await, Err(AuthError::MissingCredential));
        assert_eq!(auth.authenticate(Some("  ")).await, Err(AuthError::MissingCredential));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caches_for_ttl() {
        let (lookup, auth) = authenticator();

        assert_eq!(auth.authenticate(Some("Bearer good")).await.unwrap(), "alice");
        assert_eq!(auth.authenticate(Some("Bearer good")).await.unwrap(), "alice");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Authenticator::DEFAULT_TTL + Duration::from_secs(1)).await;
        assert_eq!(auth.authenticate(Some("Bearer good")).await.unwrap(), "alice");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(auth.cached(), 1);
    }

    #[tokio::test]
    async fn rejections_are_not_cached() {
        let (lookup, auth) = authenticator();
        assert_eq!(auth.authenticate(Some("Bearer bad")).await, Err(AuthError::Rejected(403)));
        assert_eq!(auth.authenticate(Some("Bearer bad")).await, Err(AuthError::Rejected(403)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(auth.cached(), 0);
    }
}
