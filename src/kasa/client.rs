// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TCP client for Kasa outlets.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::codec;
use super::message::{KasaReply, KasaRequest};
use crate::error::{Error, Result, TransportError};

/// Port every Kasa outlet listens on.
pub const DEFAULT_PORT: u16 = 9999;

/// Budget for one complete exchange (connect, write, read).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Replies larger than this are treated as a protocol violation.
const MAX_REPLY_LEN: usize = 64 * 1024;

/// Client for one Kasa outlet.
///
/// Each call opens a fresh connection, sends one encrypted request and reads
/// one encrypted reply. Failures are never retried here.
///
/// # Examples
///
/// ```no_run
/// use homehub_lib::kasa::{KasaClient, KasaRequest};
///
/// # async fn example() -> homehub_lib::Result<()> {
/// let client = KasaClient::new("192.168.1.20");
/// let reply = client.send(&KasaRequest::get_sysinfo()).await?;
/// println!("relay on: {}", reply.sysinfo()?.is_on());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KasaClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl KasaClient {
    /// Creates a client for the outlet at `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the exchange timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sends `request` and returns the decoded reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the socket fails or the exchange
    /// exceeds the timeout, and [`Error::Malformed`] if the reply is not
    /// valid JSON.
    pub async fn send(&self, request: &KasaRequest) -> Result<KasaReply> {
        let frame = codec::encrypt(&request.to_bytes()?);

        let plain = tokio::time::timeout(self.timeout, self.exchange(&frame))
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "{}:{} did not answer within {:?}",
                    self.host, self.port, self.timeout
                ))
            })??;

        tracing::debug!(
            host = %self.host,
            reply = %String::from_utf8_lossy(&plain),
            "Kasa reply"
        );

        Ok(KasaReply::from_bytes(&plain)?)
    }

    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::Io)?;

        stream.write_all(frame).await.map_err(TransportError::Io)?;

        let mut header = [0u8; codec::HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(TransportError::Io)?;
        let len = codec::declared_len(&header).map_err(TransportError::Codec)?;
        if len > MAX_REPLY_LEN {
            return Err(Error::Transport(TransportError::ConnectionFailed(format!(
                "reply of {len} bytes exceeds {MAX_REPLY_LEN}"
            ))));
        }

        let mut body = vec![0u8; len];
        stream
            .read_exact(&mut body)
            .await
            .map_err(TransportError::Io)?;

        Ok(codec::decrypt_body(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let client = KasaClient::new("10.0.0.2");
        assert_eq!(client.host(), "10.0.0.2");
        assert_eq!(client.port(), DEFAULT_PORT);

        let client = client.with_port(10_000).with_timeout(Duration::from_millis(50));
        assert_eq!(client.port(), 10_000);
        assert_eq!(client.timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Bind then drop to obtain a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = KasaClient::new("127.0.0.1").with_port(port);
        let err = client.send(&KasaRequest::get_sysinfo()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
