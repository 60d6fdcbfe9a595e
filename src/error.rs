// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the hub.
//!
//! The top-level [`Error`] mirrors how failures are handled at runtime:
//! unknown devices are logged and skipped, unsupported capabilities become
//! protocol error codes, missing confirmations mark a device offline for one
//! response, and transport or payload problems degrade to a logged event.
//! Only configuration errors are allowed to stop the process, and only at
//! startup.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// No device with the given identity is registered.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device or command does not support the requested operation.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// No confirmation arrived within the wait budget.
    #[error("no confirmation within {0} ms")]
    Timeout(u64),

    /// Talking to a device or collaborator failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(#[from] ParseError),

    /// The fulfillment caller could not be authenticated.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Startup configuration is unusable.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for a missing capability on a device.
    pub(crate) fn unsupported(device: impl std::fmt::Display, capability: &str) -> Self {
        Self::Unsupported(format!("{device} is not {capability}"))
    }
}

/// Errors talking to devices, the telemetry bus or REST collaborators.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A binary frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The remote side answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The device answered but reported a failure code.
    #[error("device answered with error code {0}")]
    DeviceError(i64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Framing errors of the Kasa binary protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer cannot even hold the 4-byte length prefix.
    #[error("frame of {0} bytes is shorter than the 4-byte length prefix")]
    FrameTooShort(usize),

    /// The length prefix announces more bytes than the buffer holds.
    #[error("frame declares {declared} payload bytes but only {available} are present")]
    Truncated {
        /// Length announced by the prefix.
        declared: usize,
        /// Payload bytes actually present after the prefix.
        available: usize,
    },
}

/// Errors decoding JSON payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but did not have the expected shape.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),
}

/// Errors resolving a bearer credential to a user identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The request carried no credential.
    #[error("no authorization provided")]
    MissingCredential,

    /// The identity provider refused the credential.
    #[error("identity provider rejected the credential with status {0}")]
    Rejected(u16),

    /// The identity provider answered without a usable user name.
    #[error("identity provider returned an empty user name")]
    EmptyIdentity,

    /// The identity provider could not be reached or answered garbage.
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

impl AuthError {
    /// HTTP status to answer the fulfillment caller with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCredential => 401,
            Self::Rejected(status) => *status,
            Self::EmptyIdentity | Self::Lookup(_) => 500,
        }
    }
}

/// Errors in the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::HubConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required value is missing or invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display() {
        let err = CodecError::FrameTooShort(3);
        assert_eq!(
            err.to_string(),
            "frame of 3 bytes is shorter than the 4-byte length prefix"
        );
    }

    #[test]
    fn codec_error_converts_to_transport() {
        let err: Error = TransportError::from(CodecError::FrameTooShort(0)).into();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Codec(CodecError::FrameTooShort(0)))
        ));
    }

    #[test]
    fn unsupported_names_device_and_capability() {
        let err = Error::unsupported("kitchen/kettle", "activatable");
        assert_eq!(err.to_string(), "not supported: kitchen/kettle is not activatable");
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::MissingCredential.status_code(), 401);
        assert_eq!(AuthError::Rejected(403).status_code(), 403);
        assert_eq!(AuthError::EmptyIdentity.status_code(), 500);
        assert_eq!(AuthError::Lookup("boom".into()).status_code(), 500);
    }

    #[test]
    fn timeout_display() {
        assert_eq!(Error::Timeout(1000).to_string(), "no confirmation within 1000 ms");
    }
}
