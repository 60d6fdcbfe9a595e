// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kasa request and reply payloads.
//!
//! Both directions nest the sub-command under a `system` key:
//!
//! ```json
//! {"system":{"set_relay_state":{"state":1}}}
//! {"system":{"set_relay_state":{"err_code":0}}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A request to an outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KasaRequest {
    system: SystemRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SystemRequest {
    SetRelayState { state: u8 },
    GetSysinfo {},
}

impl KasaRequest {
    /// Switches the relay.
    #[must_use]
    pub fn set_relay_state(on: bool) -> Self {
        Self {
            system: SystemRequest::SetRelayState { state: u8::from(on) },
        }
    }

    /// Reads the system information, including the relay state.
    #[must_use]
    pub const fn get_sysinfo() -> Self {
        Self {
            system: SystemRequest::GetSysinfo {},
        }
    }

    /// Serializes the request to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A reply from an outlet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KasaReply {
    #[serde(default)]
    system: SystemReply,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct SystemReply {
    #[serde(default)]
    set_relay_state: Option<RelayState>,
    #[serde(default)]
    get_sysinfo: Option<SysInfo>,
}

/// Reply to `set_relay_state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RelayState {
    /// Zero on success.
    #[serde(default)]
    pub err_code: i64,
}

/// Reply to `get_sysinfo`.
///
/// Only the fields the hub reads are decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SysInfo {
    /// 1 when the relay is closed.
    #[serde(default)]
    pub relay_state: u8,
    /// Zero on success.
    #[serde(default)]
    pub err_code: i64,
    /// Alias set in the vendor app.
    #[serde(default)]
    pub alias: Option<String>,
    /// Hardware model.
    #[serde(default)]
    pub model: Option<String>,
    /// Firmware version.
    #[serde(default)]
    pub sw_ver: Option<String>,
    /// Hardware version.
    #[serde(default)]
    pub hw_ver: Option<String>,
}

impl SysInfo {
    /// Returns whether the relay is closed.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.relay_state == 1
    }
}

impl KasaReply {
    /// Parses a decrypted reply.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if the bytes are not a reply object.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The `set_relay_state` section.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnexpectedFormat`] if the reply lacks it.
    pub fn relay_state(&self) -> Result<RelayState, ParseError> {
        self.system
            .set_relay_state
            .ok_or_else(|| ParseError::UnexpectedFormat("reply has no set_relay_state".into()))
    }

    /// The `get_sysinfo` section.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnexpectedFormat`] if the reply lacks it.
    pub fn sysinfo(&self) -> Result<&SysInfo, ParseError> {
        self.system
            .get_sysinfo
            .as_ref()
            .ok_or_else(|| ParseError::UnexpectedFormat("reply has no get_sysinfo".into()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_relay_state_request_shape() {
        let on = serde_json::to_value(KasaRequest::set_relay_state(true)).unwrap();
        assert_eq!(on, json!({"system": {"set_relay_state": {"state": 1}}}));

        let off = serde_json::to_value(KasaRequest::set_relay_state(false)).unwrap();
        assert_eq!(off, json!({"system": {"set_relay_state": {"state": 0}}}));
    }

    #[test]
    fn get_sysinfo_request_shape() {
        let bytes = KasaRequest::get_sysinfo().to_bytes().unwrap();
        assert_eq!(bytes, br#"{"system":{"get_sysinfo":{}}}"#);
    }

    #[test]
    fn parses_sysinfo_reply() {
        let payload = concat!(
            r#"{"system":{"get_sysinfo":{"alias":"Lamp","model":"HS100(EU)","#,
            r#""relay_state":1,"err_code":0,"rssi":-60}}}"#
        );
        let reply = KasaReply::from_bytes(payload.as_bytes()).unwrap();

        let info = reply.sysinfo().unwrap();
        assert!(info.is_on());
        assert_eq!(info.err_code, 0);
        assert_eq!(info.alias.as_deref(), Some("Lamp"));
        assert!(reply.relay_state().is_err());
    }

    #[test]
    fn parses_relay_reply() {
        let reply =
            KasaReply::from_bytes(br#"{"system":{"set_relay_state":{"err_code":-3}}}"#).unwrap();
        assert_eq!(reply.relay_state().unwrap().err_code, -3);
        assert!(matches!(reply.sysinfo(), Err(ParseError::UnexpectedFormat(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(KasaReply::from_bytes(b"not json"), Err(ParseError::Json(_))));
    }
}
