// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kasa smart-plug protocol.
//!
//! Kasa outlets speak JSON over a raw TCP socket on port 9999. Every frame
//! carries a 4-byte big-endian length of the plaintext followed by the
//! payload obfuscated with an autokey XOR cipher (see [`codec`]).
//!
//! - [`codec`]: frame encryption and decryption
//! - [`message`]: request and reply shapes
//! - [`KasaClient`]: one request/response exchange per connection

pub mod codec;
mod client;
mod message;

pub use client::{KasaClient, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use message::{KasaReply, KasaRequest, RelayState, SysInfo};
