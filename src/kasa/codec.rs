// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kasa frame codec.
//!
//! `cipher[i] = key ^ plain[i]` with the key starting at [`INITIAL_KEY`] and
//! then taking the value of the previous cipher byte. Decryption runs the
//! same recurrence backwards, again keyed by the cipher stream.
//!
//! # Examples
//!
//! ```
//! use homehub_lib::kasa::codec;
//!
//! let frame = codec::encrypt(br#"{"system":{"get_sysinfo":{}}}"#);
//! assert_eq!(&frame[..4], &[0, 0, 0, 29]);
//!
//! let plain = codec::decrypt(&frame).unwrap();
//! assert_eq!(plain, br#"{"system":{"get_sysinfo":{}}}"#);
//! ```

use crate::error::CodecError;

/// Seed of the autokey cipher.
pub const INITIAL_KEY: u8 = 0xAB;

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Encrypts `plain` into a length-prefixed frame.
#[must_use]
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    // Frames are a few hundred bytes; the protocol cannot carry more than u32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let len = plain.len() as u32;

    let mut frame = Vec::with_capacity(HEADER_LEN + plain.len());
    frame.extend_from_slice(&len.to_be_bytes());

    let mut key = INITIAL_KEY;
    for &byte in plain {
        key ^= byte;
        frame.push(key);
    }
    frame
}

/// Reads the plaintext length announced by a frame header.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooShort`] if `frame` holds fewer than
/// [`HEADER_LEN`] bytes.
pub fn declared_len(frame: &[u8]) -> Result<usize, CodecError> {
    let header: [u8; HEADER_LEN] = frame
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(CodecError::FrameTooShort(frame.len()))?;
    Ok(u32::from_be_bytes(header) as usize)
}

/// Decrypts a length-prefixed frame.
///
/// Bytes beyond the declared length are ignored.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooShort`] for frames without a complete
/// header and [`CodecError::Truncated`] if the header announces more bytes
/// than the frame holds.
pub fn decrypt(frame: &[u8]) -> Result<Vec<u8>, CodecError> {
    let declared = declared_len(frame)?;
    let body = &frame[HEADER_LEN..];
    if body.len() < declared {
        return Err(CodecError::Truncated {
            declared,
            available: body.len(),
        });
    }
    Ok(decrypt_body(&body[..declared]))
}

/// Decrypts cipher bytes that were already separated from their header.
#[must_use]
pub fn decrypt_body(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&byte| {
            let plain = key ^ byte;
            key = byte;
            plain
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // First byte: 0xAB ^ '{' (0x7B) = 0xD0, then 0xD0 ^ '}' (0x7D) = 0xAD.
        assert_eq!(encrypt(b"{}"), vec![0, 0, 0, 2, 0xD0, 0xAD]);
    }

    #[test]
    fn empty_payload() {
        let frame = encrypt(b"");
        assert_eq!(frame, vec![0, 0, 0, 0]);
        assert_eq!(decrypt(&frame).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn large_payload() {
        let plain: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let frame = encrypt(&plain);
        assert_eq!(declared_len(&frame).unwrap(), 10_000);
        assert_eq!(decrypt(&frame).unwrap(), plain);
    }

    #[test]
    fn every_byte_value() {
        let plain: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decrypt(&encrypt(&plain)).unwrap(), plain);
    }

    #[test]
    fn short_frame_is_rejected() {
        for len in 0..HEADER_LEN {
            let frame = vec![0u8; len];
            assert_eq!(decrypt(&frame), Err(CodecError::FrameTooShort(len)));
        }
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut frame = encrypt(b"hello");
        frame.truncate(6);
        assert_eq!(
            decrypt(&frame),
            Err(CodecError::Truncated {
                declared: 5,
                available: 2
            })
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut frame = encrypt(b"abc");
        frame.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decrypt(&frame).unwrap(), b"abc");
    }
}
