// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command confirmation rendezvous.
//!
//! A device that confirms commands asynchronously (through its telemetry
//! state topic) owns a [`Confirmation`]. Before issuing a command the caller
//! arms it and gets a [`PendingCommand`]; the telemetry handler then calls
//! [`Confirmation::confirm`] with the reported state, which resolves the
//! pending command. Arming discards any confirmation still outstanding, so a
//! stale report can never satisfy a newer command.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Single-slot confirmation channel owned by a device.
#[derive(Debug, Default)]
pub struct Confirmation {
    slot: Mutex<Option<oneshot::Sender<bool>>>,
}

impl Confirmation {
    /// Creates an unarmed confirmation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the slot and returns the pending command waiting on it.
    ///
    /// Any previously armed command is abandoned.
    #[must_use]
    pub fn arm(&self) -> PendingCommand {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock() = Some(tx);
        PendingCommand { rx }
    }

    /// Delivers a confirmed state to the armed command, if any.
    ///
    /// Returns `true` if a waiting command received the state.
    pub fn confirm(&self, state: bool) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(state).is_ok(),
            None => false,
        }
    }

    /// Returns whether a command is currently waiting.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// A command waiting for its confirmation.
#[derive(Debug)]
pub struct PendingCommand {
    rx: oneshot::Receiver<bool>,
}

impl PendingCommand {
    /// Wait budget used by the fulfillment engine.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Waits up to `timeout` for the confirmed state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time or the command
    /// was superseded by a newer one.
    pub async fn wait(self, timeout: Duration) -> Result<bool> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) | Err(_) => Err(Error::Timeout(timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_resolves_pending() {
        let confirmation = Confirmation::new();
        let pending = confirmation.arm();
        assert!(confirmation.is_armed());

        assert!(confirmation.confirm(true));
        assert!(!confirmation.is_armed());
        assert!(pending.wait(Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let confirmation = Confirmation::new();
        let pending = confirmation.arm();

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1000)));
    }

    #[test]
    fn confirm_without_waiter_is_dropped() {
        let confirmation = Confirmation::new();
        assert!(!confirmation.confirm(false));
    }

    #[tokio::test]
    async fn rearming_abandons_previous_command() {
        let confirmation = Confirmation::new();
        let first = confirmation.arm();
        let second = confirmation.arm();

        confirmation.confirm(true);

        assert!(first.wait(Duration::from_millis(10)).await.is_err());
        assert!(second.wait(Duration::from_millis(10)).await.unwrap());
    }

    #[tokio::test]
    async fn report_before_arming_does_not_satisfy_command() {
        let confirmation = Confirmation::new();
        confirmation.confirm(true);

        let pending = confirmation.arm();
        assert!(confirmation.is_armed());
        drop(pending);
    }
}
