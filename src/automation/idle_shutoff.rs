// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Appliance auto-off.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::ResettableTimer;

/// Default idle time before an appliance is switched off.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Turns an appliance off after it has been on for a fixed time.
///
/// Feed every reported on/off state to [`observe`](Self::observe): an "on"
/// report (re)starts the countdown, an "off" report stops it. On expiry the
/// off action runs once and nothing is rescheduled until the next "on".
/// Reports and expiry are serialised, so an "on" that arrives while the
/// countdown is firing always suppresses the off action.
#[derive(Debug)]
pub struct IdleShutoff {
    gate: Arc<Mutex<()>>,
    timer: ResettableTimer,
}

impl IdleShutoff {
    /// Creates a stopped shutoff that calls `switch_off` on expiry.
    pub fn new<F>(timeout: Duration, switch_off: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let gate = Arc::new(Mutex::new(()));
        let expiry_gate = Arc::clone(&gate);
        let timer = ResettableTimer::new(timeout, move |expiry| {
            let _gate = expiry_gate.lock();
            if expiry.is_current() {
                switch_off();
            }
        });
        Self { gate, timer }
    }

    /// Feeds a reported state.
    pub fn observe(&self, on: bool) {
        let _gate = self.gate.lock();
        if on {
            self.timer.reset();
        } else {
            self.timer.stop();
        }
    }

    /// Cancels any pending shutoff.
    pub fn stop(&self) {
        let _gate = self.gate.lock();
        self.timer.stop();
    }

    /// Returns whether a shutoff is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }
}
