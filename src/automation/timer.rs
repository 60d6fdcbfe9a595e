// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-shot timer that can be reset or stopped at any time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Callback = Arc<dyn Fn(&Expiry) + Send + Sync>;

#[derive(Default)]
struct TimerState {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Identifies the countdown that fired.
///
/// A countdown stays current until the timer is reset or stopped. The
/// callback receives the token of its countdown; an owner that resets the
/// timer under its own lock re-checks [`is_current`](Self::is_current) under
/// that same lock before acting, so a reset racing the expiry always wins.
#[derive(Clone)]
pub struct Expiry {
    generation: u64,
    state: Arc<Mutex<TimerState>>,
}

impl Expiry {
    /// Returns whether no reset or stop happened since this countdown started.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.state.lock().generation == self.generation
    }
}

impl std::fmt::Debug for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expiry")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A single-shot timer with an expiry callback.
///
/// Every [`reset`](Self::reset) starts a new countdown and invalidates the
/// previous one; [`stop`](Self::stop) invalidates it without starting
/// another. The deadline is fixed when the countdown is started, not when
/// its task first runs.
///
/// The callback runs on a runtime worker and must not block; it spawns any
/// async follow-up. It is handed the [`Expiry`] of its countdown, which may
/// already be stale by the time the callback looks at it. Dropping the timer
/// cancels a pending countdown.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use homehub_lib::automation::ResettableTimer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let timer = ResettableTimer::new(Duration::from_secs(300), |expiry| {
///     if expiry.is_current() {
///         println!("expired");
///     }
/// });
/// timer.reset();
/// assert!(timer.is_armed());
/// timer.stop();
/// assert!(!timer.is_armed());
/// # }
/// ```
pub struct ResettableTimer {
    duration: Duration,
    callback: Callback,
    state: Arc<Mutex<TimerState>>,
}

impl ResettableTimer {
    /// Creates a stopped timer.
    pub fn new<F>(duration: Duration, on_expiry: F) -> Self
    where
        F: Fn(&Expiry) + Send + Sync + 'static,
    {
        Self {
            duration,
            callback: Arc::new(on_expiry),
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Returns the configured duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts a countdown of the configured duration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reset(&self) {
        self.reset_after(self.duration);
    }

    /// Starts a countdown of `duration`, replacing any pending one.
    pub fn reset_after(&self, duration: Duration) {
        let deadline = Instant::now() + duration;

        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if let Some(task) = state.task.take() {
            task.abort();
        }

        let expiry = Expiry {
            generation: state.generation,
            state: Arc::clone(&self.state),
        };
        let callback = Arc::clone(&self.callback);
        state.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut state = expiry.state.lock();
                if state.generation != expiry.generation {
                    return;
                }
                state.task = None;
            }
            callback(&expiry);
        }));
    }

    /// Cancels the pending countdown.
    ///
    /// Returns `true` if a countdown was pending.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        match state.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Returns whether a countdown is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.lock().task.is_some()
    }

    /// Token of the most recent countdown.
    #[cfg(test)]
    pub(crate) fn current_expiry(&self) -> Expiry {
        Expiry {
            generation: self.state.lock().generation,
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the callback as a countdown that fired with `expiry` would.
    #[cfg(test)]
    pub(crate) fn fire(&self, expiry: &Expiry) {
        (self.callback)(expiry);
    }
}

impl Drop for ResettableTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ResettableTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResettableTimer")
            .field("duration", &self.duration)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(duration: Duration) -> (ResettableTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&fired);
        let timer = ResettableTimer::new(duration, move |expiry| {
            if expiry.is_current() {
                inner.fetch_add(1, Ordering::SeqCst);
            }
        });
        (timer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_postpones_expiry() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();
        tokio::time::sleep(Duration::from_secs(45)).await;
        timer.reset();
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_expiry() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();
        assert!(timer.stop());
        assert!(!timer.stop());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let (timer, fired) = counting(Duration::from_secs(1));
        timer.reset();
        drop(timer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_overrides_duration() {
        let (timer, fired) = counting(Duration::from_secs(300));
        timer.reset_after(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.duration(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_fixed_at_reset() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();

        // The countdown task has not been polled yet.
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_at_expiry_invalidates_fired_countdown() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();
        let fired_countdown = timer.current_expiry();
        assert!(fired_countdown.is_current());

        // A reset lands between the expiry check and the callback.
        timer.reset();
        assert!(!fired_countdown.is_current());
        timer.fire(&fired_countdown);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_invalidates_fired_countdown() {
        let (timer, fired) = counting(Duration::from_secs(60));
        timer.reset();
        let fired_countdown = timer.current_expiry();

        timer.stop();
        timer.fire(&fired_countdown);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
