// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reactive behaviours driven by telemetry.
//!
//! The state machines ([`PresenceAggregator`], [`LightClassifier`],
//! [`IdleShutoff`]) are independent of any transport and share the
//! [`ResettableTimer`] primitive. The remaining types subscribe them to the
//! bus and fan their decisions out to devices and vendor collaborators.

mod appliance;
mod darkness;
mod frontdoor;
mod idle_shutoff;
mod presence;
mod timer;

pub use appliance::{ACTION_BRIGHTNESS_UP, ACTION_ON, ApplianceActivation, MixerRemote};
pub use darkness::{
    DEFAULT_CONFIRMATION, DarknessMonitor, DarknessReaction, LightClassifier, LightDecision,
    Thresholds,
};
pub use frontdoor::{DEFAULT_DOOR_TIMEOUT, FRONTDOOR_SOURCE, FrontDoor};
pub use idle_shutoff::{DEFAULT_IDLE_TIMEOUT, IdleShutoff};
pub use presence::{PresenceAggregator, PresenceReaction, PresenceService};
pub use timer::{Expiry, ResettableTimer};
