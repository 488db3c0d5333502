//! Egress rotation for the rate-limited search phase.
//!
//! The [`RotationController`] is created per search phase and owned by the
//! pipeline for that phase only. It decides when to rotate (every N records,
//! or immediately on a rate-limit signal), drives the [`VpnControl`] seam,
//! and paces requests. Rotation failures never abort a run: after too many in
//! a row the controller degrades and the phase continues unrotated.

mod controller;
mod vpn;

pub use controller::{
    RotationController, RotationMode, RotationSettings, RotationState, RotationTrigger,
};
pub use vpn::{ExpressVpnCli, VpnControl, VpnError};
