//! roamctl: attenuator-driven WiFi roaming test orchestrator
//!
//! This crate drives a LANforge controller through programmable attenuators
//! to force client stations to roam between access points, watches their
//! BSSID while it does so, and reduces the observations into roam totals.
//! A packet capture is started on a remote sniffer for every iteration.
//!
//! The public modules expose the device seams (`api`) and the run engine
//! (`core`). The CLI and boot helpers live in hidden modules to keep them out
//! of the generated documentation.

pub mod api;
#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
#[doc(hidden)]
pub mod utils;

pub use api::*;
