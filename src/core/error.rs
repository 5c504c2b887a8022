//! Error taxonomy for a roam test run.

use std::fmt;

use crate::core::aggregate::RunAggregate;

/// Errors that end (or prevent) a roam test run.
///
/// Transient telemetry gaps are not represented here: they are absorbed by
/// the telemetry reader and only show up as reduced attempt counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoamError {
    /// A roam needs at least two attenuation points.
    TooFewAttenuators { configured: usize },

    /// A configured attenuator is not present in the live controller inventory.
    UnknownAttenuator { serial: String },

    /// The ramp parameters cannot produce a schedule.
    InvalidRamp { step: u32, max_attenuation: u32 },

    /// A station identifier is not a `shelf.resource.port` triple.
    InvalidStation { id: String },

    /// The device controller rejected or failed an attenuation write or an
    /// inventory query.
    Controller { reason: String },

    /// The packet-capture agent failed.
    Capture { action: &'static str, reason: String },

    /// An operator stop request was honored between ramp steps.
    Interrupted {
        pair: usize,
        iteration: usize,
        step: usize,
    },

    /// A result slot was committed twice, or outside the arena bounds.
    SlotOccupied { pair: usize, iteration: usize },

    /// Aggregated counts cannot correspond to the recorded events.
    Inconsistent(String),
}

impl fmt::Display for RoamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewAttenuators { configured } => write!(
                f,
                "cannot perform roaming with {configured} attenuator(s): at least two are required"
            ),
            Self::UnknownAttenuator { serial } => {
                write!(f, "attenuator {serial} is not known to the device controller")
            }
            Self::InvalidRamp {
                step,
                max_attenuation,
            } => write!(
                f,
                "invalid ramp: step {step} with maximum attenuation {max_attenuation}"
            ),
            Self::InvalidStation { id } => {
                write!(f, "station '{id}' is not a shelf.resource.port identifier")
            }
            Self::Controller { reason } => write!(f, "device controller failure: {reason}"),
            Self::Capture { action, reason } => {
                write!(f, "capture agent failed to {action}: {reason}")
            }
            Self::Interrupted {
                pair,
                iteration,
                step,
            } => write!(
                f,
                "run stopped by operator after pair {pair}, iteration {iteration}, step {step}"
            ),
            Self::SlotOccupied { pair, iteration } => write!(
                f,
                "result slot for pair {pair}, iteration {iteration} is occupied or out of range"
            ),
            Self::Inconsistent(msg) => write!(f, "internal consistency error: {msg}"),
        }
    }
}

impl std::error::Error for RoamError {}

/// A fatal failure in the middle of a run.
///
/// `partial` holds every iteration committed before the failure so callers
/// can still inspect what was measured.
#[derive(Debug)]
pub struct RunAborted {
    pub error: RoamError,
    pub partial: RunAggregate,
}

impl fmt::Display for RunAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} of {} iterations committed)",
            self.error,
            self.partial.committed(),
            self.partial.capacity()
        )
    }
}

impl std::error::Error for RunAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
