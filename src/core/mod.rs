/// Core roam test logic
///
/// Everything here is independent of the concrete controller and capture
/// transport:
/// - Station, attenuator and BSSID identifiers
/// - Pair and ramp scheduling
/// - RF environment control and telemetry polling
/// - Roam detection and result aggregation
/// - The iteration controller tying them together
pub mod aggregate;
pub mod detector;
pub mod error;
pub mod rf;
pub mod runner;
pub mod schedule;
pub mod task_manager;
pub mod telemetry;
pub mod types;

pub use aggregate::{RoamTotals, RunAggregate};
pub use detector::{IterationResult, RoamDetector, RoamEvent};
pub use error::{RoamError, RunAborted};
pub use runner::{Collaborators, IterationController, RunOutput, RunPhase, RunSettings};
pub use schedule::{build_pairs, AttenuatorPair, RampSchedule};
pub use types::{AttenuatorId, Bssid, StationId};
