/// Collaborator interfaces consumed by the roam engine
///
/// The engine never talks to the network directly. It drives three seams:
/// - [`DeviceController`]: per-port telemetry and attenuator control
/// - [`CaptureAgent`]: the remote packet sniffer
/// - [`Pacer`]: real-time pacing between ramp steps
///
/// Production implementations live in [`crate::api::lanforge`],
/// [`crate::api::capture`] and [`crate::utils::sleep`]; the in-memory
/// [`crate::api::sim::SimulatedBench`] implements all three.
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use crate::core::types::{AttenuatorId, StationId};

/// Raw per-port state as reported by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortState {
    /// Unnormalized BSSID text, empty when not associated.
    pub ap: String,
    pub signal: Option<i32>,
}

/// One entry of the controller's attenuator inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttenuatorInfo {
    pub serial: AttenuatorId,
    pub state: String,
}

impl AttenuatorInfo {
    /// Phantom attenuators are remembered by the controller but not attached.
    pub fn is_phantom(&self) -> bool {
        self.state.eq_ignore_ascii_case("phantom")
    }
}

/// A monitor-mode port created on a sniffing radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Radio port, e.g. `1.1.wiphy0`.
    pub radio: StationId,
    /// Name of the monitor port, which is also the capture interface.
    pub name: String,
    /// Channel number, or `AUTO` to leave the radio's channel alone.
    pub channel: String,
    /// Frequency in MHz, when pinned.
    pub frequency: Option<u32>,
}

/// Remote device controller API.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Read `ap` and `signal` for a station.
    ///
    /// `Ok(None)` means the controller has no record of the station; `Err`
    /// means the controller could not be reached.
    async fn port_state(&self, station: &StationId) -> Result<Option<PortState>>;

    /// Set every channel of an attenuator to `value`.
    async fn set_attenuation(&self, serial: &AttenuatorId, value: u32) -> Result<()>;

    /// List every attenuator the controller knows about.
    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>>;

    /// Delete the monitor port if it exists, then create it fresh on its radio.
    async fn create_monitor(&self, monitor: &MonitorSpec) -> Result<()>;
}

/// Remote packet capture process.
#[async_trait]
pub trait CaptureAgent: Send + Sync {
    async fn start_capture(&self, interface: &str, output_path: &str) -> Result<()>;

    async fn stop_capture(&self) -> Result<()>;

    /// Copy a remote capture file into `local_dir`, returning the local path.
    async fn fetch_file(&self, remote_path: &str, local_dir: &Path) -> Result<PathBuf>;
}

/// Blocks the run until a deadline passes.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn wait_until(&self, deadline: Instant);
}
