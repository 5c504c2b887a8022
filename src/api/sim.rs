/// In-memory roaming bench
///
/// Implements the controller, capture agent and pacer seams without any
/// network. Every attenuator sits in front of one AP; a station stays on its
/// AP until that AP's attenuation reaches `roam_threshold`, then moves to the
/// AP behind the least-attenuated attenuator. Used for `--dry-run` and tests.
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::{
    api::traits::{AttenuatorInfo, CaptureAgent, DeviceController, MonitorSpec, Pacer, PortState},
    core::types::{AttenuatorId, StationId},
};

#[derive(Debug, Clone)]
struct SimAttenuator {
    value: u32,
    state: String,
    /// Raw BSSID text of the AP behind this attenuator.
    ap: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct SimStation {
    /// Attenuator whose AP the station is associated with.
    serving: Option<AttenuatorId>,
    silent: bool,
    silent_polls: u32,
}

/// A capture start/stop as seen by the bench.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureCall {
    Monitor { radio: StationId, name: String },
    Start { interface: String, path: String },
    Stop,
    Fetch { path: String },
}

#[derive(Debug, Default)]
struct BenchState {
    attenuators: BTreeMap<AttenuatorId, SimAttenuator>,
    stations: BTreeMap<StationId, SimStation>,
    writes: Vec<(AttenuatorId, u32)>,
    captures: Vec<CaptureCall>,
    capture_running: bool,
    fail_capture_start_at: Option<usize>,
    fail_capture_stop_at: Option<usize>,
    starts: usize,
    stops: usize,
    connection_loss_polls: u32,
    waits: Vec<Duration>,
}

pub struct SimulatedBench {
    roam_threshold: u32,
    state: Mutex<BenchState>,
}

impl SimulatedBench {
    pub fn new(roam_threshold: u32) -> Self {
        Self {
            roam_threshold,
            state: Mutex::new(BenchState::default()),
        }
    }

    /// Add an attached attenuator guarding the AP with BSSID `ap`.
    pub fn with_attenuator(self, serial: &str, ap: &str) -> Self {
        self.state.lock().attenuators.insert(
            AttenuatorId::new(serial),
            SimAttenuator {
                value: 0,
                state: "Connected".to_string(),
                ap: Some(ap.to_string()),
            },
        );
        self
    }

    /// Add an attenuator that is not part of the test (no AP behind it).
    pub fn with_stray_attenuator(self, serial: &str, state: &str) -> Self {
        self.state.lock().attenuators.insert(
            AttenuatorId::new(serial),
            SimAttenuator {
                value: 0,
                state: state.to_string(),
                ap: None,
            },
        );
        self
    }

    /// Add a station associated with the AP behind `serving`.
    pub fn with_station(self, id: &str, serving: &str) -> Self {
        if let Ok(id) = StationId::parse(id) {
            self.state.lock().stations.insert(
                id,
                SimStation {
                    serving: Some(AttenuatorId::new(serving)),
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Make the Nth (1-based) capture start fail.
    pub fn fail_capture_start_at(self, nth: usize) -> Self {
        self.state.lock().fail_capture_start_at = Some(nth);
        self
    }

    /// Make the Nth (1-based) capture stop fail.
    pub fn fail_capture_stop_at(self, nth: usize) -> Self {
        self.state.lock().fail_capture_stop_at = Some(nth);
        self
    }

    /// The station stops answering for good.
    pub fn silence_station(&self, id: &StationId) {
        if let Some(station) = self.state.lock().stations.get_mut(id) {
            station.silent = true;
        }
    }

    /// The station does not answer the next `polls` polls.
    pub fn mute_station_for(&self, id: &StationId, polls: u32) {
        if let Some(station) = self.state.lock().stations.get_mut(id) {
            station.silent_polls = polls;
        }
    }

    /// The next `polls` port reads fail as if the controller were unreachable.
    pub fn lose_connection_for(&self, polls: u32) {
        self.state.lock().connection_loss_polls = polls;
    }

    pub fn attenuation(&self, serial: &str) -> Option<u32> {
        self.state
            .lock()
            .attenuators
            .get(&AttenuatorId::new(serial))
            .map(|a| a.value)
    }

    pub fn writes(&self) -> Vec<(AttenuatorId, u32)> {
        self.state.lock().writes.clone()
    }

    pub fn captures(&self) -> Vec<CaptureCall> {
        self.state.lock().captures.clone()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.state.lock().waits.clone()
    }

    fn roam_if_needed(
        threshold: u32,
        attenuators: &BTreeMap<AttenuatorId, SimAttenuator>,
        station: &mut SimStation,
    ) {
        let current = station
            .serving
            .as_ref()
            .and_then(|id| attenuators.get(id))
            .map(|a| a.value);
        if matches!(current, Some(v) if v < threshold) {
            return;
        }

        let best = attenuators
            .iter()
            .filter(|(_, a)| a.ap.is_some() && a.value < threshold)
            .min_by_key(|(_, a)| a.value)
            .map(|(id, _)| id.clone());
        if best.is_some() || current.is_none() {
            station.serving = best;
        }
    }
}

#[async_trait]
impl DeviceController for SimulatedBench {
    async fn port_state(&self, station: &StationId) -> Result<Option<PortState>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.connection_loss_polls > 0 {
            state.connection_loss_polls -= 1;
            bail!("connection refused");
        }

        let Some(sim) = state.stations.get_mut(station) else {
            return Ok(None);
        };
        if sim.silent {
            return Ok(None);
        }
        if sim.silent_polls > 0 {
            sim.silent_polls -= 1;
            return Ok(None);
        }

        Self::roam_if_needed(self.roam_threshold, &state.attenuators, sim);
        let serving = sim.serving.as_ref().and_then(|id| state.attenuators.get(id));
        Ok(Some(PortState {
            ap: serving.and_then(|a| a.ap.clone()).unwrap_or_default(),
            signal: serving.map(|a| -30 - (a.value / 10) as i32),
        }))
    }

    async fn set_attenuation(&self, serial: &AttenuatorId, value: u32) -> Result<()> {
        let mut state = self.state.lock();
        let device = state
            .attenuators
            .get_mut(serial)
            .ok_or_else(|| anyhow!("no attenuator {serial}"))?;
        device.value = value;
        state.writes.push((serial.clone(), value));
        Ok(())
    }

    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>> {
        Ok(self
            .state
            .lock()
            .attenuators
            .iter()
            .map(|(serial, a)| AttenuatorInfo {
                serial: serial.clone(),
                state: a.state.clone(),
            })
            .collect())
    }

    async fn create_monitor(&self, monitor: &MonitorSpec) -> Result<()> {
        let mut state = self.state.lock();
        if state.capture_running {
            bail!("monitor {} is busy capturing", monitor.name);
        }
        state.captures.push(CaptureCall::Monitor {
            radio: monitor.radio.clone(),
            name: monitor.name.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl CaptureAgent for SimulatedBench {
    async fn start_capture(&self, interface: &str, output_path: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.starts += 1;
        if state.fail_capture_start_at == Some(state.starts) {
            bail!("ssh: connect to host port 22: Connection refused");
        }
        if state.capture_running {
            bail!("a capture is already running");
        }
        state.capture_running = true;
        state.captures.push(CaptureCall::Start {
            interface: interface.to_string(),
            path: output_path.to_string(),
        });
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.stops += 1;
        if state.fail_capture_stop_at == Some(state.stops) {
            bail!("ssh: connect to host port 22: Connection timed out");
        }
        state.capture_running = false;
        state.captures.push(CaptureCall::Stop);
        Ok(())
    }

    async fn fetch_file(&self, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
        self.state.lock().captures.push(CaptureCall::Fetch {
            path: remote_path.to_string(),
        });
        let name = Path::new(remote_path)
            .file_name()
            .ok_or_else(|| anyhow!("no file name in {remote_path}"))?;
        Ok(local_dir.join(name))
    }
}

#[async_trait]
impl Pacer for SimulatedBench {
    async fn wait_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.state.lock().waits.push(remaining);
    }
}
