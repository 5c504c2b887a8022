use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use clap::ArgMatches;

use crate::{
    api::{capture::SshTarget, traits::MonitorSpec},
    core::{
        runner::RunSettings,
        schedule::{build_pairs, RampSchedule},
        types::{AttenuatorId, Bssid, StationId},
    },
};

/// Remote packet capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sniffer host; the controller host when unset
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_capture_user")]
    pub user: String,
    #[serde(default = "default_capture_port")]
    pub port: u16,
    #[serde(default = "default_capture_interface")]
    pub interface: String,
    /// Remote file path; `{iteration}` is 1-based, `{pair}` is 0-based
    #[serde(default = "default_file_template")]
    pub file_template: String,
    /// Delay after each capture start and stop, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Copy the capture files into the result directory after the run
    #[serde(default = "default_fetch")]
    pub fetch: bool,
    /// Rebuild `interface` as a monitor on `sniff_radio` before every capture
    #[serde(default = "default_manage_monitor")]
    pub manage_monitor: bool,
    #[serde(default = "default_sniff_radio")]
    pub sniff_radio: String,
    /// Sniffing channel, `AUTO` to keep the radio's current one
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Sniffing frequency in MHz
    #[serde(default)]
    pub frequency: Option<u32>,
}

fn default_capture_user() -> String {
    "lanforge".to_string()
}

fn default_capture_port() -> u16 {
    22
}

fn default_capture_interface() -> String {
    "sniffer0".to_string()
}

fn default_file_template() -> String {
    "/home/lanforge/Desktop/iteration_{iteration}_roam_{pair}.pcap".to_string()
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_fetch() -> bool {
    true
}

fn default_manage_monitor() -> bool {
    true
}

fn default_sniff_radio() -> String {
    "1.1.wiphy0".to_string()
}

fn default_channel() -> String {
    "AUTO".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: default_capture_user(),
            port: default_capture_port(),
            interface: default_capture_interface(),
            file_template: default_file_template(),
            settle_ms: default_settle_ms(),
            fetch: default_fetch(),
            manage_monitor: default_manage_monitor(),
            sniff_radio: default_sniff_radio(),
            channel: default_channel(),
            frequency: None,
        }
    }
}

/// Root configuration of a roam test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoamTestConfig {
    /// Base URL of the LANforge JSON API
    #[serde(default = "default_controller")]
    pub controller: String,
    /// Stations as `shelf.resource.port`
    #[serde(default)]
    pub stations: Vec<String>,
    /// Attenuator serials, in pairing order
    #[serde(default)]
    pub attenuators: Vec<String>,
    /// BSSIDs of the APs under test (informational)
    #[serde(default)]
    pub bssids: Vec<String>,
    #[serde(default = "default_step")]
    pub step: u32,
    #[serde(default = "default_max_attenuation")]
    pub max_attenuation: u32,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Wait after each ramp step before polling, in seconds
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
    #[serde(default = "default_max_missed_polls")]
    pub max_missed_polls: u32,
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
    #[serde(default)]
    pub capture: CaptureConfig,
}

fn default_controller() -> String {
    "http://localhost:8080".to_string()
}

fn default_step() -> u32 {
    100
}

fn default_max_attenuation() -> u32 {
    950
}

fn default_iterations() -> usize {
    2
}

fn default_wait_time_secs() -> u64 {
    30
}

fn default_max_missed_polls() -> u32 {
    3
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("roam_test_report")
}

impl Default for RoamTestConfig {
    fn default() -> Self {
        Self {
            controller: default_controller(),
            stations: Vec::new(),
            attenuators: Vec::new(),
            bssids: Vec::new(),
            step: default_step(),
            max_attenuation: default_max_attenuation(),
            iterations: default_iterations(),
            wait_time_secs: default_wait_time_secs(),
            max_missed_polls: default_max_missed_polls(),
            result_dir: default_result_dir(),
            capture: CaptureConfig::default(),
        }
    }
}

impl RoamTestConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).context("Failed to parse JSON configuration")
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse TOML configuration")
    }

    /// Read configuration from a file; `.json` files are JSON, anything else TOML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Override file values with whatever was given on the command line
    pub fn apply_matches(&mut self, matches: &ArgMatches) {
        if let Some(controller) = matches.get_one::<String>("controller") {
            self.controller = controller.clone();
        }
        if let Some(values) = matches.get_many::<String>("stations") {
            self.stations = values.cloned().collect();
        }
        if let Some(values) = matches.get_many::<String>("attenuators") {
            self.attenuators = values.cloned().collect();
        }
        if let Some(values) = matches.get_many::<String>("bssids") {
            self.bssids = values.cloned().collect();
        }
        if let Some(step) = matches.get_one::<u32>("step") {
            self.step = *step;
        }
        if let Some(max) = matches.get_one::<u32>("max-attenuation") {
            self.max_attenuation = *max;
        }
        if let Some(iterations) = matches.get_one::<usize>("iterations") {
            self.iterations = *iterations;
        }
        if let Some(wait) = matches.get_one::<u64>("wait-time") {
            self.wait_time_secs = *wait;
        }
        if let Some(misses) = matches.get_one::<u32>("max-missed-polls") {
            self.max_missed_polls = *misses;
        }
        if let Some(dir) = matches.get_one::<String>("result-dir") {
            self.result_dir = PathBuf::from(dir);
        }
        if let Some(host) = matches.get_one::<String>("ssh-host") {
            self.capture.host = Some(host.clone());
        }
        if let Some(user) = matches.get_one::<String>("ssh-user") {
            self.capture.user = user.clone();
        }
        if let Some(port) = matches.get_one::<u16>("ssh-port") {
            self.capture.port = *port;
        }
        if let Some(interface) = matches.get_one::<String>("capture-interface") {
            self.capture.interface = interface.clone();
        }
        if let Some(radio) = matches.get_one::<String>("sniff-radio") {
            self.capture.sniff_radio = radio.clone();
        }
        if let Some(channel) = matches.get_one::<String>("channel") {
            self.capture.channel = channel.clone();
        }
        if let Some(frequency) = matches.get_one::<u32>("frequency") {
            self.capture.frequency = Some(*frequency);
        }
        if matches.get_flag("keep-monitor") {
            self.capture.manage_monitor = false;
        }
    }

    pub fn controller_url(&self) -> Result<Url> {
        Url::parse(&self.controller)
            .with_context(|| format!("Invalid controller URL '{}'", self.controller))
    }

    /// SSH endpoint of the sniffer, falling back to the controller host
    pub fn capture_target(&self) -> Result<SshTarget> {
        let host = match &self.capture.host {
            Some(host) => host.clone(),
            None => self
                .controller_url()?
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Controller URL has no host to run the capture on"))?,
        };
        Ok(SshTarget {
            host,
            user: self.capture.user.clone(),
            port: self.capture.port,
        })
    }

    /// Check the configuration and turn it into run settings.
    ///
    /// Every configuration-fatal problem is reported here, before any
    /// request reaches the controller.
    pub fn validate(&self) -> Result<RunSettings> {
        self.controller_url()?;

        if self.stations.is_empty() {
            bail!("No stations configured");
        }
        let stations = self
            .stations
            .iter()
            .map(|s| StationId::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let attenuators: Vec<AttenuatorId> =
            self.attenuators.iter().map(AttenuatorId::new).collect();
        build_pairs(&attenuators)?;
        RampSchedule::new(self.step, self.max_attenuation)?;

        let bssids = self
            .bssids
            .iter()
            .filter_map(|raw| {
                let bssid = Bssid::normalize(raw);
                if bssid.is_none() {
                    log::warn!("Ignoring configured BSSID '{raw}': not a MAC address");
                }
                bssid
            })
            .collect();

        let monitor = if self.capture.manage_monitor {
            Some(MonitorSpec {
                radio: StationId::parse(&self.capture.sniff_radio)
                    .context("Invalid sniff radio")?,
                name: self.capture.interface.clone(),
                channel: self.capture.channel.clone(),
                frequency: self.capture.frequency,
            })
        } else {
            None
        };

        Ok(RunSettings {
            attenuators,
            stations,
            bssids,
            step: self.step,
            max_attenuation: self.max_attenuation,
            iterations: self.iterations,
            wait_time: Duration::from_secs(self.wait_time_secs),
            capture_settle: Duration::from_millis(self.capture.settle_ms),
            capture_interface: self.capture.interface.clone(),
            capture_template: self.capture.file_template.clone(),
            monitor,
            max_missed_polls: self.max_missed_polls,
        })
    }
}
