use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

use crate::core::{
    aggregate::{RoamTotals, RunAggregate},
    runner::{RunOutput, RunSettings},
    schedule::AttenuatorPair,
    types::{AttenuatorId, Bssid, StationId},
};

/// Result file of a completed run
pub const RESULTS_FILE: &str = "roam_results.json";
/// Result file of an aborted run
pub const PARTIAL_FILE: &str = "partial_run.json";

/// Test setup recorded next to the results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetup {
    pub controller: String,
    pub stations: Vec<StationId>,
    pub attenuators: Vec<AttenuatorId>,
    pub bssids: Vec<Bssid>,
    pub step: u32,
    pub max_attenuation: u32,
    pub iterations: usize,
    pub wait_time_secs: u64,
    pub generated_at: DateTime<Local>,
}

impl TestSetup {
    pub fn new(controller: &str, settings: &RunSettings) -> Self {
        Self {
            controller: controller.to_string(),
            stations: settings.stations.clone(),
            attenuators: settings.attenuators.clone(),
            bssids: settings.bssids.clone(),
            step: settings.step,
            max_attenuation: settings.max_attenuation,
            iterations: settings.iterations,
            wait_time_secs: settings.wait_time.as_secs(),
            generated_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairTotals {
    pub pair: AttenuatorPair,
    pub totals: RoamTotals,
}

/// Everything a report renderer needs from a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoamReport {
    pub setup: TestSetup,
    pub totals: RoamTotals,
    pub per_pair: Vec<PairTotals>,
    #[serde(default)]
    pub dropped_stations: Vec<StationId>,
    #[serde(default)]
    pub capture_files: Vec<String>,
    pub run: RunAggregate,
}

impl RoamReport {
    pub fn build(setup: TestSetup, output: &RunOutput) -> Result<Self> {
        let (totals, per_pair) = reduce(&output.aggregate, &setup.bssids)?;
        Ok(Self {
            setup,
            totals,
            per_pair,
            dropped_stations: output.dropped_stations.clone(),
            capture_files: output.capture_files.clone(),
            run: output.aggregate.clone(),
        })
    }
}

/// Whole-run totals plus one set of totals per attenuator pair
pub fn reduce(run: &RunAggregate, seed: &[Bssid]) -> Result<(RoamTotals, Vec<PairTotals>)> {
    let totals = RoamTotals::from_run(run, seed)?;
    let per_pair = run
        .pairs
        .iter()
        .enumerate()
        .map(|(index, pair)| {
            Ok(PairTotals {
                pair: pair.clone(),
                totals: RoamTotals::for_pair(run, index, seed)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((totals, per_pair))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Log the totals the way the run summary reads
pub fn log_totals(totals: &RoamTotals) {
    log::info!(
        "Roams attempted: {}, successful: {}, failed: {}",
        totals.attempted,
        totals.successful,
        totals.failed
    );
    for (bssid, count) in &totals.per_bssid_totals {
        log::info!("  roams to {bssid}: {count}");
    }
    for (station, count) in &totals.per_station_totals {
        let failed = totals.per_station_failed.get(station).copied().unwrap_or(0);
        log::info!("  station {station}: {count} successful, {failed} failed");
    }
}
