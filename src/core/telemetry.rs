/// Station telemetry polling
///
/// Reads BSSID and signal per station through the device controller, in a
/// fixed enumeration order, one request at a time. A station that yields no
/// data for `max_missed_polls` consecutive polls is dropped from the active
/// set for the rest of the run.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    api::traits::DeviceController,
    core::types::{Bssid, StationId},
};

/// One successful telemetry read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// `None` when the station reported no association.
    pub bssid: Option<Bssid>,
    pub signal: Option<i32>,
}

/// A client station under test.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub baseline: Option<Bssid>,
    pub last_bssid: Option<Bssid>,
    pub last_signal: Option<i32>,
    missed: u32,
}

impl Station {
    fn new(id: StationId) -> Self {
        Self {
            id,
            baseline: None,
            last_bssid: None,
            last_signal: None,
            missed: 0,
        }
    }
}

pub struct TelemetryReader {
    controller: Arc<dyn DeviceController>,
    stations: Vec<Station>,
    dropped: Vec<StationId>,
    max_missed_polls: u32,
}

impl TelemetryReader {
    pub fn new(
        controller: Arc<dyn DeviceController>,
        stations: Vec<StationId>,
        max_missed_polls: u32,
    ) -> Self {
        Self {
            controller,
            stations: stations.into_iter().map(Station::new).collect(),
            dropped: Vec::new(),
            max_missed_polls: max_missed_polls.max(1),
        }
    }

    /// Read a single station. Connection failures and missing records both
    /// come back as `None`.
    pub async fn sample(&self, station: &StationId) -> Option<Sample> {
        match self.controller.port_state(station).await {
            Ok(Some(state)) => Some(Sample {
                bssid: Bssid::normalize(&state.ap),
                signal: state.signal,
            }),
            Ok(None) => {
                log::debug!("Station {station} not found on the controller");
                None
            }
            Err(err) => {
                log::debug!("Telemetry read for {station} failed: {err:#}");
                None
            }
        }
    }

    /// Poll every active station once, in order.
    ///
    /// Stations that cross the miss limit during this poll are still reported
    /// (as `None`) and then removed from the active set.
    pub async fn poll_all(&mut self) -> Vec<(StationId, Option<Sample>)> {
        let mut readings = Vec::with_capacity(self.stations.len());
        for index in 0..self.stations.len() {
            let id = self.stations[index].id.clone();
            let reading = self.sample(&id).await;

            let station = &mut self.stations[index];
            match &reading {
                Some(sample) => {
                    station.missed = 0;
                    station.last_bssid = sample.bssid.clone();
                    station.last_signal = sample.signal;
                }
                None => station.missed += 1,
            }
            readings.push((id, reading));
        }

        let limit = self.max_missed_polls;
        let (keep, gone): (Vec<Station>, Vec<Station>) = std::mem::take(&mut self.stations)
            .into_iter()
            .partition(|s| s.missed < limit);
        for station in gone {
            log::warn!(
                "Station {} missed {} consecutive polls (last seen on {} at {} dBm), removing it from the test",
                station.id,
                station.missed,
                station
                    .last_bssid
                    .as_ref()
                    .map_or("unknown".to_string(), Bssid::to_string),
                station
                    .last_signal
                    .map_or("unknown".to_string(), |s| s.to_string()),
            );
            self.dropped.push(station.id);
        }
        self.stations = keep;

        readings
    }

    /// Poll every active station and record the result as its baseline.
    pub async fn capture_baselines(&mut self) -> Vec<(StationId, Option<Bssid>)> {
        let readings = self.poll_all().await;
        let baselines: Vec<(StationId, Option<Bssid>)> = readings
            .into_iter()
            .map(|(id, reading)| (id, reading.and_then(|s| s.bssid)))
            .collect();

        for station in self.stations.iter_mut() {
            station.baseline = baselines
                .iter()
                .find(|(id, _)| *id == station.id)
                .and_then(|(_, bssid)| bssid.clone());
        }
        baselines
    }

    pub fn active(&self) -> &[Station] {
        &self.stations
    }

    pub fn active_ids(&self) -> Vec<StationId> {
        self.stations.iter().map(|s| s.id.clone()).collect()
    }

    pub fn dropped(&self) -> &[StationId] {
        &self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::sim::SimulatedBench;

    fn bench() -> Arc<SimulatedBench> {
        Arc::new(
            SimulatedBench::new(500)
                .with_attenuator("A1", "a:b:c:d:e:1")
                .with_attenuator("A2", "a:b:c:d:e:2")
                .with_station("1.1.sta0000", "A1")
                .with_station("1.1.sta0001", "A2"),
        )
    }

    fn ids() -> Vec<StationId> {
        vec![
            StationId::parse("1.1.sta0000").unwrap(),
            StationId::parse("1.1.sta0001").unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_baselines_are_normalized() {
        let mut reader = TelemetryReader::new(bench(), ids(), 3);
        let baselines = reader.capture_baselines().await;

        assert_eq!(baselines.len(), 2);
        assert_eq!(baselines[0].1.as_ref().unwrap().as_str(), "0A:0B:0C:0D:0E:01");
        assert_eq!(baselines[1].1.as_ref().unwrap().as_str(), "0A:0B:0C:0D:0E:02");
        assert_eq!(
            reader.active()[0].baseline,
            Bssid::normalize("0a:0b:0c:0d:0e:01")
        );
    }

    #[tokio::test]
    async fn test_transient_gap_does_not_drop() {
        let bench = bench();
        let mut reader = TelemetryReader::new(bench.clone(), ids(), 3);

        bench.mute_station_for(&ids()[0], 2);
        let first = reader.poll_all().await;
        assert_eq!(first[0].1, None);
        reader.poll_all().await;
        let third = reader.poll_all().await;

        assert!(third[0].1.is_some());
        assert_eq!(reader.active().len(), 2);
        assert!(reader.dropped().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_loss_drops_station() {
        let bench = bench();
        let mut reader = TelemetryReader::new(bench.clone(), ids(), 3);

        bench.silence_station(&ids()[1]);
        for _ in 0..3 {
            reader.poll_all().await;
        }

        assert_eq!(reader.active_ids(), vec![ids()[0].clone()]);
        assert_eq!(reader.dropped(), &[ids()[1].clone()]);

        let next = reader.poll_all().await;
        assert_eq!(next.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_loss_counts_as_miss() {
        let bench = bench();
        let mut reader = TelemetryReader::new(bench.clone(), ids(), 2);

        bench.lose_connection_for(2);
        let readings = reader.poll_all().await;
        assert!(readings.iter().all(|(_, r)| r.is_none()));
        assert_eq!(reader.active().len(), 2);

        let readings = reader.poll_all().await;
        assert!(readings.iter().all(|(_, r)| r.is_some()));
    }
}
