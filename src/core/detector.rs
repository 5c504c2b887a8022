/// Roam event detection for one iteration
///
/// Keeps one event per station. A station counts as roamed once a valid BSSID
/// different from its pre-iteration baseline is observed; later differing
/// observations overwrite the event, so the last differing BSSID wins. A return
/// to the baseline does not clear the flag.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{
    telemetry::Sample,
    types::{Bssid, StationId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoamEvent {
    pub bssid_before: Option<Bssid>,
    pub bssid_after: Option<Bssid>,
    pub signal: Option<i32>,
    pub roamed: bool,
    /// False when the station had no usable baseline for this iteration.
    pub eligible: bool,
    /// Ramp step of the observation this event reflects.
    pub step: Option<usize>,
}

/// The last recorded event per station for one `(pair, iteration)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationResult {
    pub events: BTreeMap<StationId, RoamEvent>,
}

impl IterationResult {
    pub fn eligible(&self) -> usize {
        self.events.values().filter(|e| e.eligible).count()
    }

    pub fn roamed(&self) -> usize {
        self.events.values().filter(|e| e.roamed).count()
    }
}

#[derive(Debug, Clone)]
pub struct RoamDetector {
    events: BTreeMap<StationId, RoamEvent>,
}

impl RoamDetector {
    /// Start an iteration from the baselines captured before any attenuation change.
    pub fn begin(baselines: &[(StationId, Option<Bssid>)]) -> Self {
        let events = baselines
            .iter()
            .map(|(id, baseline)| {
                let event = RoamEvent {
                    bssid_before: baseline.clone(),
                    bssid_after: baseline.clone(),
                    signal: None,
                    roamed: false,
                    eligible: baseline.is_some(),
                    step: None,
                };
                (id.clone(), event)
            })
            .collect();
        Self { events }
    }

    /// Feed one sample taken at ramp step `step`.
    ///
    /// Returns `true` when the observation recorded a BSSID not seen before in
    /// this iteration.
    pub fn observe(&mut self, station: &StationId, step: usize, sample: Option<&Sample>) -> bool {
        let Some(event) = self.events.get_mut(station) else {
            return false;
        };
        let Some(sample) = sample else {
            return false;
        };

        if !event.eligible {
            event.signal = sample.signal;
            event.step = Some(step);
            return false;
        }

        match &sample.bssid {
            Some(current) if Some(current) != event.bssid_before.as_ref() => {
                let changed = event.bssid_after.as_ref() != Some(current);
                event.bssid_after = Some(current.clone());
                event.signal = sample.signal;
                event.roamed = true;
                event.step = Some(step);
                changed
            }
            _ if !event.roamed => {
                event.signal = sample.signal;
                event.step = Some(step);
                false
            }
            _ => false,
        }
    }

    pub fn event(&self, station: &StationId) -> Option<&RoamEvent> {
        self.events.get(station)
    }

    pub fn finish(self) -> IterationResult {
        IterationResult {
            events: self.events,
        }
    }
}
