/// Run results and their reduction into roam totals
///
/// `RunAggregate` is a fixed-size arena indexed by `(pair, iteration)`, sized
/// from the schedule before the run starts. `RoamTotals` is the reduction
/// handed to report rendering.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{
    detector::IterationResult,
    error::RoamError,
    schedule::AttenuatorPair,
    types::{Bssid, StationId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAggregate {
    pub pairs: Vec<AttenuatorPair>,
    pub iterations: usize,
    /// Stations handed to the run, before any were dropped.
    pub stations: Vec<StationId>,
    /// Pair-major: slot `pair * iterations + iteration`.
    slots: Vec<Option<IterationResult>>,
}

impl RunAggregate {
    pub fn new(pairs: Vec<AttenuatorPair>, iterations: usize, stations: Vec<StationId>) -> Self {
        let slots = vec![None; pairs.len() * iterations];
        Self {
            pairs,
            iterations,
            stations,
            slots,
        }
    }

    fn index(&self, pair: usize, iteration: usize) -> Option<usize> {
        (pair < self.pairs.len() && iteration < self.iterations)
            .then_some(pair * self.iterations + iteration)
    }

    /// Store the result of one iteration. Each slot can be written once.
    pub fn commit(
        &mut self,
        pair: usize,
        iteration: usize,
        result: IterationResult,
    ) -> Result<(), RoamError> {
        let slot = self
            .index(pair, iteration)
            .and_then(|i| self.slots.get_mut(i))
            .filter(|slot| slot.is_none())
            .ok_or(RoamError::SlotOccupied { pair, iteration })?;
        *slot = Some(result);
        Ok(())
    }

    pub fn get(&self, pair: usize, iteration: usize) -> Option<&IterationResult> {
        self.index(pair, iteration)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Committed results as `(pair, iteration, result)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &IterationResult)> + '_ {
        let iterations = self.iterations.max(1);
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(i, slot)| slot.as_ref().map(|r| (i / iterations, i % iterations, r)))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn committed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.committed() == self.capacity()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoamTotals {
    pub attempted: u64,
    pub successful: u64,
    pub failed: u64,
    pub per_bssid_totals: BTreeMap<Bssid, u64>,
    pub per_station_totals: BTreeMap<StationId, u64>,
    /// Attempts without a roam, per station.
    pub per_station_failed: BTreeMap<StationId, u64>,
}

impl RoamTotals {
    /// Reduce a whole run.
    ///
    /// `seed_bssids` are listed in the per-BSSID table even when no station
    /// roamed to them.
    pub fn from_run(run: &RunAggregate, seed_bssids: &[Bssid]) -> Result<Self, RoamError> {
        Self::reduce(run, seed_bssids, None)
    }

    /// Reduce only the iterations of one attenuator pair.
    pub fn for_pair(
        run: &RunAggregate,
        pair: usize,
        seed_bssids: &[Bssid],
    ) -> Result<Self, RoamError> {
        if pair >= run.pairs.len() {
            return Err(RoamError::Inconsistent(format!(
                "pair index {pair} outside a run of {} pairs",
                run.pairs.len()
            )));
        }
        Self::reduce(run, seed_bssids, Some(pair))
    }

    fn reduce(
        run: &RunAggregate,
        seed_bssids: &[Bssid],
        only_pair: Option<usize>,
    ) -> Result<Self, RoamError> {
        let mut totals = RoamTotals::default();
        for bssid in seed_bssids {
            totals.per_bssid_totals.insert(bssid.clone(), 0);
        }
        for station in &run.stations {
            totals.per_station_totals.insert(station.clone(), 0);
            totals.per_station_failed.insert(station.clone(), 0);
        }

        for (pair, iteration, result) in run.iter() {
            if only_pair.is_some_and(|p| p != pair) {
                continue;
            }
            for (station, event) in &result.events {
                if !event.eligible {
                    if event.roamed {
                        return Err(RoamError::Inconsistent(format!(
                            "{station} roamed in pair {pair} iteration {iteration} without a baseline"
                        )));
                    }
                    continue;
                }

                totals.attempted += 1;
                if !event.roamed {
                    *totals.per_station_failed.entry(station.clone()).or_insert(0) += 1;
                    continue;
                }

                let bssid = event.bssid_after.as_ref().ok_or_else(|| {
                    RoamError::Inconsistent(format!(
                        "{station} roamed in pair {pair} iteration {iteration} with no BSSID"
                    ))
                })?;
                totals.successful += 1;
                *totals.per_bssid_totals.entry(bssid.clone()).or_insert(0) += 1;
                *totals.per_station_totals.entry(station.clone()).or_insert(0) += 1;
            }
        }

        let pairs = if only_pair.is_some() { 1 } else { run.pairs.len() };
        let bound = (run.iterations * pairs) as u64;
        if let Some((station, count)) = totals.per_station_totals.iter().find(|(_, c)| **c > bound) {
            return Err(RoamError::Inconsistent(format!(
                "{station} has {count} successful roams but only {bound} attempts are possible"
            )));
        }

        totals.failed = totals.attempted.checked_sub(totals.successful).ok_or_else(|| {
            RoamError::Inconsistent(format!(
                "{} successful roams exceed {} attempts",
                totals.successful, totals.attempted
            ))
        })?;

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{detector::RoamEvent, types::AttenuatorId};

    fn pairs(n: usize) -> Vec<AttenuatorPair> {
        (0..n)
            .map(|i| AttenuatorPair {
                active: AttenuatorId::new(format!("A{i}")),
                passive: AttenuatorId::new(format!("A{}", (i + 1) % n)),
            })
            .collect()
    }

    fn sta(n: &str) -> StationId {
        StationId::parse(n).unwrap()
    }

    fn bssid(s: &str) -> Bssid {
        Bssid::normalize(s).unwrap()
    }

    fn event(before: &str, after: &str, roamed: bool) -> RoamEvent {
        RoamEvent {
            bssid_before: Some(bssid(before)),
            bssid_after: Some(bssid(after)),
            signal: Some(-50),
            roamed,
            eligible: true,
            step: Some(5),
        }
    }

    fn result(entries: Vec<(StationId, RoamEvent)>) -> IterationResult {
        IterationResult {
            events: entries.into_iter().collect(),
        }
    }

    const AP1: &str = "AA:AA:AA:AA:AA:01";
    const AP2: &str = "AA:AA:AA:AA:AA:02";

    #[test]
    fn test_commit_is_write_once() {
        let mut run = RunAggregate::new(pairs(2), 2, vec![sta("1.1.sta0")]);
        assert_eq!(run.capacity(), 4);
        run.commit(1, 1, IterationResult::default()).unwrap();
        assert_eq!(
            run.commit(1, 1, IterationResult::default()),
            Err(RoamError::SlotOccupied {
                pair: 1,
                iteration: 1
            })
        );
        assert!(run.commit(2, 0, IterationResult::default()).is_err());
        assert_eq!(run.committed(), 1);
        assert!(run.get(1, 1).is_some());
        assert!(run.get(0, 0).is_none());
        assert_eq!(run.iter().map(|(p, i, _)| (p, i)).collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn test_totals_for_complete_run() -> Result<(), RoamError> {
        let s0 = sta("1.1.sta0");
        let s1 = sta("1.1.sta1");
        let mut run = RunAggregate::new(pairs(2), 1, vec![s0.clone(), s1.clone()]);
        run.commit(
            0,
            0,
            result(vec![
                (s0.clone(), event(AP1, AP2, true)),
                (s1.clone(), event(AP1, AP2, true)),
            ]),
        )?;
        run.commit(
            1,
            0,
            result(vec![
                (s0.clone(), event(AP2, AP1, true)),
                (s1.clone(), event(AP2, AP2, false)),
            ]),
        )?;

        let totals = RoamTotals::from_run(&run, &[bssid(AP1), bssid(AP2)])?;
        assert_eq!(totals.attempted, 4);
        assert_eq!(totals.successful, 3);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.per_bssid_totals[&bssid(AP2)], 2);
        assert_eq!(totals.per_bssid_totals[&bssid(AP1)], 1);
        assert_eq!(totals.per_station_totals[&s0], 2);
        assert_eq!(totals.per_station_totals[&s1], 1);
        assert_eq!(totals.per_station_failed[&s1], 1);

        let first = RoamTotals::for_pair(&run, 0, &[])?;
        assert_eq!((first.attempted, first.successful, first.failed), (2, 2, 0));
        assert_eq!(first.per_station_totals[&s0], 1);
        assert_eq!(first.per_station_totals[&s1], 1);
        Ok(())
    }

    #[test]
    fn test_seeded_tables_start_at_zero() -> Result<(), RoamError> {
        let s0 = sta("1.1.sta0");
        let run = RunAggregate::new(pairs(2), 1, vec![s0.clone()]);
        let totals = RoamTotals::from_run(&run, &[bssid(AP1)])?;
        assert_eq!(totals.attempted, 0);
        assert_eq!(totals.per_bssid_totals[&bssid(AP1)], 0);
        assert_eq!(totals.per_station_totals[&s0], 0);
        Ok(())
    }

    #[test]
    fn test_ineligible_station_is_not_attempted() -> Result<(), RoamError> {
        let s0 = sta("1.1.sta0");
        let s1 = sta("1.1.sta1");
        let mut run = RunAggregate::new(pairs(2), 1, vec![s0.clone(), s1.clone()]);
        let mut missing = event(AP1, AP1, false);
        missing.bssid_before = None;
        missing.eligible = false;
        run.commit(
            0,
            0,
            result(vec![(s0.clone(), event(AP1, AP2, true)), (s1.clone(), missing)]),
        )?;

        let totals = RoamTotals::from_run(&run, &[])?;
        assert_eq!(totals.attempted, 1);
        assert_eq!(totals.successful, 1);
        assert_eq!(totals.per_station_totals[&s1], 0);
        Ok(())
    }

    #[test]
    fn test_roam_without_baseline_is_surfaced() {
        let s0 = sta("1.1.sta0");
        let mut run = RunAggregate::new(pairs(2), 1, vec![s0.clone()]);
        let mut bogus = event(AP1, AP2, true);
        bogus.eligible = false;
        run.commit(0, 0, result(vec![(s0, bogus)])).unwrap();

        assert!(matches!(
            RoamTotals::from_run(&run, &[]),
            Err(RoamError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_roam_without_bssid_is_surfaced() {
        let s0 = sta("1.1.sta0");
        let mut run = RunAggregate::new(pairs(2), 1, vec![s0.clone()]);
        let mut bogus = event(AP1, AP2, true);
        bogus.bssid_after = None;
        run.commit(0, 0, result(vec![(s0, bogus)])).unwrap();

        assert!(RoamTotals::from_run(&run, &[]).is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let s0 = sta("1.1.sta0");
        let mut run = RunAggregate::new(pairs(2), 1, vec![s0.clone()]);
        run.commit(0, 0, result(vec![(s0, event(AP1, AP2, true))]))
            .unwrap();
        let json = serde_json::to_string(&run).unwrap();
        let back: RunAggregate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
