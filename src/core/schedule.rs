/// Attenuator pair scheduling and ramp generation
///
/// Pairs are built cyclically from the configured attenuator list so each
/// attenuator is paired with its successor and the last one wraps back to the
/// first. The ramp is a pair of index-aligned sequences: the active attenuator
/// climbs from 0 to the maximum while the passive one falls from the maximum
/// to 0.
use serde::{Deserialize, Serialize};

use crate::core::{error::RoamError, types::AttenuatorId};

/// An ordered `(active, passive)` attenuator tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttenuatorPair {
    pub active: AttenuatorId,
    pub passive: AttenuatorId,
}

impl std::fmt::Display for AttenuatorPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.active, self.passive)
    }
}

/// Build the cyclic pair list: `n` attenuators yield `n` pairs.
pub fn build_pairs(attenuators: &[AttenuatorId]) -> Result<Vec<AttenuatorPair>, RoamError> {
    if attenuators.len() < 2 {
        return Err(RoamError::TooFewAttenuators {
            configured: attenuators.len(),
        });
    }

    Ok(attenuators
        .iter()
        .zip(attenuators.iter().cycle().skip(1))
        .map(|(active, passive)| AttenuatorPair {
            active: active.clone(),
            passive: passive.clone(),
        })
        .collect())
}

/// Index-aligned rising and falling attenuation sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampSchedule {
    increasing: Vec<u32>,
    decreasing: Vec<u32>,
    max_attenuation: u32,
}

impl RampSchedule {
    /// Build the ramp for `step` and `max_attenuation`.
    ///
    /// When `step` does not divide the range, `max_attenuation` is appended to
    /// the rising sequence and `0` to the falling one so both stay the same length.
    pub fn new(step: u32, max_attenuation: u32) -> Result<Self, RoamError> {
        if step == 0 || max_attenuation == 0 {
            return Err(RoamError::InvalidRamp {
                step,
                max_attenuation,
            });
        }

        let mut increasing: Vec<u32> = (0..=max_attenuation).step_by(step as usize).collect();
        if increasing.last() != Some(&max_attenuation) {
            increasing.push(max_attenuation);
        }

        let mut decreasing: Vec<u32> = (0..=max_attenuation / step)
            .map(|i| max_attenuation - i * step)
            .collect();
        if decreasing.last() != Some(&0) {
            decreasing.push(0);
        }

        if increasing.len() != decreasing.len() {
            return Err(RoamError::Inconsistent(format!(
                "ramp sequences differ in length ({} vs {})",
                increasing.len(),
                decreasing.len()
            )));
        }

        Ok(Self {
            increasing,
            decreasing,
            max_attenuation,
        })
    }

    pub fn len(&self) -> usize {
        self.increasing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.increasing.is_empty()
    }

    pub fn max_attenuation(&self) -> u32 {
        self.max_attenuation
    }

    /// `(active, passive)` values for ramp step `index`.
    pub fn step(&self, index: usize) -> Option<(u32, u32)> {
        Some((*self.increasing.get(index)?, *self.decreasing.get(index)?))
    }

    pub fn increasing(&self) -> &[u32] {
        &self.increasing
    }

    pub fn decreasing(&self) -> &[u32] {
        &self.decreasing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AttenuatorId> {
        names.iter().map(|n| AttenuatorId::new(*n)).collect()
    }

    #[test]
    fn test_cyclic_pairs_for_three_attenuators() {
        let pairs = build_pairs(&ids(&["A1", "A2", "A3"])).unwrap();
        let flat: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.active.as_str(), p.passive.as_str()))
            .collect();
        assert_eq!(flat, vec![("A1", "A2"), ("A2", "A3"), ("A3", "A1")]);
    }

    #[test]
    fn test_pair_count_matches_attenuator_count() {
        for n in 2..8 {
            let names: Vec<String> = (0..n).map(|i| format!("A{i}")).collect();
            let list: Vec<AttenuatorId> = names.iter().map(AttenuatorId::new).collect();
            assert_eq!(build_pairs(&list).unwrap().len(), n);
        }
    }

    #[test]
    fn test_single_attenuator_is_fatal() {
        assert_eq!(
            build_pairs(&ids(&["A1"])),
            Err(RoamError::TooFewAttenuators { configured: 1 })
        );
        assert!(build_pairs(&[]).is_err());
    }

    #[test]
    fn test_ramp_with_uneven_step() {
        let ramp = RampSchedule::new(100, 950).unwrap();
        assert_eq!(ramp.len(), 11);
        assert_eq!(ramp.increasing()[0], 0);
        assert_eq!(*ramp.increasing().last().unwrap(), 950);
        assert_eq!(ramp.decreasing()[0], 950);
        assert_eq!(*ramp.decreasing().last().unwrap(), 0);
        assert_eq!(ramp.step(0), Some((0, 950)));
        assert_eq!(ramp.step(10), Some((950, 0)));
        assert_eq!(ramp.step(11), None);
    }

    #[test]
    fn test_ramp_with_even_step_is_complementary() {
        let ramp = RampSchedule::new(50, 950).unwrap();
        for i in 0..ramp.len() {
            let (up, down) = ramp.step(i).unwrap();
            assert_eq!(up + down, 950);
        }
    }

    #[test]
    fn test_ramp_bounds_for_many_steps() {
        for step in 1..40u32 {
            for max in [1u32, 7, 95, 100, 333, 955] {
                let ramp = RampSchedule::new(step, max).unwrap();
                assert_eq!(ramp.increasing().len(), ramp.decreasing().len());
                assert_eq!(ramp.step(0), Some((0, max)));
                assert_eq!(ramp.step(ramp.len() - 1), Some((max, 0)));
            }
        }
    }

    #[test]
    fn test_step_larger_than_range() {
        let ramp = RampSchedule::new(500, 95).unwrap();
        assert_eq!(ramp.increasing(), &[0, 95]);
        assert_eq!(ramp.decreasing(), &[95, 0]);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(RampSchedule::new(0, 950).is_err());
    }
}
