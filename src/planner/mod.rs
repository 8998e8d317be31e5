//! Frequency planning
//!
//! Maps a set of named target frequencies into one shared capture window.
//! Runs once at startup; everything downstream is tuned from its result.

pub mod freqset;

pub use freqset::FrequencySet;

use tracing::info;

use crate::error::PlanError;

/// Shared capture window derived from a [`FrequencySet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    /// Frequency the capture device is tuned to
    pub center_frequency: u64,
    /// `max_frequency - min_frequency`
    pub required_bandwidth: u64,
    pub min_frequency: u64,
    pub max_frequency: u64,
}

impl CapturePlan {
    /// Signed offset of `frequency` from the center
    pub fn offset_of(&self, frequency: u64) -> i64 {
        frequency as i64 - self.center_frequency as i64
    }
}

/// Plan a capture window covering every frequency in `freqs`.
///
/// The center starts halfway between the lowest and highest target. Each
/// target is then checked once, in set order, and every target closer than
/// `channel_bandwidth` to the current center pushes the center up by one
/// `channel_bandwidth`. Targets already checked are not re-examined after a
/// shift, so this is an approximate avoidance heuristic: a later shift can
/// still land the center on an earlier target.
pub fn plan(
    freqs: &FrequencySet,
    max_bandwidth: u64,
    channel_bandwidth: u64,
) -> Result<CapturePlan, PlanError> {
    if freqs.is_empty() {
        return Err(PlanError::EmptyFrequencySet);
    }

    info!("Frequencies:");
    for (label, hz) in freqs.iter() {
        info!("  {}: {:.3} MHz", label, hz as f64 / 1e6);
    }

    let min_frequency = freqs.min();
    let max_frequency = freqs.max();
    let required_bandwidth = max_frequency - min_frequency;

    info!("Required bandwidth: {:.3} MHz", required_bandwidth as f64 / 1e6);
    if required_bandwidth > max_bandwidth {
        return Err(PlanError::CapacityExceeded {
            required: required_bandwidth,
            maximum: max_bandwidth,
        });
    }

    let mut center_frequency = min_frequency + required_bandwidth / 2;
    for (_, hz) in freqs.iter() {
        if hz.abs_diff(center_frequency) < channel_bandwidth {
            center_frequency += channel_bandwidth;
        }
    }

    info!("Center frequency: {:.3} MHz", center_frequency as f64 / 1e6);

    Ok(CapturePlan {
        center_frequency,
        required_bandwidth,
        min_frequency,
        max_frequency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX_BW: u64 = 2_400_000;
    const CHAN_BW: u64 = 10_000;

    #[test]
    fn test_two_channel_plan() {
        let freqs = FrequencySet::new([("A", 145_787_000), ("B", 145_500_000)]).unwrap();
        let plan = plan(&freqs, MAX_BW, CHAN_BW).unwrap();

        assert_eq!(plan.required_bandwidth, 287_000);
        assert_eq!(plan.min_frequency, 145_500_000);
        assert_eq!(plan.max_frequency, 145_787_000);
        assert_eq!(plan.center_frequency, 145_643_500);
        assert_eq!(plan.offset_of(145_787_000), 143_500);
        assert_eq!(plan.offset_of(145_500_000), -143_500);
    }

    #[test]
    fn test_center_collision_shifts_once() {
        // Midpoint of A and C is exactly B
        let freqs =
            FrequencySet::new([("A", 144_800_000), ("B", 145_000_000), ("C", 145_200_000)])
                .unwrap();
        let plan = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
        assert_eq!(plan.center_frequency, 145_000_000 + CHAN_BW);
    }

    #[test]
    fn test_single_pass_leaves_earlier_collision() {
        // Midpoint is 145_000_000. "near" is 5 kHz above it and is checked
        // first: shift to 145_010_000. "above" is then 2 kHz away from the
        // new center: shift to 145_020_000, which now sits on "late".
        // "late" comes after "above" so it is checked once more and shifts
        // again; the heuristic stops there.
        let freqs = FrequencySet::new([
            ("low", 144_800_000),
            ("high", 145_200_000),
            ("near", 145_005_000),
            ("above", 145_012_000),
            ("late", 145_020_000),
        ])
        .unwrap();
        let first = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
        assert_eq!(first.center_frequency, 145_030_000);

        // Reordering changes the outcome: only one pass, no re-scan.
        let freqs = FrequencySet::new([
            ("late", 145_020_000),
            ("low", 144_800_000),
            ("high", 145_200_000),
            ("near", 145_005_000),
            ("above", 145_012_000),
        ])
        .unwrap();
        let reordered = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
        assert_eq!(reordered.center_frequency, 145_020_000);
        assert!(145_020_000u64.abs_diff(reordered.center_frequency) < CHAN_BW);
    }

    #[test]
    fn test_capacity_exceeded() {
        let freqs = FrequencySet::new([("A", 144_000_000), ("B", 146_500_000)]).unwrap();
        assert_eq!(
            plan(&freqs, MAX_BW, CHAN_BW),
            Err(PlanError::CapacityExceeded {
                required: 2_500_000,
                maximum: MAX_BW,
            })
        );
    }

    #[test]
    fn test_span_equal_to_maximum_is_allowed() {
        let freqs = FrequencySet::new([("A", 144_000_000), ("B", 146_400_000)]).unwrap();
        let plan = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
        assert_eq!(plan.required_bandwidth, MAX_BW);
        assert_eq!(plan.center_frequency, 145_200_000);
    }

    fn freq_set(base: u64, offsets: &[u64]) -> FrequencySet {
        FrequencySet::new(
            offsets
                .iter()
                .enumerate()
                .map(|(i, off)| (format!("ch{}", i), base + off)),
        )
        .unwrap()
    }

    proptest! {
        // Leaves room for one shift per channel on top of the span
        #[test]
        fn prop_targets_within_half_window(
            base in 50_000_000u64..1_500_000_000,
            offsets in proptest::collection::btree_set(0u64..(MAX_BW - 2 * 8 * CHAN_BW), 1..=8),
        ) {
            let offsets: Vec<u64> = offsets.into_iter().collect();
            let freqs = freq_set(base, &offsets);
            let plan = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
            for (_, hz) in freqs.iter() {
                prop_assert!(hz.abs_diff(plan.center_frequency) <= MAX_BW / 2);
            }
            prop_assert_eq!(plan.required_bandwidth, plan.max_frequency - plan.min_frequency);
        }

        #[test]
        fn prop_oversized_span_fails(
            base in 50_000_000u64..1_500_000_000,
            excess in 1u64..10_000_000,
            middle in proptest::collection::vec(0u64..1_000, 0..4),
        ) {
            let mut offsets = vec![0, MAX_BW + excess];
            offsets.extend(middle.into_iter().map(|m| 1 + m * 100));
            let freqs = freq_set(base, &offsets);
            prop_assert_eq!(
                plan(&freqs, MAX_BW, CHAN_BW),
                Err(PlanError::CapacityExceeded { required: MAX_BW + excess, maximum: MAX_BW })
            );
        }

        #[test]
        fn prop_center_moves_in_whole_channel_steps(
            base in 50_000_000u64..1_500_000_000,
            offsets in proptest::collection::btree_set(0u64..MAX_BW, 1..=8),
        ) {
            let offsets: Vec<u64> = offsets.into_iter().collect();
            let freqs = freq_set(base, &offsets);
            let plan = plan(&freqs, MAX_BW, CHAN_BW).unwrap();
            let initial = plan.min_frequency + plan.required_bandwidth / 2;
            prop_assert!(plan.center_frequency >= initial);
            prop_assert_eq!((plan.center_frequency - initial) % CHAN_BW, 0);
            prop_assert!((plan.center_frequency - initial) / CHAN_BW <= freqs.len() as u64);
        }
    }
}
