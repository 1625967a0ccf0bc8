// Synthetic continuity data
//
// Bounded, reproducible latency series for demos and visualization when a
// batch has nothing usable. These types are separate from
// ReconciledSample and cannot be converted into it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::reconcile::ReconciledSample;

/// Radio base range; the interference burst lifts a few points up to 65 ms
const RADIO_BASE_MIN: u32 = 40;
const RADIO_BASE_MAX: u32 = 57;
const RADIO_BURST_MIN: u32 = 3;
const RADIO_BURST_MAX: u32 = 8;

/// Positions (modulo the pattern length) that get an interference burst
const BURST_POSITIONS: [usize; 7] = [8, 15, 19, 25, 28, 32, 38];
const BURST_PATTERN_LEN: usize = 40;

const RELAY_MIN: u32 = 15;
const RELAY_MAX: u32 = 50;

/// Which channel a series stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Radio,
    Relay,
}

/// A labeled synthetic series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticSeries {
    pub role: Role,
    pub values: Vec<u32>,
    pub synthetic: bool,
}

/// A synthetic (radio, relay, total) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyntheticSample {
    pub radio_latency_ms: u32,
    pub relay_latency_ms: u32,
    pub total_latency_ms: u64,
    pub synthetic: bool,
}

/// Generate `n` plausible values for `role` from a fixed seed.
///
/// Radio values sit in 40..=65 ms with a burst at fixed positions; relay is
/// one constant in 15..=50 ms.
pub fn synthesize(n: usize, role: Role, seed: u64) -> SyntheticSeries {
    let mut rng = StdRng::seed_from_u64(seed);

    let values = match role {
        Role::Radio => (0..n)
            .map(|i| {
                let base = rng.gen_range(RADIO_BASE_MIN..=RADIO_BASE_MAX);
                if BURST_POSITIONS.contains(&(i % BURST_PATTERN_LEN)) {
                    base + rng.gen_range(RADIO_BURST_MIN..=RADIO_BURST_MAX)
                } else {
                    base
                }
            })
            .collect(),
        Role::Relay => {
            let level = rng.gen_range(RELAY_MIN..=RELAY_MAX);
            vec![level; n]
        }
    };

    SyntheticSeries {
        role,
        values,
        synthetic: true,
    }
}

/// Pair a radio and a relay series into `n` synthetic triples
pub fn synthesize_samples(n: usize, seed: u64) -> Vec<SyntheticSample> {
    let radio = synthesize(n, Role::Radio, seed);
    let relay = synthesize(n, Role::Relay, seed.wrapping_add(1));

    radio
        .values
        .iter()
        .zip(&relay.values)
        .map(|(&radio, &relay)| SyntheticSample {
            radio_latency_ms: radio,
            relay_latency_ms: relay,
            total_latency_ms: radio as u64 + relay as u64,
            synthetic: true,
        })
        .collect()
}

/// True if a batch carries no information: empty, or every sample has the
/// same radio and relay latency.
pub fn is_degenerate(samples: &[ReconciledSample]) -> bool {
    let Some(first) = samples.first() else {
        return true;
    };
    samples.iter().all(|s| {
        s.radio_latency_ms() == first.radio_latency_ms()
            && s.relay_latency_ms() == first.relay_latency_ms()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_range_and_burst() {
        let series = synthesize(400, Role::Radio, 42);
        assert!(series.synthetic);
        assert_eq!(series.values.len(), 400);
        assert!(series.values.iter().all(|v| (40..=65).contains(v)));
        // Only burst positions may exceed the base range
        for (i, v) in series.values.iter().enumerate() {
            if *v > RADIO_BASE_MAX {
                assert!(BURST_POSITIONS.contains(&(i % BURST_PATTERN_LEN)));
            }
        }
    }

    #[test]
    fn test_relay_constant() {
        let series = synthesize(40, Role::Relay, 42);
        let first = series.values[0];
        assert!((15..=50).contains(&first));
        assert!(series.values.iter().all(|v| *v == first));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(synthesize(40, Role::Radio, 42), synthesize(40, Role::Radio, 42));
        assert_eq!(synthesize_samples(40, 7), synthesize_samples(40, 7));
    }

    #[test]
    fn test_samples_sum() {
        let samples = synthesize_samples(40, 42);
        assert_eq!(samples.len(), 40);
        for s in samples {
            assert!(s.synthetic);
            assert_eq!(s.total_latency_ms, s.radio_latency_ms as u64 + s.relay_latency_ms as u64);
        }
    }

    #[test]
    fn test_empty() {
        assert!(synthesize(0, Role::Radio, 1).values.is_empty());
        assert!(synthesize_samples(0, 1).is_empty());
        assert!(is_degenerate(&[]));
    }
}
