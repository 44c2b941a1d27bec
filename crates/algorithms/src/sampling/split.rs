//! Random training / validation split.

use super::SampleSet;
use lcmap_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fraction of samples that goes to training
pub const DEFAULT_SPLIT: f64 = 0.7;

/// Attach a uniform [0, 1) number to every sample, from a seeded RNG.
pub fn add_random_column(mut set: SampleSet, seed: u64) -> SampleSet {
    let mut rng = StdRng::seed_from_u64(seed);
    for s in &mut set.samples {
        s.random = Some(rng.gen::<f64>());
    }
    set
}

/// Split on the random column: training = `random < threshold`,
/// validation = `random >= threshold`.
pub fn split(set: SampleSet, threshold: f64) -> Result<(SampleSet, SampleSet)> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: threshold.to_string(),
            reason: "must be in [0, 1]".into(),
        });
    }

    let mut training = SampleSet::new(set.feature_names.clone());
    let mut validation = SampleSet::new(set.feature_names);
    for sample in set.samples {
        match sample.random {
            Some(r) if r < threshold => training.samples.push(sample),
            Some(_) => validation.samples.push(sample),
            None => {
                return Err(Error::Algorithm(
                    "samples have no random column; call add_random_column first".into(),
                ))
            }
        }
    }
    Ok((training, validation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Sample;
    use geo::Coord;

    fn samples(n: usize) -> SampleSet {
        SampleSet {
            feature_names: vec!["SR_B4".into()],
            samples: (0..n)
                .map(|i| Sample {
                    values: vec![i as f64],
                    label: (i % 2) as i64,
                    random: None,
                    point: Coord { x: 0.0, y: 0.0 },
                })
                .collect(),
        }
    }

    #[test]
    fn split_partitions_samples() {
        let set = add_random_column(samples(500), 0);
        let (train, valid) = split(set, DEFAULT_SPLIT).unwrap();
        assert_eq!(train.len() + valid.len(), 500);
        assert!(train.iter().all(|s| s.random.unwrap() < 0.7));
        assert!(valid.iter().all(|s| s.random.unwrap() >= 0.7));
        // disjoint: every sample value appears exactly once
        let mut seen: Vec<f64> = train.iter().chain(valid.iter()).map(|s| s.values[0]).collect();
        seen.sort_by(|a, b| a.total_cmp(b));
        seen.dedup();
        assert_eq!(seen.len(), 500);
        // roughly 70/30
        assert!(train.len() > 300 && train.len() < 400);
    }

    #[test]
    fn random_column_is_seeded() {
        let a = add_random_column(samples(10), 0);
        let b = add_random_column(samples(10), 0);
        let c = add_random_column(samples(10), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|s| (0.0..1.0).contains(&s.random.unwrap())));
    }

    #[test]
    fn split_requires_random_column() {
        assert!(split(samples(3), 0.7).is_err());
        assert!(split(add_random_column(samples(3), 0), 1.5).is_err());
    }

    #[test]
    fn extreme_thresholds() {
        let (train, valid) = split(add_random_column(samples(20), 3), 0.0).unwrap();
        assert!(train.is_empty());
        assert_eq!(valid.len(), 20);
    }
}
