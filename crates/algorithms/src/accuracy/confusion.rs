//! Error matrix and the scores derived from it.

use crate::classification::{column_indices, RandomForest};
use crate::sampling::SampleSet;
use lcmap_core::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Square error matrix: rows = reference labels, columns = predicted labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<i64>,
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Tally `(actual, predicted)` pairs over the sorted union of their labels.
    pub fn from_pairs(actual: &[i64], predicted: &[i64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(Error::Algorithm(format!(
                "{} reference labels vs {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        let mut labels: Vec<i64> = actual.iter().chain(predicted).copied().collect();
        labels.sort_unstable();
        labels.dedup();
        Self::with_labels(labels, actual, predicted)
    }

    /// Tally pairs over a fixed label order (e.g. every class of the forest).
    pub fn with_labels(labels: Vec<i64>, actual: &[i64], predicted: &[i64]) -> Result<Self> {
        let n = labels.len();
        let mut counts = vec![vec![0u64; n]; n];
        let position = |label: i64| {
            labels
                .iter()
                .position(|&l| l == label)
                .ok_or_else(|| Error::Algorithm(format!("label {label} not in {labels:?}")))
        };
        for (&a, &p) in actual.iter().zip(predicted) {
            counts[position(a)?][position(p)?] += 1;
        }
        Ok(Self { labels, counts })
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Count of samples with reference `actual` predicted as `predicted`
    pub fn count(&self, actual: i64, predicted: i64) -> u64 {
        let (Some(r), Some(c)) = (self.index(actual), self.index(predicted)) else {
            return 0;
        };
        self.counts[r][c]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn trace(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    fn row_sum(&self, i: usize) -> u64 {
        self.counts[i].iter().sum()
    }

    fn col_sum(&self, j: usize) -> u64 {
        self.counts.iter().map(|row| row[j]).sum()
    }

    fn index(&self, label: i64) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }

    /// Overall accuracy: trace / total
    pub fn accuracy(&self) -> f64 {
        ratio(self.trace() as f64, self.total() as f64)
    }

    /// Cohen's kappa: `(po - pe) / (1 - pe)`
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let po = self.accuracy();
        let pe: f64 = (0..self.labels.len())
            .map(|i| self.row_sum(i) as f64 * self.col_sum(i) as f64)
            .sum::<f64>()
            / (total * total);
        ratio(po - pe, 1.0 - pe)
    }

    /// User's accuracy (precision) per class: diagonal / column sum
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|j| ratio(self.counts[j][j] as f64, self.col_sum(j) as f64))
            .collect()
    }

    /// Producer's accuracy (recall) per class: diagonal / row sum
    pub fn producers_accuracy(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|i| ratio(self.counts[i][i] as f64, self.row_sum(i) as f64))
            .collect()
    }

    /// F1 per class: harmonic mean of consumer's and producer's accuracy
    pub fn f1_scores(&self) -> Vec<f64> {
        self.consumers_accuracy()
            .into_iter()
            .zip(self.producers_accuracy())
            .map(|(p, r)| ratio(2.0 * p * r, p + r))
            .collect()
    }

    /// Every metric in one serializable report
    pub fn report(&self) -> AccuracyReport {
        let consumers = self.consumers_accuracy();
        let producers = self.producers_accuracy();
        let f1 = self.f1_scores();
        let classes = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, &label)| ClassAccuracy {
                label,
                reference: self.row_sum(i),
                predicted: self.col_sum(i),
                consumers_accuracy: consumers[i],
                producers_accuracy: producers[i],
                f1: f1[i],
            })
            .collect();

        AccuracyReport {
            samples: self.total(),
            accuracy: self.accuracy(),
            kappa: self.kappa(),
            classes,
            matrix: self.clone(),
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10}", "actual\\pred")?;
        for l in &self.labels {
            write!(f, "{l:>8}")?;
        }
        writeln!(f)?;
        for (l, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{l:>11}")?;
            for c in row {
                write!(f, "{c:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Division where a zero denominator gives 0
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Metrics of one class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAccuracy {
    pub label: i64,
    /// Reference samples of this class (row sum)
    pub reference: u64,
    /// Samples predicted as this class (column sum)
    pub predicted: u64,
    pub consumers_accuracy: f64,
    pub producers_accuracy: f64,
    pub f1: f64,
}

/// Overall and per-class accuracy of a validation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub samples: u64,
    pub accuracy: f64,
    pub kappa: f64,
    pub classes: Vec<ClassAccuracy>,
    pub matrix: ConfusionMatrix,
}

/// Predict the label of every sample with `forest`.
///
/// Samples must carry the forest's feature bands (matched by name).
pub fn classify_samples(forest: &RandomForest, samples: &SampleSet) -> Result<Vec<i64>> {
    let columns = column_indices(&samples.feature_names, forest.feature_names())?;
    let mut features = vec![0.0; columns.len()];
    samples
        .iter()
        .map(|s| {
            for (f, &c) in features.iter_mut().zip(&columns) {
                *f = s.values[c];
            }
            forest.predict(&features)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Reference example: 2 classes, 100 samples
    ///
    /// ```text
    ///            pred 0  pred 1
    /// actual 0     45       5
    /// actual 1     10      40
    /// ```
    fn matrix() -> ConfusionMatrix {
        let mut actual = Vec::new();
        let mut predicted = Vec::new();
        for (a, p, n) in [(0, 0, 45), (0, 1, 5), (1, 0, 10), (1, 1, 40)] {
            actual.extend(std::iter::repeat(a).take(n));
            predicted.extend(std::iter::repeat(p).take(n));
        }
        ConfusionMatrix::from_pairs(&actual, &predicted).unwrap()
    }

    #[test]
    fn accuracy_is_trace_over_total() {
        let m = matrix();
        assert_eq!(m.total(), 100);
        assert_eq!(m.trace(), 85);
        assert_relative_eq!(m.accuracy(), m.trace() as f64 / m.total() as f64);
        assert_relative_eq!(m.accuracy(), 0.85);
        assert_eq!(m.count(0, 1), 5);
        assert_eq!(m.count(1, 0), 10);
    }

    #[test]
    fn kappa_reference_value() {
        // pe = (50*55 + 50*45) / 100^2 = 0.5
        assert_relative_eq!(matrix().kappa(), (0.85 - 0.5) / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn per_class_metrics() {
        let m = matrix();
        let consumers = m.consumers_accuracy();
        let producers = m.producers_accuracy();
        assert_relative_eq!(consumers[0], 45.0 / 55.0);
        assert_relative_eq!(consumers[1], 40.0 / 45.0);
        assert_relative_eq!(producers[0], 0.9);
        assert_relative_eq!(producers[1], 0.8);
        let f1 = m.f1_scores();
        let (p, r) = (45.0 / 55.0, 0.9);
        assert_relative_eq!(f1[0], 2.0 * p * r / (p + r), epsilon = 1e-12);
    }

    #[test]
    fn zero_divisions_give_zero() {
        // class 1 never predicted, class 2 never in reference
        let m = ConfusionMatrix::from_pairs(&[0, 1, 1], &[0, 0, 2]).unwrap();
        assert_eq!(m.labels(), &[0, 1, 2]);
        assert_eq!(m.consumers_accuracy()[1], 0.0);
        assert_eq!(m.producers_accuracy()[2], 0.0);
        assert_eq!(m.f1_scores()[1], 0.0);

        let empty = ConfusionMatrix::from_pairs(&[], &[]).unwrap();
        assert_eq!(empty.accuracy(), 0.0);
        assert_eq!(empty.kappa(), 0.0);
    }

    #[test]
    fn perfect_agreement() {
        let m = ConfusionMatrix::from_pairs(&[0, 1, 0, 1], &[0, 1, 0, 1]).unwrap();
        assert_eq!(m.accuracy(), 1.0);
        assert_eq!(m.kappa(), 1.0);
        // single class: pe = 1, kappa falls back to 0
        let single = ConfusionMatrix::from_pairs(&[3, 3], &[3, 3]).unwrap();
        assert_eq!(single.kappa(), 0.0);
    }

    #[test]
    fn report_collects_metrics() {
        let r = matrix().report();
        assert_eq!(r.samples, 100);
        assert_eq!(r.classes.len(), 2);
        assert_eq!(r.classes[0].reference, 50);
        assert_eq!(r.classes[0].predicted, 55);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["matrix"]["counts"][1][0], 10);
    }

    #[test]
    fn mismatched_lengths() {
        assert!(ConfusionMatrix::from_pairs(&[0, 1], &[0]).is_err());
        assert!(ConfusionMatrix::with_labels(vec![0], &[1], &[0]).is_err());
    }

    #[test]
    fn display_table() {
        let text = matrix().to_string();
        assert!(text.contains("45"));
        assert_eq!(text.lines().count(), 3);
    }
}
