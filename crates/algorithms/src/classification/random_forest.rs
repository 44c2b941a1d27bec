//! Random Forest classifier
//!
//! An ensemble of CART trees, each grown on a random subset of the
//! training samples and choosing each split among a random subset of the
//! features. Prediction is the majority vote of the trees.

use super::tree::{majority, DecisionTree, TreeParams};
use crate::maybe_rayon::*;
use crate::sampling::SampleSet;
use lcmap_core::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Parameters for Random Forest training
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestParams {
    /// Number of trees (default 100)
    pub number_of_trees: usize,
    /// Features tried per split (None → ⌊√n_features⌋, at least 1)
    pub variables_per_split: Option<usize>,
    /// Minimum samples in a leaf (default 1)
    pub min_leaf_population: usize,
    /// Fraction of samples drawn per tree (default 0.5, without
    /// replacement; 1.0 draws a bootstrap sample with replacement)
    pub bag_fraction: f64,
    /// Maximum leaves per tree (None = unlimited)
    pub max_nodes: Option<usize>,
    /// Random seed (default 0)
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            number_of_trees: 100,
            variables_per_split: None,
            min_leaf_population: 1,
            bag_fraction: 0.5,
            max_nodes: None,
            seed: 0,
        }
    }
}

/// A trained Random Forest
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    classes: Vec<i64>,
    feature_names: Vec<String>,
    params: RandomForestParams,
    oob_error: Option<f64>,
}

impl RandomForest {
    /// Train on the `feature_names` columns of `samples`.
    ///
    /// Fails on an empty training set, on unknown feature names and on
    /// non-finite sample values. Training is deterministic for a given
    /// `params.seed`, whether or not trees are grown in parallel.
    pub fn train(
        samples: &SampleSet,
        feature_names: &[impl AsRef<str>],
        params: RandomForestParams,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Empty("Random Forest training set".into()));
        }
        if feature_names.is_empty() {
            return Err(Error::InvalidParameter {
                name: "feature_names",
                value: "[]".into(),
                reason: "at least one feature is required".into(),
            });
        }
        if params.number_of_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "number_of_trees",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !(params.bag_fraction > 0.0 && params.bag_fraction <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "bag_fraction",
                value: params.bag_fraction.to_string(),
                reason: "must be in (0, 1]".into(),
            });
        }

        let columns = column_indices(&samples.feature_names, feature_names)?;
        let x: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| columns.iter().map(|&c| s.values[c]).collect())
            .collect();
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Algorithm("training samples contain NaN values".into()));
        }

        let mut classes: Vec<i64> = samples.iter().map(|s| s.label).collect();
        classes.sort_unstable();
        classes.dedup();
        let y: Vec<usize> = samples
            .iter()
            .map(|s| classes.binary_search(&s.label).unwrap_or(0))
            .collect();

        let n = x.len();
        let n_features = columns.len();
        let tree_params = TreeParams {
            variables_per_split: params
                .variables_per_split
                .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
                .clamp(1, n_features),
            min_leaf_population: params.min_leaf_population.max(1),
            max_nodes: params.max_nodes,
        };
        info!(
            trees = params.number_of_trees,
            samples = n,
            features = n_features,
            classes = classes.len(),
            mtry = tree_params.variables_per_split,
            "training Random Forest"
        );

        let grown: Vec<(DecisionTree, Vec<bool>)> = (0..params.number_of_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let bag = draw_bag(n, params.bag_fraction, &mut rng);
                let mut in_bag = vec![false; n];
                for &i in &bag {
                    in_bag[i] = true;
                }
                let tree = DecisionTree::fit(&x, &y, classes.len(), bag, tree_params, &mut rng);
                (tree, in_bag)
            })
            .collect();

        let oob_error = out_of_bag_error(&grown, &x, &y, classes.len());
        if let Some(e) = oob_error {
            debug!(oob_error = e, "out-of-bag error estimate");
        }

        Ok(Self {
            trees: grown.into_iter().map(|(t, _)| t).collect(),
            classes,
            feature_names: feature_names.iter().map(|f| f.as_ref().to_string()).collect(),
            params,
            oob_error,
        })
    }

    /// Majority-vote label for one feature vector (ties → smallest label)
    pub fn predict(&self, features: &[f64]) -> Result<i64> {
        if features.len() != self.feature_names.len() {
            return Err(Error::Algorithm(format!(
                "expected {} features ({}), got {}",
                self.feature_names.len(),
                self.feature_names.join(", "),
                features.len()
            )));
        }
        let mut votes = vec![0usize; self.classes.len()];
        Ok(self.vote(features, &mut votes))
    }

    /// Prediction without the length check; `votes` is scratch space of
    /// `classes().len()` entries
    pub(crate) fn vote(&self, features: &[f64], votes: &mut [usize]) -> i64 {
        votes.iter_mut().for_each(|v| *v = 0);
        for tree in &self.trees {
            votes[tree.predict(features)] += 1;
        }
        self.classes[majority(votes)]
    }

    /// Sorted class labels seen in training
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Feature (band) names, in prediction order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Share of out-of-bag samples misclassified by the trees that did not
    /// see them. None when every sample was in every bag.
    pub fn out_of_bag_error(&self) -> Option<f64> {
        self.oob_error
    }

    /// Mean decrease in Gini impurity per feature, normalized to sum to 1
    pub fn variable_importance(&self) -> Vec<(String, f64)> {
        let mut total = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            for (t, v) in total.iter_mut().zip(tree.importance()) {
                *t += v;
            }
        }
        let sum: f64 = total.iter().sum();
        self.feature_names
            .iter()
            .cloned()
            .zip(total.into_iter().map(|v| if sum > 0.0 { v / sum } else { 0.0 }))
            .collect()
    }
}

/// Positions of `wanted` in `available`
pub(crate) fn column_indices(
    available: &[String],
    wanted: &[impl AsRef<str>],
) -> Result<Vec<usize>> {
    wanted
        .iter()
        .map(|name| {
            let name = name.as_ref();
            available
                .iter()
                .position(|a| a == name)
                .ok_or_else(|| Error::InvalidParameter {
                    name: "feature_names",
                    value: name.to_string(),
                    reason: format!("not among sampled bands [{}]", available.join(", ")),
                })
        })
        .collect()
}

fn draw_bag(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).map(|_| rng.gen_range(0..n)).collect();
    }
    let k = ((n as f64 * fraction).round() as usize).clamp(1, n);
    index::sample(rng, n, k).into_vec()
}

fn out_of_bag_error(
    grown: &[(DecisionTree, Vec<bool>)],
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
) -> Option<f64> {
    let mut scored = 0usize;
    let mut wrong = 0usize;
    let mut votes = vec![0usize; n_classes];
    for (i, row) in x.iter().enumerate() {
        votes.iter_mut().for_each(|v| *v = 0);
        let mut any = false;
        for (tree, in_bag) in grown {
            if !in_bag[i] {
                votes[tree.predict(row)] += 1;
                any = true;
            }
        }
        if any {
            scored += 1;
            if majority(&votes) != y[i] {
                wrong += 1;
            }
        }
    }
    (scored > 0).then(|| wrong as f64 / scored as f64)
}
