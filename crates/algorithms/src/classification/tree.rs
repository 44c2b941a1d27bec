//! CART decision tree with Gini impurity, used as the Random Forest base learner.

use rand::rngs::StdRng;
use rand::seq::index;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for one tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub variables_per_split: usize,
    pub min_leaf_population: usize,
    pub max_nodes: Option<usize>,
}

/// A trained tree. Classes are indices into the forest's class list.
#[derive(Debug, Clone)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
    /// Total weighted Gini decrease per feature
    importance: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the rows of `x` listed in `bag`.
    ///
    /// `y[i]` is the class index of row `i`, `n_classes` bounds it.
    /// Nodes are expanded breadth-first so `max_nodes` (leaf count)
    /// truncates every branch evenly.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        bag: Vec<usize>,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map_or(0, |r| r.len());
        let mut tree = DecisionTree {
            nodes: vec![Node::Leaf { class: 0 }],
            importance: vec![0.0; n_features],
        };
        let max_leaves = params.max_nodes.unwrap_or(usize::MAX).max(1);
        let mut leaves = 1;

        let mut queue = VecDeque::from([(0usize, bag)]);
        while let Some((node, idx)) = queue.pop_front() {
            let counts = class_counts(y, &idx, n_classes);
            let class = majority(&counts);

            let split = if leaves < max_leaves {
                best_split(x, y, &idx, &counts, n_features, params, rng)
            } else {
                None
            };

            let Some(split) = split else {
                tree.nodes[node] = Node::Leaf { class };
                continue;
            };

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                .into_iter()
                .partition(|&i| x[i][split.feature] <= split.threshold);

            let left = tree.nodes.len();
            let right = left + 1;
            tree.nodes.push(Node::Leaf { class });
            tree.nodes.push(Node::Leaf { class });
            tree.nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            tree.importance[split.feature] += split.decrease;
            leaves += 1;

            queue.push_back((left, left_idx));
            queue.push_back((right, right_idx));
        }

        tree
    }

    /// Class index predicted for one feature vector
    pub fn predict(&self, features: &[f64]) -> usize {
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    /// Weighted impurity decrease: n * gini(parent) - (nl * gini(l) + nr * gini(r))
    decrease: f64,
}

fn class_counts(y: &[usize], idx: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in idx {
        counts[y[i]] += 1;
    }
    counts
}

/// Most frequent class; ties go to the lowest index
pub(crate) fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = class;
        }
    }
    best
}

/// `n * gini = n - sum(c^2) / n`
fn weighted_gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let sum_sq: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
    n as f64 - sum_sq / n as f64
}

fn best_split(
    x: &[Vec<f64>],
    y: &[usize],
    idx: &[usize],
    counts: &[usize],
    n_features: usize,
    params: TreeParams,
    rng: &mut StdRng,
) -> Option<Split> {
    let n = idx.len();
    let min_leaf = params.min_leaf_population.max(1);
    if n_features == 0 || n < 2 * min_leaf || counts.iter().filter(|&&c| c > 0).count() < 2 {
        return None;
    }

    let parent = weighted_gini(counts, n);
    let mtry = params.variables_per_split.clamp(1, n_features);
    let mut best: Option<Split> = None;
    let mut sorted = idx.to_vec();
    let mut left = vec![0usize; counts.len()];
    let mut right = vec![0usize; counts.len()];

    for feature in index::sample(rng, n_features, mtry).into_iter() {
        sorted.sort_unstable_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        left.iter_mut().for_each(|c| *c = 0);
        right.copy_from_slice(counts);

        for pos in 0..n - 1 {
            let class = y[sorted[pos]];
            left[class] += 1;
            right[class] -= 1;

            let v = x[sorted[pos]][feature];
            let next = x[sorted[pos + 1]][feature];
            let n_left = pos + 1;
            if v == next || n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }

            let impurity = weighted_gini(&left, n_left) + weighted_gini(&right, n - n_left);
            let decrease = parent - impurity;
            if decrease > 1e-12 && best.as_ref().map_or(true, |b| decrease > b.decrease) {
                best = Some(Split {
                    feature,
                    threshold: v + (next - v) / 2.0,
                    decrease,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            variables_per_split: 2,
            min_leaf_population: 1,
            max_nodes: None,
        }
    }

    #[test]
    fn separates_threshold_data() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 5.0]).collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 12)).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&x, &y, 2, (0..20).collect(), params(), &mut rng);

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.predict(&[11.0, 5.0]), 0);
        assert_eq!(tree.predict(&[11.6, 5.0]), 1);
        // threshold at the midpoint 11.5
        assert_eq!(tree.predict(&[11.5, 5.0]), 0);
        assert!(tree.importance()[0] > 0.0);
        assert_eq!(tree.importance()[1], 0.0);
    }

    #[test]
    fn pure_node_is_a_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![1, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&x, &y, 2, vec![0, 1], params(), &mut rng);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[100.0]), 1);
    }

    #[test]
    fn max_nodes_limits_leaves() {
        // alternating labels need many splits
        let x: Vec<Vec<f64>> = (0..32).map(|i| vec![i as f64]).collect();
        let y: Vec<usize> = (0..32).map(|i| i % 2).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let limited = TreeParams {
            variables_per_split: 1,
            max_nodes: Some(4),
            ..params()
        };
        let tree = DecisionTree::fit(&x, &y, 2, (0..32).collect(), limited, &mut rng);
        // leaves = (nodes + 1) / 2 for a binary tree
        assert!((tree.node_count() + 1) / 2 <= 4);
    }

    #[test]
    fn min_leaf_population_is_respected() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<usize> = (0..10).map(|i| usize::from(i == 9)).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let p = TreeParams {
            variables_per_split: 1,
            min_leaf_population: 2,
            max_nodes: None,
        };
        let tree = DecisionTree::fit(&x, &y, 2, (0..10).collect(), p, &mut rng);
        // the lone class-1 row cannot be isolated
        assert_eq!(tree.predict(&[9.0]), 0);
    }

    #[test]
    fn majority_breaks_ties_low() {
        assert_eq!(majority(&[2, 2, 1]), 0);
        assert_eq!(majority(&[1, 3, 3]), 1);
    }
}
