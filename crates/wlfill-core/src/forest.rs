//! Bagged regression forest.
//!
//! CART regression trees grown on bootstrap samples with per-node feature
//! subsampling; predictions are the mean over trees. Trees are built in
//! parallel and seeded individually, so a forest is reproducible from its
//! seed regardless of thread scheduling.

use crate::error::{FillError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::fmt;

/// Number of features examined when searching a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// Square root of the feature count
    Sqrt,
    /// Fraction of the feature count
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        };
        n.clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::All => write!(f, "all"),
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Fraction(x) => write!(f, "{x}"),
        }
    }
}

/// Hyperparameters of a forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree (`None` grows until leaves are pure or small)
    pub max_depth: Option<usize>,
    /// Minimum rows required to split a node
    pub min_samples_split: usize,
    /// Minimum rows in each leaf
    pub min_samples_leaf: usize,
    /// Features examined per split
    pub max_features: MaxFeatures,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
        }
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self
            .max_depth
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_split={} min_samples_leaf={} max_features={} bootstrap={}",
            self.n_estimators,
            depth,
            self.min_samples_split,
            self.min_samples_leaf,
            self.max_features,
            self.bootstrap
        )
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample: Vec<usize>,
        params: &ForestParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.ncols();
        let mtry = params.max_features.resolve(n_features);
        let min_split = params.min_samples_split.max(2);
        let min_leaf = params.min_samples_leaf.max(1);

        let mut feature_pool: Vec<usize> = (0..n_features).collect();
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![(0usize, sample, 0usize)];

        while let Some((node_id, indices, depth)) = stack.pop() {
            let value = indices.iter().map(|&i| y[i]).mean();

            let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
            if indices.len() < min_split || depth_reached || is_constant(y, &indices) {
                nodes[node_id] = Node::Leaf { value };
                continue;
            }

            let (candidates, _) = feature_pool.partial_shuffle(rng, mtry);
            let best = candidates
                .iter()
                .filter_map(|&feature| best_split(x, y, &indices, feature, min_leaf))
                .max_by(|a, b| a.score.total_cmp(&b.score));

            let Some(split) = best else {
                nodes[node_id] = Node::Leaf { value };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node_id] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            stack.push((left, left_rows, depth + 1));
            stack.push((right, right_rows, depth + 1));
        }

        Self { nodes }
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn is_constant(y: &Array1<f64>, indices: &[usize]) -> bool {
    let first = y[indices[0]];
    indices.iter().all(|&i| (y[i] - first).abs() < 1e-12)
}

/// Best threshold on one feature by variance reduction.
///
/// Rows are sorted on the feature and swept once with running sums. The
/// score `sum_l^2 / n_l + sum_r^2 / n_r` is maximised, which is equivalent to
/// minimising the children's summed squared error.
fn best_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    if n < 2 * min_leaf {
        return None;
    }

    let mut order = indices.to_vec();
    order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let total: f64 = order.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut left_sum = 0.0;

    for k in 1..n {
        left_sum += y[order[k - 1]];
        if k < min_leaf || n - k < min_leaf {
            continue;
        }
        let lo = x[[order[k - 1], feature]];
        let hi = x[[order[k], feature]];
        if lo >= hi {
            continue;
        }

        let right_sum = total - left_sum;
        let score = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
        if score > parent_score + 1e-9 && best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SplitCandidate {
                feature,
                threshold: (lo + hi) / 2.0,
                score,
            });
        }
    }

    best
}

/// A fitted regression forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest; tree `i` is seeded with `seed + i`.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &ForestParams, seed: u64) -> Result<Self> {
        let n_samples = x.nrows();

        if n_samples != y.len() {
            return Err(FillError::InvalidInput(format!(
                "Feature matrix has {} rows but target has {}",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(FillError::insufficient("forest training set", 1, 0));
        }
        if params.n_estimators == 0 {
            return Err(FillError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }

        let trees: Vec<RegressionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                RegressionTree::fit(x, y, sample, params, &mut rng)
            })
            .collect();

        Ok(Self {
            params: params.clone(),
            trees,
            n_features: x.ncols(),
        })
    }

    /// Predict one value per row of `x`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(FillError::InvalidInput(format!(
                "Forest was fitted on {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let n_trees = self.trees.len() as f64;
        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    /// Hyperparameters the forest was fitted with.
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Depth of the deepest tree.
    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
    }
}
