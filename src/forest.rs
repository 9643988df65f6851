//! Regression random forest shared by the surrogate model and the
//! variance-decomposition engine.
//!
//! Trees are arena-allocated and grown with variance-reduction splits
//! over a random sqrt-sized feature subset per node. Besides plain
//! prediction, trees support *marginal* prediction over a feature
//! subset: features outside the subset are marginalized by weighting
//! both branches with their training-data fractions.

use crate::error::{Error, Result};
use crate::rng_util::partial_shuffle;

/// Forest construction options.
#[derive(Debug, Clone)]
pub struct ForestConfig {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum depth of each tree. `None` for unlimited.
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples required in a leaf node.
    pub min_samples_leaf: usize,
    /// Whether each tree draws a bootstrap sample of the rows.
    pub bootstrap: bool,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 64,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: false,
            seed: Some(42),
        }
    }
}

/// A node in the regression tree (arena-allocated).
#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// A single regression decision tree.
#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Build a tree from the given data using the specified row indices.
    fn build(
        data: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        config: &ForestConfig,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build_node(data, targets, indices, 0, config, rng);
        tree
    }

    #[allow(clippy::cast_precision_loss)]
    fn build_node(
        &mut self,
        data: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        config: &ForestConfig,
        rng: &mut fastrand::Rng,
    ) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| targets[i]).sum::<f64>() / n as f64;

        // Stopping conditions
        if n < config.min_samples_split || config.max_depth.is_some_and(|d| depth >= d) {
            return self.push_leaf(mean, n);
        }

        // Pure node check (all targets identical)
        #[allow(clippy::float_cmp)]
        if indices.iter().all(|&i| targets[i] == targets[indices[0]]) {
            return self.push_leaf(mean, n);
        }

        let n_features = data[0].len();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_features = ((n_features as f64).sqrt().ceil() as usize)
            .max(1)
            .min(n_features);
        let candidates = partial_shuffle(n_features, max_features, rng);

        // Total variance at this node
        let total_var: f64 = indices.iter().map(|&i| (targets[i] - mean).powi(2)).sum();
        if total_var == 0.0 {
            return self.push_leaf(mean, n);
        }

        let mut best_score = f64::NEG_INFINITY;
        let mut best_feature = 0;
        let mut best_threshold = 0.0;

        for &feat in &candidates {
            let mut values: Vec<f64> = indices.iter().map(|&i| data[i][feat]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
            values.dedup();

            if values.len() < 2 {
                continue;
            }

            for w in values.windows(2) {
                let threshold = f64::midpoint(w[0], w[1]);
                let (l_sum, l_sq, l_n, r_sum, r_sq, r_n) =
                    split_stats(data, targets, indices, feat, threshold);

                if l_n < config.min_samples_leaf || r_n < config.min_samples_leaf {
                    continue;
                }

                let l_var = l_sq - l_sum * l_sum / l_n as f64;
                let r_var = r_sq - r_sum * r_sum / r_n as f64;
                let score = total_var - l_var - r_var;

                if score > best_score {
                    best_score = score;
                    best_feature = feat;
                    best_threshold = threshold;
                }
            }
        }

        if best_score <= 0.0 {
            return self.push_leaf(mean, n);
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data[i][best_feature] <= best_threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return self.push_leaf(mean, n);
        }

        // Reserve slot for this split node (placeholder replaced below)
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: 0.0,
            n_samples: 0,
        });

        let left = self.build_node(data, targets, &left_indices, depth + 1, config, rng);
        let right = self.build_node(data, targets, &right_indices, depth + 1, config, rng);

        self.nodes[node_idx] = TreeNode::Split {
            feature: best_feature,
            threshold: best_threshold,
            left,
            right,
            n_samples: n,
        };

        node_idx
    }

    fn push_leaf(&mut self, value: f64, n_samples: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value, n_samples });
        idx
    }

    /// Predict by following splits all the way to a leaf.
    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    /// Compute marginal prediction for a given feature subset.
    ///
    /// Features in `subset` use values from `row`. Features not in
    /// `subset` are marginalized by weighting branches proportionally to
    /// their training-data fractions.
    pub(crate) fn marginal_predict(&self, subset: &[usize], row: &[f64]) -> f64 {
        self.marginal_predict_at(0, subset, row)
    }

    #[allow(clippy::cast_precision_loss)]
    fn marginal_predict_at(&self, idx: usize, subset: &[usize], vals: &[f64]) -> f64 {
        match self.nodes[idx] {
            TreeNode::Leaf { value, .. } => value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
                n_samples,
            } => {
                if subset.contains(&feature) {
                    if vals[feature] <= threshold {
                        self.marginal_predict_at(left, subset, vals)
                    } else {
                        self.marginal_predict_at(right, subset, vals)
                    }
                } else {
                    let l_n = self.n_samples(left) as f64;
                    let r_n = self.n_samples(right) as f64;
                    let total = n_samples as f64;
                    (l_n / total) * self.marginal_predict_at(left, subset, vals)
                        + (r_n / total) * self.marginal_predict_at(right, subset, vals)
                }
            }
        }
    }

    fn n_samples(&self, idx: usize) -> usize {
        match self.nodes[idx] {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => n_samples,
        }
    }
}

/// A trained regression forest.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl Forest {
    /// Fits a forest on `data` (rows) against `targets`.
    ///
    /// # Errors
    ///
    /// Returns an error for empty data or mismatched row counts.
    pub fn fit(data: &[Vec<f64>], targets: &[f64], config: &ForestConfig) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::NoObservations);
        }
        if data.len() != targets.len() {
            return Err(Error::ShapeMismatch {
                rows_x: data.len(),
                rows_y: targets.len(),
            });
        }

        let n_samples = data.len();
        let mut rng: fastrand::Rng = config
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

        let trees = (0..config.n_trees)
            .map(|_| {
                let indices: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.usize(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                RegressionTree::build(data, targets, &indices, config, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            n_features: data[0].len(),
        })
    }

    /// Returns the number of feature columns the forest was fit on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean and across-tree variance of the prediction for one row.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> (f64, f64) {
        let preds: Vec<f64> = self.trees.iter().map(|t| t.predict(row)).collect();
        let mean = preds.iter().sum::<f64>() / preds.len() as f64;
        (mean, variance(&preds))
    }

    /// Mean over trees of the marginal prediction for a feature subset.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn marginal_predict(&self, subset: &[usize], row: &[f64]) -> f64 {
        self.trees
            .iter()
            .map(|t| t.marginal_predict(subset, row))
            .sum::<f64>()
            / self.trees.len() as f64
    }

    /// Per-tree predictions for one row, for transformed aggregation.
    pub(crate) fn tree_predictions(&self, row: &[f64]) -> impl Iterator<Item = f64> {
        self.trees.iter().map(move |t| t.predict(row))
    }
}

/// Compute left/right split statistics for variance reduction.
#[allow(clippy::cast_precision_loss)]
fn split_stats(
    data: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    feature: usize,
    threshold: f64,
) -> (f64, f64, usize, f64, f64, usize) {
    let (mut l_sum, mut l_sq, mut l_n) = (0.0, 0.0, 0usize);
    let (mut r_sum, mut r_sq, mut r_n) = (0.0, 0.0, 0usize);

    for &i in indices {
        let y = targets[i];
        if data[i][feature] <= threshold {
            l_sum += y;
            l_sq += y * y;
            l_n += 1;
        } else {
            r_sum += y;
            r_sq += y * y;
            r_n += 1;
        }
    }

    (l_sum, l_sq, l_n, r_sum, r_sq, r_n)
}

/// Population variance of a slice.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng_util;

    #[test]
    fn fits_a_linear_target() {
        let mut rng = fastrand::Rng::with_seed(0);
        let data: Vec<Vec<f64>> = (0..200)
            .map(|_| {
                vec![
                    rng_util::f64_range(&mut rng, 0.0, 10.0),
                    rng_util::f64_range(&mut rng, 0.0, 10.0),
                ]
            })
            .collect();
        let targets: Vec<f64> = data.iter().map(|r| 2.0 * r[0]).collect();

        let forest = Forest::fit(&data, &targets, &ForestConfig::default()).unwrap();
        let (mean, _) = forest.predict(&[5.0, 5.0]);
        assert!((mean - 10.0).abs() < 1.5, "prediction = {mean}");
    }

    #[test]
    fn marginal_prediction_ignores_excluded_features() {
        let mut rng = fastrand::Rng::with_seed(1);
        let data: Vec<Vec<f64>> = (0..200)
            .map(|_| {
                vec![
                    rng_util::f64_range(&mut rng, 0.0, 10.0),
                    rng_util::f64_range(&mut rng, 0.0, 10.0),
                ]
            })
            .collect();
        let targets: Vec<f64> = data.iter().map(|r| r[0]).collect();

        let forest = Forest::fit(&data, &targets, &ForestConfig::default()).unwrap();
        // Marginalizing over the irrelevant feature keeps the signal.
        let low = forest.marginal_predict(&[0], &[1.0, 0.0]);
        let high = forest.marginal_predict(&[0], &[9.0, 0.0]);
        assert!(high - low > 5.0, "low = {low}, high = {high}");
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = Forest::fit(&[vec![0.0]], &[1.0, 2.0], &ForestConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(matches!(
            Forest::fit(&[], &[], &ForestConfig::default()),
            Err(Error::NoObservations)
        ));
    }

    #[test]
    fn variance_computation() {
        assert!((variance(&[1.0, 2.0, 3.0, 4.0, 5.0]) - 2.0).abs() < 1e-10);
        assert!(variance(&[5.0, 5.0, 5.0]).abs() < 1e-10);
        assert!(variance(&[]).abs() < 1e-10);
    }
}
