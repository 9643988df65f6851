//! Surrogate performance models.
//!
//! The [`Surrogate`] trait is the seam between data preparation and the
//! evaluators: a regression model mapping configuration vectors to
//! predicted cost, with marginal prediction over problem instances. The
//! shipped implementation is [`RandomForestSurrogate`]; anything
//! implementing the trait can stand in.

use crate::error::{Error, Result};
use crate::forest::{Forest, ForestConfig, variance};

/// A regression model over configuration (+ instance feature) rows.
///
/// Invariant: [`train`](Surrogate::train) must be called before any
/// prediction, and the column count is fixed by the first training call.
pub trait Surrogate {
    /// Fits the model on feature rows `x` against targets `y`.
    ///
    /// # Errors
    ///
    /// Returns an error on shape mismatches or empty data.
    fn train(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// Predicts mean and variance per configuration row, marginalized
    /// over all instance features the model was built with.
    ///
    /// Rows carry configuration columns only (no instance features).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotTrained`] before the first training call.
    fn predict_marginalized_over_instances(&self, x: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<f64>)>;

    /// Whether the model was built with per-instance feature rows.
    fn has_instance_features(&self) -> bool;

    /// Number of configuration columns (excluding instance features).
    fn n_params(&self) -> usize;
}

/// Random-forest surrogate with optional instance features.
///
/// Two variants exist: [`standard`](RandomForestSurrogate::standard) for
/// plain scalar objectives, and [`runtime`](RandomForestSurrogate::runtime)
/// for runtime-like objectives — bootstrapped, with a higher tree count,
/// trained on base-10 logs and predicting in the untransformed scale
/// capped at the penalized threshold.
pub struct RandomForestSurrogate {
    config: ForestConfig,
    n_params: usize,
    instance_features: Vec<Vec<f64>>,
    /// Base-10 log of the cap applied to untransformed predictions.
    log10_cap: Option<f64>,
    forest: Option<Forest>,
    n_columns: Option<usize>,
}

impl RandomForestSurrogate {
    /// Standard variant for plain scalar objectives.
    #[must_use]
    pub fn standard(n_params: usize, instance_features: Vec<Vec<f64>>, seed: u64) -> Self {
        Self {
            config: ForestConfig {
                seed: Some(seed),
                ..ForestConfig::default()
            },
            n_params,
            instance_features,
            log10_cap: None,
            forest: None,
            n_columns: None,
        }
    }

    /// Runtime variant: bootstrapped, 80 trees, log-capped predictions.
    ///
    /// `log_threshold` is the base-10 log of the penalized cutoff; the
    /// model is trained on log costs and predicts untransformed runtimes
    /// capped at `10^log_threshold`.
    #[must_use]
    pub fn runtime(
        n_params: usize,
        instance_features: Vec<Vec<f64>>,
        seed: u64,
        log_threshold: f64,
    ) -> Self {
        Self {
            config: ForestConfig {
                n_trees: 80,
                bootstrap: true,
                seed: Some(seed),
                ..ForestConfig::default()
            },
            n_params,
            instance_features,
            log10_cap: Some(log_threshold),
            forest: None,
            n_columns: None,
        }
    }

    fn trained_forest(&self) -> Result<&Forest> {
        self.forest.as_ref().ok_or(Error::NotTrained)
    }

    /// Mean/variance for one full feature row, undoing the log transform
    /// for the runtime variant.
    #[allow(clippy::cast_precision_loss)]
    fn predict_row(&self, forest: &Forest, row: &[f64]) -> (f64, f64) {
        match self.log10_cap {
            None => forest.predict(row),
            Some(threshold) => {
                let cap = 10f64.powf(threshold);
                let preds: Vec<f64> = forest
                    .tree_predictions(row)
                    .map(|p| 10f64.powf(p).min(cap))
                    .collect();
                let mean = preds.iter().sum::<f64>() / preds.len() as f64;
                (mean, variance(&preds))
            }
        }
    }
}

impl Surrogate for RandomForestSurrogate {
    fn train(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if let (Some(expected), Some(first)) = (self.n_columns, x.first())
            && first.len() != expected
        {
            return Err(Error::Internal("feature count changed after first training"));
        }
        trace_debug!(rows = x.len(), "training random-forest surrogate");
        let forest = Forest::fit(x, y, &self.config)?;
        self.n_columns = Some(forest.n_features());
        self.forest = Some(forest);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict_marginalized_over_instances(&self, x: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<f64>)> {
        let forest = self.trained_forest()?;
        let mut means = Vec::with_capacity(x.len());
        let mut vars = Vec::with_capacity(x.len());

        for row in x {
            if row.len() != self.n_params {
                return Err(Error::Internal(
                    "marginalized prediction expects configuration columns only",
                ));
            }
            if self.instance_features.is_empty() {
                let (m, v) = self.predict_row(forest, row);
                means.push(m);
                vars.push(v);
            } else {
                // Law of total variance across the instance set.
                let mut inst_means = Vec::with_capacity(self.instance_features.len());
                let mut inst_vars = Vec::with_capacity(self.instance_features.len());
                let mut full = Vec::with_capacity(row.len() + self.instance_features[0].len());
                for features in &self.instance_features {
                    full.clear();
                    full.extend_from_slice(row);
                    full.extend_from_slice(features);
                    let (m, v) = self.predict_row(forest, &full);
                    inst_means.push(m);
                    inst_vars.push(v);
                }
                let n = inst_means.len() as f64;
                means.push(inst_means.iter().sum::<f64>() / n);
                vars.push(variance(&inst_means) + inst_vars.iter().sum::<f64>() / n);
            }
        }
        Ok((means, vars))
    }

    fn has_instance_features(&self) -> bool {
        !self.instance_features.is_empty()
    }

    fn n_params(&self) -> usize {
        self.n_params
    }
}
