//! Functional-ANOVA variance decomposition over a trained forest.
//!
//! [`FanovaEngine`] fits a bootstrapped regression forest once, then
//! answers importance queries: the fraction of total predicted variance
//! attributable to a subset of features (`V_U / V`), and pure pairwise
//! interaction fractions (`(V_{jk} - V_j - V_k) / V`).
//!
//! # Reference
//!
//! Hutter, F., Hoos, H. & Leyton-Brown, K. (2014). "An Efficient
//! Approach for Assessing Hyperparameter Importance." ICML 2014.

use crate::error::{Error, Result};
use crate::forest::{Forest, ForestConfig, variance};

/// Tree-based variance-decomposition engine.
pub struct FanovaEngine {
    forest: Forest,
    data: Vec<Vec<f64>>,
    names: Vec<String>,
    total_variance: f64,
}

impl FanovaEngine {
    /// Builds the engine on feature rows, targets, and feature names.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or mismatched data.
    pub fn new(data: Vec<Vec<f64>>, targets: &[f64], names: Vec<String>, seed: u64) -> Result<Self> {
        let config = ForestConfig {
            bootstrap: true,
            seed: Some(seed),
            ..ForestConfig::default()
        };
        let forest = Forest::fit(&data, targets, &config)?;
        let preds: Vec<f64> = data.iter().map(|row| forest.predict(row).0).collect();
        let total_variance = variance(&preds);
        Ok(Self {
            forest,
            data,
            names,
            total_variance,
        })
    }

    /// Total variance of the forest prediction over the training rows.
    #[must_use]
    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }

    /// Fraction of total variance attributable to the feature subset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateVariance`] when the total predicted
    /// variance is zero — the fraction would divide by zero. This is
    /// deterministic for a given forest, so callers must not retry.
    pub fn quantify_importance(&self, subset: &[usize]) -> Result<f64> {
        if self.total_variance == 0.0 {
            return Err(Error::DegenerateVariance);
        }
        Ok(self.subset_variance(subset) / self.total_variance)
    }

    /// Pure pairwise interaction fractions among the named features,
    /// sorted descending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateVariance`] on zero total variance and
    /// [`Error::UnknownHyperparameter`] for names the engine was not
    /// built with.
    pub fn get_most_important_pairwise_marginals(
        &self,
        params: &[String],
    ) -> Result<Vec<((String, String), f64)>> {
        if self.total_variance == 0.0 {
            return Err(Error::DegenerateVariance);
        }

        let indices: Vec<usize> = params
            .iter()
            .map(|name| {
                self.names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| Error::UnknownHyperparameter(name.clone()))
            })
            .collect::<Result<_>>()?;

        let mut pairs = Vec::new();
        for (a, &j) in indices.iter().enumerate() {
            for &k in &indices[a + 1..] {
                let joint = self.subset_variance(&[j, k]);
                let main_j = self.subset_variance(&[j]);
                let main_k = self.subset_variance(&[k]);
                let interaction = ((joint - main_j - main_k) / self.total_variance).max(0.0);
                pairs.push(((self.names[j].clone(), self.names[k].clone()), interaction));
            }
        }
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(core::cmp::Ordering::Equal));
        Ok(pairs)
    }

    /// Variance over the training rows of the subset-marginal prediction.
    fn subset_variance(&self, subset: &[usize]) -> f64 {
        let preds: Vec<f64> = self
            .data
            .iter()
            .map(|row| self.forest.marginal_predict(subset, row))
            .collect();
        variance(&preds)
    }
}
