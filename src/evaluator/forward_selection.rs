//! Forward-selection importance: greedy growth of the parameter subset
//! that best predicts observed performance.
//!
//! Each round fits an auxiliary forest on the selected columns plus one
//! candidate and keeps the candidate with the lowest holdout RMSE. The
//! reported value for a parameter is the RMSE at its selection, so
//! values are decreasing along the ranking.

use crate::error::Result;
use crate::evaluator::{EvaluationResult, Evaluator, EvaluatorSetup, ImportanceMap};
use crate::forest::{Forest, ForestConfig};
use crate::rng_util::partial_shuffle;

/// Fraction of rows held out for RMSE scoring.
const HOLDOUT_FRACTION: f64 = 0.3;
/// Tree count of the per-candidate auxiliary forests.
const AUX_TREES: usize = 10;

/// Greedy forward subset selection.
pub struct ForwardSelector {
    setup: EvaluatorSetup,
    importance: ImportanceMap,
}

impl ForwardSelector {
    /// Builds the evaluator.
    ///
    /// # Errors
    ///
    /// Construction itself cannot fail; the signature matches the shared
    /// evaluator contract.
    pub fn new(setup: EvaluatorSetup) -> Result<Self> {
        Ok(Self {
            setup,
            importance: ImportanceMap::new(),
        })
    }
}

impl Evaluator for ForwardSelector {
    fn name(&self) -> &'static str {
        "Forward Selection"
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn run(&mut self) -> Result<EvaluationResult> {
        let space = &self.setup.space;
        let n_params = space.len();
        let rows = &*self.setup.x;
        let targets = &*self.setup.y;

        let mut rng = fastrand::Rng::with_seed(self.setup.seed);
        let n_test = ((rows.len() as f64 * HOLDOUT_FRACTION) as usize).max(1);
        let shuffled = partial_shuffle(rows.len(), rows.len(), &mut rng);
        let (test_idx, train_idx) = shuffled.split_at(n_test.min(rows.len().saturating_sub(1)));

        let mut selected: Vec<usize> = Vec::new();
        let mut remaining: Vec<usize> = (0..n_params).collect();
        let mut importance = ImportanceMap::new();

        while !remaining.is_empty() && selected.len() < self.setup.report_limit() {
            let mut best: Option<(usize, f64)> = None;
            for (pos, &candidate) in remaining.iter().enumerate() {
                let mut columns = selected.clone();
                columns.push(candidate);

                let train_x: Vec<Vec<f64>> = train_idx
                    .iter()
                    .map(|&i| columns.iter().map(|&c| rows[i][c]).collect())
                    .collect();
                let train_y: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();

                let config = ForestConfig {
                    n_trees: AUX_TREES,
                    bootstrap: true,
                    seed: Some(rng.u64(0..100_000)),
                    ..ForestConfig::default()
                };
                let forest = Forest::fit(&train_x, &train_y, &config)?;

                let sq_err: f64 = test_idx
                    .iter()
                    .map(|&i| {
                        let row: Vec<f64> = columns.iter().map(|&c| rows[i][c]).collect();
                        (forest.predict(&row).0 - targets[i]).powi(2)
                    })
                    .sum();
                let rmse = (sq_err / test_idx.len() as f64).sqrt();

                if best.is_none_or(|(_, r)| rmse < r) {
                    best = Some((pos, rmse));
                }
            }

            let Some((pos, rmse)) = best else { break };
            let idx = remaining.remove(pos);
            trace_debug!(param = space.hyperparameters()[idx].name(), rmse, "selected");
            importance.insert(space.hyperparameters()[idx].name(), rmse);
            selected.push(idx);
        }

        self.importance = importance.clone();
        Ok(EvaluationResult::from_map(importance))
    }

    fn importance(&self) -> &ImportanceMap {
        &self.importance
    }
}
