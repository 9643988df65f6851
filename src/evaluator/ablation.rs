//! Ablation importance: the greedy path from the default configuration
//! to the incumbent.
//!
//! Starting at the default, the flip that most improves the predicted
//! performance is applied first; each parameter's importance is its
//! share of the total default-to-incumbent improvement.

use crate::error::Result;
use crate::evaluator::{EvaluationResult, Evaluator, EvaluatorSetup, ImportanceMap};
use crate::space::Configuration;

/// Greedy default-to-incumbent ablation.
pub struct AblationEvaluator {
    setup: EvaluatorSetup,
    incumbent: Configuration,
    importance: ImportanceMap,
}

impl std::fmt::Debug for AblationEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AblationEvaluator")
            .field("incumbent", &self.incumbent)
            .field("importance", &self.importance)
            .finish_non_exhaustive()
    }
}

impl AblationEvaluator {
    /// Builds the evaluator; fails without a resolved incumbent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingIncumbent`] when the setup carries
    /// no incumbent.
    pub fn new(setup: EvaluatorSetup) -> Result<Self> {
        let incumbent = setup.require_incumbent("ablation")?;
        Ok(Self {
            setup,
            incumbent,
            importance: ImportanceMap::new(),
        })
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        let (means, _) = self
            .setup
            .model
            .predict_marginalized_over_instances(&[row.to_vec()])?;
        Ok(means[0])
    }
}

impl Evaluator for AblationEvaluator {
    fn name(&self) -> &'static str {
        "Ablation"
    }

    fn run(&mut self) -> Result<EvaluationResult> {
        let space = &self.setup.space;
        let source = space
            .impute_inactive_values(&space.default_configuration())
            .values()
            .to_vec();
        let target = space
            .impute_inactive_values(&self.incumbent)
            .values()
            .to_vec();

        let mut candidates: Vec<usize> = (0..space.len())
            .filter(|&i| (source[i] - target[i]).abs() > 1e-12)
            .collect();

        let default_pred = self.predict(&source)?;
        let incumbent_pred = self.predict(&target)?;
        trace_info!(default_pred, incumbent_pred, flips = candidates.len(), "ablation path");

        let mut current = source;
        let mut current_pred = default_pred;
        let mut flips: Vec<(usize, f64)> = Vec::with_capacity(candidates.len());

        while !candidates.is_empty() {
            let mut best: Option<(usize, Vec<f64>, f64)> = None;
            for (pos, &idx) in candidates.iter().enumerate() {
                let mut flipped = current.clone();
                flipped[idx] = target[idx];
                let pred = self.predict(&flipped)?;
                if best.as_ref().is_none_or(|(_, _, p)| pred < *p) {
                    best = Some((pos, flipped, pred));
                }
            }
            let Some((pos, flipped, pred)) = best else {
                break;
            };
            let idx = candidates.remove(pos);
            flips.push((idx, current_pred - pred));
            current = flipped;
            current_pred = pred;
        }

        // Each flip's share of the total default-to-incumbent improvement.
        let total = default_pred - incumbent_pred;
        let mut importance = ImportanceMap::new();
        for &(idx, improvement) in flips.iter().take(self.setup.report_limit()) {
            let value = if total.abs() > 1e-12 {
                improvement / total
            } else {
                improvement
            };
            importance.insert(space.hyperparameters()[idx].name(), value);
        }

        self.importance = importance.clone();
        Ok(EvaluationResult::from_map(importance))
    }

    fn importance(&self) -> &ImportanceMap {
        &self.importance
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::history::RunHistory;
    use crate::rng_util;
    use crate::space::{ConfigSpace, Hyperparameter, ParamValue};
    use crate::surrogate::{RandomForestSurrogate, Surrogate};

    fn setup(with_incumbent: bool) -> EvaluatorSetup {
        let space = Arc::new(
            ConfigSpace::new(vec![
                Hyperparameter::continuous("alpha", 0.0, 1.0).default_value(ParamValue::Float(1.0)),
                Hyperparameter::continuous("beta", 0.0, 1.0).default_value(ParamValue::Float(1.0)),
            ])
            .unwrap(),
        );

        // Cost rises with both parameters; alpha matters 10x more.
        let mut rng = fastrand::Rng::with_seed(8);
        let x: Vec<Vec<f64>> = (0..200)
            .map(|_| {
                vec![
                    rng_util::f64_range(&mut rng, 0.0, 1.0),
                    rng_util::f64_range(&mut rng, 0.0, 1.0),
                ]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 10.0 * r[0] + r[1]).collect();
        let mut model = RandomForestSurrogate::standard(2, Vec::new(), 13);
        model.train(&x, &y).unwrap();

        let incumbent = space
            .configuration(&[
                ("alpha", ParamValue::Float(0.0)),
                ("beta", ParamValue::Float(0.0)),
            ])
            .unwrap();

        EvaluatorSetup {
            space,
            model: Arc::new(model),
            x: Arc::new(x),
            y: Arc::new(y),
            history: Arc::new(RunHistory::new()),
            to_evaluate: None,
            incumbent: with_incumbent.then_some(incumbent),
            margin: None,
            seed: 42,
        }
    }

    #[test]
    fn requires_incumbent() {
        let err = AblationEvaluator::new(setup(false)).unwrap_err();
        assert!(matches!(err, Error::MissingIncumbent("ablation")));
    }

    #[test]
    fn dominant_flip_comes_first() {
        let mut evaluator = AblationEvaluator::new(setup(true)).unwrap();
        let result = evaluator.run().unwrap();
        assert_eq!(result.order[0], "alpha");
        let alpha = result.importance.get("alpha").unwrap();
        let beta = result.importance.get("beta").unwrap();
        assert!(alpha > beta, "alpha = {alpha}, beta = {beta}");
    }
}
