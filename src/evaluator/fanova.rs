//! Variance-decomposition (fANOVA) importance evaluator.
//!
//! Decomposes the variance of the surrogate's predicted performance over
//! the configuration space into per-parameter and pairwise fractions.
//! When the surrogate carries instance features, every configuration ever
//! run is first marginalized over the instance set so that only
//! configuration-space variance remains to be decomposed.

use std::fs::File;
use std::io::BufWriter;

use serde::Serialize;

use crate::anova::FanovaEngine;
use crate::error::{Error, Result};
use crate::evaluator::{EvaluationResult, Evaluator, EvaluatorSetup, ImportanceMap, pair_key};
use crate::space::ConfigSpace;

/// Fixed artifact filename written on degenerate-variance failure.
pub(crate) const CRASH_DUMP_FILE: &str = "fanova_crash_data.json";

/// Number of top-ranked singles considered for pairwise marginals.
const DEFAULT_N_PAIRS: usize = 5;

/// The functional-ANOVA evaluator.
pub struct FanovaEvaluator {
    setup: EvaluatorSetup,
    engine: FanovaEngine,
    /// The exact data the engine was built on, kept for the crash artifact.
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
    n_pairs: usize,
    num_single: usize,
    importance: ImportanceMap,
}

#[derive(Serialize)]
struct CrashDump<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    space: &'a ConfigSpace,
}

impl FanovaEvaluator {
    /// Builds the evaluator and its decomposition engine.
    ///
    /// With instance features, the engine is built on the preprocessed
    /// (marginalized) data; otherwise directly on the setup's (X, y).
    ///
    /// # Errors
    ///
    /// Returns an error when preprocessing prediction fails or the engine
    /// cannot be built.
    pub fn new(setup: EvaluatorSetup) -> Result<Self> {
        let names: Vec<String> = setup
            .space
            .hyperparameters()
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        let (x, y) = if setup.model.has_instance_features() {
            Self::preprocess(&setup)?
        } else {
            ((*setup.x).clone(), (*setup.y).clone())
        };

        let engine = FanovaEngine::new(x.clone(), &y, names, setup.seed)?;
        Ok(Self {
            setup,
            engine,
            x,
            y,
            n_pairs: DEFAULT_N_PAIRS,
            num_single: 0,
            importance: ImportanceMap::new(),
        })
    }

    /// Marginalizes the instance features away: one row per configuration
    /// ever run, predicted performance averaged over all instances.
    ///
    /// Returns `X_non_hyper` (numeric parameters put through their
    /// transform, categoricals untouched) matched with `y_prime`.
    fn preprocess(setup: &EvaluatorSetup) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        trace_info!("marginalizing instance features away");
        let space = &setup.space;
        let mut x_prime = Vec::with_capacity(setup.history.configurations().len());
        let mut x_non_hyper = Vec::with_capacity(x_prime.capacity());

        for config in setup.history.configurations() {
            let imputed = space.impute_inactive_values(config);
            let unit = imputed.values().to_vec();
            let mut transformed = unit.clone();
            for (idx, param) in space.hyperparameters().iter().enumerate() {
                if !param.is_categorical() {
                    transformed[idx] = space.transform(idx, transformed[idx]);
                }
            }
            x_prime.push(unit);
            x_non_hyper.push(transformed);
        }

        let (y_prime, _) = setup.model.predict_marginalized_over_instances(&x_prime)?;
        trace_debug!(rows = x_non_hyper.len(), "preprocessing finished");
        Ok((x_non_hyper, y_prime))
    }

    fn run_inner(&mut self) -> Result<EvaluationResult> {
        let params = self.setup.space.hyperparameters();

        let mut totals = Vec::with_capacity(params.len());
        for idx in 0..params.len() {
            let total = self.engine.quantify_importance(&[idx])?;
            trace_debug!(param = params[idx].name(), total, "singleton importance");
            totals.push(total);
        }

        // Descending by importance; the stable sort keeps ties in
        // configuration-space order.
        let mut ranked: Vec<usize> = (0..totals.len()).collect();
        ranked.sort_by(|&a, &b| {
            totals[b]
                .partial_cmp(&totals[a])
                .unwrap_or(core::cmp::Ordering::Equal)
        });

        let mut importance = ImportanceMap::new();
        for &idx in ranked.iter().take(self.setup.report_limit()) {
            importance.insert(params[idx].name(), totals[idx]);
        }
        self.num_single = importance.len();

        let pair_candidates: Vec<String> = importance
            .keys()
            .take(self.n_pairs)
            .map(ToString::to_string)
            .collect();
        trace_info!(
            candidates = pair_candidates.len(),
            "computing most important pairwise marginals"
        );
        let pairs = self
            .engine
            .get_most_important_pairwise_marginals(&pair_candidates)?;
        for ((a, b), value) in pairs {
            importance.insert(pair_key(&a, &b), value);
        }

        self.importance = importance.clone();
        Ok(EvaluationResult::from_map(importance))
    }

    /// Persists the engine's (X, y, space) triple for postmortem
    /// inspection of a degenerate decomposition.
    fn dump_crash_data(&self) -> Result<()> {
        let file = File::create(CRASH_DUMP_FILE).map_err(|e| Error::Storage(e.to_string()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(
            writer,
            &CrashDump {
                x: &self.x,
                y: &self.y,
                space: &self.setup.space,
            },
        )
        .map_err(|e| Error::Storage(e.to_string()))
    }
}

impl Evaluator for FanovaEvaluator {
    fn name(&self) -> &'static str {
        "fANOVA"
    }

    fn run(&mut self) -> Result<EvaluationResult> {
        match self.run_inner() {
            Err(Error::DegenerateVariance) => {
                self.dump_crash_data()?;
                Err(Error::DegenerateVariance)
            }
            other => other,
        }
    }

    fn importance(&self) -> &ImportanceMap {
        &self.importance
    }

    fn num_singles(&self) -> usize {
        self.num_single
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::convert::InstanceFeatures;
    use crate::history::{RunHistory, RunStatus};
    use crate::rng_util;
    use crate::space::{ConfigSpace, Hyperparameter, ParamValue};
    use crate::surrogate::{RandomForestSurrogate, Surrogate};

    fn space() -> Arc<ConfigSpace> {
        Arc::new(
            ConfigSpace::new(vec![
                Hyperparameter::continuous("alpha", 0.0, 1.0),
                Hyperparameter::continuous("beta", 0.0, 1.0),
                Hyperparameter::continuous("gamma", 0.0, 1.0),
            ])
            .unwrap(),
        )
    }

    /// Synthetic setup where beta dominates, gamma is second, alpha last.
    fn setup(to_evaluate: Option<usize>) -> EvaluatorSetup {
        let space = space();
        let mut rng = fastrand::Rng::with_seed(17);
        let x: Vec<Vec<f64>> = (0..150)
            .map(|_| (0..3).map(|_| rng_util::f64_range(&mut rng, 0.0, 1.0)).collect())
            .collect();
        let y: Vec<f64> = x
            .iter()
            .map(|r| 0.5 * r[0] + 6.0 * r[1] + 3.0 * r[2])
            .collect();

        let mut model = RandomForestSurrogate::standard(3, Vec::new(), 23);
        model.train(&x, &y).unwrap();

        EvaluatorSetup {
            space,
            model: Arc::new(model),
            x: Arc::new(x),
            y: Arc::new(y),
            history: Arc::new(RunHistory::new()),
            to_evaluate,
            incumbent: None,
            margin: None,
            seed: 42,
        }
    }

    #[test]
    fn ranks_by_descending_importance() {
        let mut evaluator = FanovaEvaluator::new(setup(None)).unwrap();
        let result = evaluator.run().unwrap();
        let singles: Vec<_> = result.order.iter().take(3).collect();
        assert_eq!(singles, vec!["beta", "gamma", "alpha"]);
    }

    #[test]
    fn truncates_to_requested_count() {
        let mut evaluator = FanovaEvaluator::new(setup(Some(2))).unwrap();
        let result = evaluator.run().unwrap();
        assert_eq!(evaluator.num_singles(), 2);
        assert_eq!(&result.order[..2], &["beta", "gamma"]);
        // Pairs only among the reported singles.
        for key in &result.order[2..] {
            assert!(!key.contains("alpha"), "unexpected pair {key}");
        }
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut evaluator = FanovaEvaluator::new(setup(None)).unwrap();
        let first = evaluator.run().unwrap();
        let second = evaluator.run().unwrap();
        assert_eq!(first.order, second.order);
        assert_eq!(first.importance, second.importance);
    }

    #[test]
    fn degenerate_variance_dumps_and_fails() {
        let space = space();
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i) / 40.0, 0.0, 0.0])
            .collect();
        let y = vec![2.0; 40];
        let mut model = RandomForestSurrogate::standard(3, Vec::new(), 1);
        model.train(&x, &y).unwrap();

        let setup = EvaluatorSetup {
            space,
            model: Arc::new(model),
            x: Arc::new(x),
            y: Arc::new(y),
            history: Arc::new(RunHistory::new()),
            to_evaluate: None,
            incumbent: None,
            margin: None,
            seed: 3,
        };
        let mut evaluator = FanovaEvaluator::new(setup).unwrap();
        let err = evaluator.run().unwrap_err();
        assert!(matches!(err, Error::DegenerateVariance));
        assert!(std::path::Path::new(CRASH_DUMP_FILE).exists());
        std::fs::remove_file(CRASH_DUMP_FILE).ok();
    }

    #[test]
    fn preprocesses_instance_features() {
        // Two instances with different offsets; the evaluator must build
        // its engine on configuration rows only.
        let space = Arc::new(
            ConfigSpace::new(vec![
                Hyperparameter::continuous("alpha", 0.0, 1.0),
                Hyperparameter::continuous("beta", 0.0, 1.0),
            ])
            .unwrap(),
        );
        let features = InstanceFeatures::new(HashMap::from([
            ("i1".to_string(), vec![0.0]),
            ("i2".to_string(), vec![1.0]),
        ]));

        let mut rng = fastrand::Rng::with_seed(29);
        let mut history = RunHistory::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for _ in 0..60 {
            let a = rng_util::f64_range(&mut rng, 0.0, 1.0);
            let b = rng_util::f64_range(&mut rng, 0.0, 1.0);
            let config = space
                .configuration(&[("alpha", ParamValue::Float(a)), ("beta", ParamValue::Float(b))])
                .unwrap();
            for (inst, offset) in [("i1", 0.0), ("i2", 1.0)] {
                let cost = 5.0 * a + offset;
                history.add(config.clone(), Some(inst.to_string()), cost, RunStatus::Success);
                x.push(vec![a, b, offset]);
                y.push(cost);
            }
        }

        let mut model = RandomForestSurrogate::standard(2, features.rows(), 31);
        model.train(&x, &y).unwrap();

        let setup = EvaluatorSetup {
            space,
            model: Arc::new(model),
            x: Arc::new(x),
            y: Arc::new(y),
            history: Arc::new(history),
            to_evaluate: None,
            incumbent: None,
            margin: None,
            seed: 5,
        };
        let mut evaluator = FanovaEvaluator::new(setup).unwrap();
        let result = evaluator.run().unwrap();
        assert_eq!(result.order[0], "alpha");
    }
}
