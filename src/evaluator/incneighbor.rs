//! Incumbent-neighborhood importance: local sensitivity of the predicted
//! performance around the incumbent.
//!
//! Each parameter is varied on its own while the rest of the incumbent
//! stays fixed; a parameter's importance is the normalized variance of
//! the predictions along its axis.

use crate::error::Result;
use crate::evaluator::{EvaluationResult, Evaluator, EvaluatorSetup, ImportanceMap};
use crate::forest::variance;
use crate::space::{Configuration, ParamKind};

/// Grid resolution along numeric axes.
const NEIGHBORHOOD_STEPS: usize = 21;

/// Local neighborhood evaluator around the incumbent.
pub struct IncNeighborEvaluator {
    setup: EvaluatorSetup,
    incumbent: Configuration,
    importance: ImportanceMap,
}

impl std::fmt::Debug for IncNeighborEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncNeighborEvaluator")
            .field("incumbent", &self.incumbent)
            .field("importance", &self.importance)
            .finish_non_exhaustive()
    }
}

impl IncNeighborEvaluator {
    /// Builds the evaluator; fails without a resolved incumbent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingIncumbent`] when the setup carries
    /// no incumbent.
    pub fn new(setup: EvaluatorSetup) -> Result<Self> {
        let incumbent = setup.require_incumbent("incneighbor")?;
        Ok(Self {
            setup,
            incumbent,
            importance: ImportanceMap::new(),
        })
    }
}

impl Evaluator for IncNeighborEvaluator {
    fn name(&self) -> &'static str {
        "Incumbent Neighborhood"
    }

    #[allow(clippy::cast_precision_loss)]
    fn run(&mut self) -> Result<EvaluationResult> {
        let space = &self.setup.space;
        let base = space
            .impute_inactive_values(&self.incumbent)
            .values()
            .to_vec();

        let mut sensitivities = Vec::with_capacity(space.len());
        for (idx, param) in space.hyperparameters().iter().enumerate() {
            let axis: Vec<f64> = match param.kind() {
                ParamKind::Categorical { choices } => {
                    (0..choices.len()).map(|c| c as f64).collect()
                }
                ParamKind::Integer { .. } | ParamKind::Continuous { .. } => (0..NEIGHBORHOOD_STEPS)
                    .map(|s| s as f64 / (NEIGHBORHOOD_STEPS - 1) as f64)
                    .collect(),
            };

            let rows: Vec<Vec<f64>> = axis
                .iter()
                .map(|&value| {
                    let mut row = base.clone();
                    row[idx] = value;
                    row
                })
                .collect();
            let (means, _) = self.setup.model.predict_marginalized_over_instances(&rows)?;
            let sensitivity = variance(&means);
            trace_debug!(param = param.name(), sensitivity, "neighborhood variance");
            sensitivities.push(sensitivity);
        }

        let total: f64 = sensitivities.iter().sum();
        if total > 0.0 {
            for s in &mut sensitivities {
                *s /= total;
            }
        }

        let mut ranked: Vec<usize> = (0..sensitivities.len()).collect();
        ranked.sort_by(|&a, &b| {
            sensitivities[b]
                .partial_cmp(&sensitivities[a])
                .unwrap_or(core::cmp::Ordering::Equal)
        });

        let mut importance = ImportanceMap::new();
        for &idx in ranked.iter().take(self.setup.report_limit()) {
            importance.insert(space.hyperparameters()[idx].name(), sensitivities[idx]);
        }

        self.importance = importance.clone();
        Ok(EvaluationResult::from_map(importance))
    }

    fn importance(&self) -> &ImportanceMap {
        &self.importance
    }
}
