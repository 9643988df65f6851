//! The importance orchestrator: owns the observation history, the trained
//! surrogate, and the active evaluator.
//!
//! Built through [`Importance::builder()`]. Construction loads the
//! history, converts it into training data (training the surrogate as a
//! side effect), resolves the incumbent, and optionally downsamples and
//! retrains. Evaluators are then constructed, run, and replaced through
//! [`Importance::set_evaluator`] / [`Importance::evaluate`] /
//! [`Importance::evaluate_scenario`].
//!
//! All state mutation happens on this one instance, synchronously; the
//! active evaluator is replaced, never mutated in place, so previously
//! returned instances stay valid for read-only use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::convert::{ConvertedData, InstanceFeatures, RunObjective, convert_history};
use crate::error::{Error, Result};
use crate::evaluator::{
    EvaluationResult, Evaluator, EvaluatorKind, EvaluatorSetup,
};
use crate::history::RunHistory;
use crate::rng_util::partial_shuffle;
use crate::space::{ConfigSpace, Configuration};
use crate::surrogate::{RandomForestSurrogate, Surrogate};
use crate::trajectory::read_trajectory;

/// Results of one [`Importance::evaluate_scenario`] call: per-method
/// outcomes plus the evaluator instances in execution order, retained
/// for later comparison and plotting.
pub struct ScenarioResults {
    /// `(method, result)` pairs in execution order.
    pub results: Vec<(EvaluatorKind, EvaluationResult)>,
    /// The evaluator instances, matching `results` positionally.
    pub evaluators: Vec<Box<dyn Evaluator>>,
}

impl std::fmt::Debug for ScenarioResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioResults")
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

/// The importance-evaluation orchestrator.
pub struct Importance {
    space: Arc<ConfigSpace>,
    history: Arc<RunHistory>,
    x: Arc<Vec<Vec<f64>>>,
    y: Arc<Vec<f64>>,
    model: Arc<dyn Surrogate>,
    incumbent: Configuration,
    evaluator: Option<Box<dyn Evaluator>>,
    rng: fastrand::Rng,
    to_evaluate: Option<usize>,
    margin: Option<f64>,
}

impl std::fmt::Debug for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importance")
            .field("incumbent", &self.incumbent)
            .field("to_evaluate", &self.to_evaluate)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl Importance {
    /// Returns a builder for constructing an orchestrator.
    #[must_use]
    pub fn builder() -> ImportanceBuilder {
        ImportanceBuilder::new()
    }

    /// The configuration space.
    #[must_use]
    pub fn space(&self) -> &ConfigSpace {
        &self.space
    }

    /// The feature matrix the surrogate was trained on.
    #[must_use]
    pub fn x(&self) -> &[Vec<f64>] {
        &self.x
    }

    /// The target vector the surrogate was trained on.
    #[must_use]
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// The trained surrogate model.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn Surrogate> {
        &self.model
    }

    /// The resolved incumbent configuration.
    #[must_use]
    pub fn incumbent(&self) -> &Configuration {
        &self.incumbent
    }

    /// The currently active evaluator, if one was set.
    #[must_use]
    pub fn evaluator(&self) -> Option<&dyn Evaluator> {
        self.evaluator.as_deref()
    }

    /// Constructs the evaluator for `kind`, replacing the active one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIncumbent`] for kinds that require an
    /// incumbent and any kind-specific construction error.
    pub fn set_evaluator(&mut self, kind: EvaluatorKind) -> Result<()> {
        trace_info!(method = kind.as_str(), "setting up evaluation method");
        let setup = EvaluatorSetup {
            space: Arc::clone(&self.space),
            model: Arc::clone(&self.model),
            x: Arc::clone(&self.x),
            y: Arc::clone(&self.y),
            history: Arc::clone(&self.history),
            to_evaluate: self.to_evaluate,
            incumbent: Some(self.incumbent.clone()),
            margin: self.margin,
            seed: self.rng.u64(0..100_000),
        };
        self.evaluator = Some(kind.build(setup)?);
        Ok(())
    }

    /// Sets and runs a single evaluation method.
    ///
    /// # Errors
    ///
    /// Propagates construction and run errors of the evaluator.
    pub fn evaluate(&mut self, kind: EvaluatorKind) -> Result<EvaluationResult> {
        self.set_evaluator(kind)?;
        let evaluator = self
            .evaluator
            .as_mut()
            .ok_or(Error::Internal("no active evaluator"))?;
        trace_info!(method = evaluator.name(), "running evaluation method");
        evaluator.run()
    }

    /// Evaluates a single method by name, or the full method set.
    ///
    /// With `mode == "all"`, runs {ablation, fanova, forward-selection,
    /// incneighbor} in one of six fixed orders selected by `order_hint`
    /// (`0..=5`; out-of-range hints fall back to order 0). The evaluator
    /// instances are handed to the caller in execution order, emptying
    /// the active-evaluator slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMethod`] for unknown method names and
    /// propagates the first evaluator failure.
    pub fn evaluate_scenario(&mut self, mode: &str, order_hint: usize) -> Result<ScenarioResults> {
        let methods: Vec<EvaluatorKind> = if mode == "all" {
            method_order(order_hint).to_vec()
        } else {
            vec![mode.parse()?]
        };

        let mut results = Vec::with_capacity(methods.len());
        let mut evaluators = Vec::with_capacity(methods.len());
        for kind in methods {
            let result = self.evaluate(kind)?;
            results.push((kind, result));
            if let Some(evaluator) = self.evaluator.take() {
                evaluators.push(evaluator);
            }
        }
        Ok(ScenarioResults {
            results,
            evaluators,
        })
    }

    /// Writes one HTML report per evaluator into `dir`, named after the
    /// evaluation method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when a report cannot be written.
    pub fn plot_results(&self, dir: &Path, scenario: &ScenarioResults) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::Storage(e.to_string()))?;
        for ((kind, _), evaluator) in scenario.results.iter().zip(&scenario.evaluators) {
            let path = dir.join(format!("{}.html", kind.as_str()));
            evaluator.plot_result(&path)?;
        }
        Ok(())
    }
}

/// The fixed method multiset and its six execution orders.
fn method_order(hint: usize) -> [EvaluatorKind; 4] {
    use EvaluatorKind::{Ablation, Fanova, ForwardSelection, IncNeighbor};
    match hint {
        1 => [Ablation, ForwardSelection, Fanova, IncNeighbor],
        2 => [Fanova, ForwardSelection, Ablation, IncNeighbor],
        3 => [Fanova, Ablation, ForwardSelection, IncNeighbor],
        4 => [ForwardSelection, Ablation, Fanova, IncNeighbor],
        5 => [ForwardSelection, Fanova, Ablation, IncNeighbor],
        _ => [Ablation, Fanova, ForwardSelection, IncNeighbor],
    }
}

/// Fluent builder for [`Importance`].
///
/// # Defaults
///
/// - Objective: [`RunObjective::Quality`]
/// - Seed: `12345`
/// - Parameters to evaluate: all (`-1`)
/// - Censored imputation: off
/// - Downsampling: off
pub struct ImportanceBuilder {
    space: Option<ConfigSpace>,
    history: Option<RunHistory>,
    history_pattern: Option<String>,
    objective: RunObjective,
    features: InstanceFeatures,
    trajectory_file: Option<PathBuf>,
    incumbent: Option<Configuration>,
    seed: u64,
    to_evaluate: i64,
    margin: Option<f64>,
    impute_censored: bool,
    max_sample_size: Option<usize>,
}

impl ImportanceBuilder {
    fn new() -> Self {
        Self {
            space: None,
            history: None,
            history_pattern: None,
            objective: RunObjective::Quality,
            features: InstanceFeatures::default(),
            trajectory_file: None,
            incumbent: None,
            seed: 12345,
            to_evaluate: -1,
            margin: None,
            impute_censored: false,
            max_sample_size: None,
        }
    }

    /// Sets the configuration space (required).
    #[must_use]
    pub fn space(mut self, space: ConfigSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Uses an in-memory run history.
    #[must_use]
    pub fn history(mut self, history: RunHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Loads the run history from a path or single-`*` filename pattern.
    /// Trajectory files colocated with the matches become incumbent
    /// candidates when no trajectory file is given explicitly.
    #[must_use]
    pub fn history_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.history_pattern = Some(pattern.into());
        self
    }

    /// Sets the tuning objective (default: quality).
    #[must_use]
    pub fn objective(mut self, objective: RunObjective) -> Self {
        self.objective = objective;
        self
    }

    /// Supplies per-instance feature vectors.
    #[must_use]
    pub fn instance_features(mut self, features: InstanceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Reads the incumbent from this trajectory file (highest priority).
    #[must_use]
    pub fn trajectory_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trajectory_file = Some(path.into());
        self
    }

    /// Supplies the incumbent directly (lowest priority).
    #[must_use]
    pub fn incumbent(mut self, incumbent: Configuration) -> Self {
        self.incumbent = Some(incumbent);
        self
    }

    /// Seeds the orchestrator's random generator (default: 12345).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of hyperparameters each evaluator reports; negative values
    /// mean all (the default).
    #[must_use]
    pub fn parameters_to_evaluate(mut self, count: i64) -> Self {
        self.to_evaluate = count;
        self
    }

    /// Minimal improvement for the influence model to accept a parameter.
    #[must_use]
    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = Some(margin);
        self
    }

    /// Imputes censored observations instead of discarding them
    /// (runtime objectives only).
    #[must_use]
    pub fn impute_censored(mut self, impute: bool) -> Self {
        self.impute_censored = impute;
        self
    }

    /// Caps the training set: larger matrices are downsampled uniformly
    /// without replacement and the surrogate retrained.
    #[must_use]
    pub fn max_sample_size(mut self, size: usize) -> Self {
        self.max_sample_size = Some(size);
        self
    }

    /// Builds the orchestrator: loads the history, converts and trains,
    /// resolves the incumbent, and applies downsampling.
    ///
    /// # Errors
    ///
    /// Propagates history loading, conversion, training, and incumbent
    /// resolution failures; [`Error::NoIncumbentSource`] when no
    /// trajectory or configuration is available.
    pub fn build(self) -> Result<Importance> {
        let space = self
            .space
            .ok_or(Error::Internal("configuration space is required"))?;

        let (history, matched_files) = match (self.history, &self.history_pattern) {
            (Some(history), _) => (history, Vec::new()),
            (None, Some(pattern)) => RunHistory::load_pattern(&space, pattern)?,
            (None, None) => return Err(Error::Internal("run history is required")),
        };
        trace_info!(
            records = history.len(),
            configs = history.configurations().len(),
            "loaded run history"
        );

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let ConvertedData { mut x, mut y, mut model } = convert_history(
            &space,
            &history,
            self.objective,
            &self.features,
            self.impute_censored,
            &mut rng,
        )?;

        let incumbent = resolve_incumbent(
            &space,
            &model,
            self.trajectory_file.as_deref(),
            &matched_files,
            self.incumbent,
        )?;

        if let Some(max) = self.max_sample_size
            && x.len() > max
        {
            let keep = partial_shuffle(x.len(), max, &mut rng);
            x = keep.iter().map(|&i| x[i].clone()).collect();
            y = keep.iter().map(|&i| y[i]).collect();
            trace_info!(remaining = x.len(), "downsampled training data");
            model.train(&x, &y)?;
        }

        Ok(Importance {
            space: Arc::new(space),
            history: Arc::new(history),
            x: Arc::new(x),
            y: Arc::new(y),
            model: Arc::new(model),
            incumbent,
            evaluator: None,
            rng,
            to_evaluate: usize::try_from(self.to_evaluate).ok(),
            margin: self.margin,
        })
    }
}

impl Default for ImportanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the incumbent from, in priority order: the explicit
/// trajectory file, trajectories colocated with the matched history
/// files (scored by predicted marginal performance, best wins), or the
/// directly supplied configuration.
fn resolve_incumbent(
    space: &ConfigSpace,
    model: &RandomForestSurrogate,
    trajectory_file: Option<&Path>,
    matched_files: &[PathBuf],
    direct: Option<Configuration>,
) -> Result<Configuration> {
    if let Some(path) = trajectory_file {
        let (incumbent, _cost) = read_trajectory(space, path)?;
        trace_debug!(cost = _cost, "incumbent read from trajectory file");
        return Ok(incumbent);
    }

    let candidates = colocated_trajectories(matched_files)?;
    if !candidates.is_empty() {
        let mut best: Option<(Configuration, f64)> = None;
        for path in candidates {
            trace_info!(file = %path.display(), "reading trajectory");
            let (incumbent, _) = read_trajectory(space, &path)?;
            let row = space.impute_inactive_values(&incumbent).values().to_vec();
            let (means, _) = model.predict_marginalized_over_instances(&[row])?;
            let predicted = means[0];
            if best.as_ref().is_none_or(|(_, p)| predicted < *p) {
                best = Some((incumbent, predicted));
            }
        }
        if let Some((incumbent, _predicted)) = best {
            trace_info!(predicted = _predicted, "incumbent selected by predicted performance");
            return Ok(incumbent);
        }
    }

    direct.ok_or(Error::NoIncumbentSource)
}

/// Trajectory files (`traj*` names) next to the matched history files.
fn colocated_trajectories(matched_files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<&Path> = matched_files
        .iter()
        .filter_map(|f| f.parent())
        .collect();
    dirs.sort();
    dirs.dedup();

    let mut found = Vec::new();
    for dir in dirs {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::Storage(e.to_string()))?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("traj"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluatorKind;

    #[test]
    fn method_orders_are_fixed_permutations() {
        use EvaluatorKind::{Ablation, Fanova, ForwardSelection, IncNeighbor};
        assert_eq!(
            method_order(2),
            [Fanova, ForwardSelection, Ablation, IncNeighbor]
        );
        assert_eq!(
            method_order(0),
            [Ablation, Fanova, ForwardSelection, IncNeighbor]
        );
        // Out-of-range hints fall back to the default order.
        assert_eq!(method_order(17), method_order(0));
        for hint in 0..6 {
            let mut methods = method_order(hint).to_vec();
            methods.sort_by_key(|k| k.as_str());
            assert_eq!(
                methods,
                vec![Ablation, Fanova, ForwardSelection, IncNeighbor]
            );
        }
    }
}
