//! Conversion of a run history into surrogate training data.
//!
//! Produces the feature matrix `X` (encoded configurations, plus
//! instance-feature columns when the scenario has instances) and the
//! target vector `y`, applying the base-10 log transform and censored
//! imputation for runtime-like objectives, then selects and trains the
//! matching surrogate variant.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::{RunHistory, RunStatus};
use crate::space::ConfigSpace;
use crate::surrogate::{RandomForestSurrogate, Surrogate};

/// Convergence threshold for the iterative censored-imputation loop.
const IMPUTE_CHANGE_THRESHOLD: f64 = 0.01;
/// Iteration cap for the censored-imputation loop.
const IMPUTE_MAX_ITER: usize = 10;
/// Floor applied to observed costs before taking logs.
const MIN_COST: f64 = 1e-10;

/// The tuning objective the history was collected under.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RunObjective {
    /// A plain scalar cost; used as observed.
    Quality,
    /// Runtime with a cutoff; costs are log-transformed and censored
    /// observations carry only a lower bound.
    Runtime {
        /// The per-run cutoff in seconds.
        cutoff: f64,
        /// Penalty multiplier: the imputation ceiling is `cutoff * par_factor`.
        par_factor: f64,
    },
}

/// Per-instance feature vectors, held in sorted name order.
#[derive(Clone, Debug, Default)]
pub struct InstanceFeatures {
    entries: Vec<(String, Vec<f64>)>,
}

impl InstanceFeatures {
    /// Builds the feature table from a name-to-vector map.
    #[must_use]
    pub fn new(features: HashMap<String, Vec<f64>>) -> Self {
        let mut entries: Vec<_> = features.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    /// Returns `true` if no instance features were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, name: &str) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// All feature rows in sorted instance-name order.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Conversion output: matched (X, y) and the trained surrogate.
pub(crate) struct ConvertedData {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub model: RandomForestSurrogate,
}

impl std::fmt::Debug for ConvertedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedData")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish_non_exhaustive()
    }
}

/// Converts the history into (X, y) and trains the objective-matched
/// surrogate variant on it.
pub(crate) fn convert_history(
    space: &ConfigSpace,
    history: &RunHistory,
    objective: RunObjective,
    features: &InstanceFeatures,
    impute_censored: bool,
    rng: &mut fastrand::Rng,
) -> Result<ConvertedData> {
    if history.is_empty() {
        return Err(Error::NoObservations);
    }

    // Encode one feature row per record: imputed configuration columns,
    // then the record's instance features when the scenario has them.
    let mut rows = Vec::with_capacity(history.len());
    for record in history.records() {
        let config = &history.configurations()[record.config_id];
        let mut row = space.impute_inactive_values(config).values().to_vec();
        if !features.is_empty() {
            let name = record
                .instance
                .as_deref()
                .ok_or_else(|| Error::UnknownInstance(String::from("<none>")))?;
            let feats = features
                .get(name)
                .ok_or_else(|| Error::UnknownInstance(name.to_string()))?;
            row.extend_from_slice(feats);
        }
        rows.push(row);
    }

    let seed = rng.u64(0..100_000);
    let (x, y, mut model) = match objective {
        RunObjective::Quality => {
            // Every record is retained as observed; imputation is skipped
            // regardless of the flag.
            let x = rows;
            let y: Vec<f64> = history.records().iter().map(|r| r.cost).collect();
            let model = RandomForestSurrogate::standard(space.len(), features.rows(), seed);
            (x, y, model)
        }
        RunObjective::Runtime { cutoff, par_factor } => {
            let log_threshold = (cutoff * par_factor).max(MIN_COST).log10();
            let mut x = Vec::new();
            let mut y = Vec::new();
            let mut censored_rows = Vec::new();
            let mut censored_bounds = Vec::new();

            for (record, row) in history.records().iter().zip(rows) {
                let log_cost = record.cost.max(MIN_COST).log10();
                match record.status {
                    RunStatus::Success => {
                        x.push(row);
                        y.push(log_cost);
                    }
                    RunStatus::Timeout | RunStatus::Capped => {
                        if impute_censored {
                            censored_rows.push(row);
                            censored_bounds.push(log_cost);
                        }
                    }
                    RunStatus::Crashed => {}
                }
            }

            if impute_censored && !censored_rows.is_empty() {
                let imputed = impute_censored_values(
                    space,
                    features,
                    &x,
                    &y,
                    &censored_rows,
                    &censored_bounds,
                    log_threshold,
                    rng,
                )?;
                x.extend(censored_rows);
                y.extend(imputed);
            }

            let model =
                RandomForestSurrogate::runtime(space.len(), features.rows(), seed, log_threshold);
            (x, y, model)
        }
    };

    if x.is_empty() {
        return Err(Error::NoObservations);
    }
    debug_assert_eq!(x.len(), y.len());
    trace_info!(rows = x.len(), "converted run history into training data");

    model.train(&x, &y)?;
    Ok(ConvertedData { x, y, model })
}

/// Iteratively imputes censored log-costs with an auxiliary runtime-variant
/// model, clamping into `[observed bound, log threshold]`, until the change
/// drops below the convergence threshold or the iteration cap is reached.
#[allow(clippy::too_many_arguments)]
fn impute_censored_values(
    space: &ConfigSpace,
    features: &InstanceFeatures,
    success_x: &[Vec<f64>],
    success_y: &[f64],
    censored_rows: &[Vec<f64>],
    censored_bounds: &[f64],
    log_threshold: f64,
    rng: &mut fastrand::Rng,
) -> Result<Vec<f64>> {
    if success_x.is_empty() {
        // Nothing to learn from; censored observations keep their bounds.
        return Ok(censored_bounds.to_vec());
    }

    let mut imputed = censored_bounds.to_vec();
    for _ in 0..IMPUTE_MAX_ITER {
        let mut train_x = success_x.to_vec();
        train_x.extend_from_slice(censored_rows);
        let mut train_y = success_y.to_vec();
        train_y.extend_from_slice(&imputed);

        let mut model = RandomForestSurrogate::runtime(
            space.len(),
            features.rows(),
            rng.u64(0..100_000),
            log_threshold,
        );
        model.train(&train_x, &train_y)?;

        // The auxiliary model predicts in the untransformed scale; the
        // imputation loop runs in log space.
        let config_cols: Vec<Vec<f64>> = censored_rows
            .iter()
            .map(|row| row[..space.len()].to_vec())
            .collect();
        let (means, _) = model.predict_marginalized_over_instances(&config_cols)?;

        let mut change = 0.0;
        for (idx, mean) in means.iter().enumerate() {
            let new = mean
                .max(MIN_COST)
                .log10()
                .clamp(censored_bounds[idx], log_threshold);
            change += (new - imputed[idx]).powi(2);
            imputed[idx] = new;
        }
        if change.sqrt() < IMPUTE_CHANGE_THRESHOLD {
            trace_debug!(change, "censored imputation converged");
            break;
        }
    }
    Ok(imputed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RunHistory;
    use crate::rng_util;
    use crate::space::{ConfigSpace, Hyperparameter, ParamValue};

    fn space() -> ConfigSpace {
        ConfigSpace::new(vec![
            Hyperparameter::categorical("a", &["red", "green"]),
            Hyperparameter::continuous("b", 0.0, 10.0),
            Hyperparameter::integer("c", 1, 100),
        ])
        .unwrap()
    }

    fn runtime_history(space: &ConfigSpace, n: usize, timeouts: usize) -> RunHistory {
        let mut rng = fastrand::Rng::with_seed(5);
        let mut history = RunHistory::new();
        for i in 0..n {
            let config = space
                .configuration(&[
                    ("a", ParamValue::Categorical(rng.usize(0..2))),
                    ("b", ParamValue::Float(rng_util::f64_range(&mut rng, 0.0, 10.0))),
                    ("c", ParamValue::Int(rng.i64(1..=100))),
                ])
                .unwrap();
            let (cost, status) = if i < timeouts {
                (10.0, RunStatus::Timeout)
            } else {
                (rng_util::f64_range(&mut rng, 0.1, 5.0), RunStatus::Success)
            };
            history.add(config, None, cost, status);
        }
        history
    }

    #[test]
    fn runtime_without_impute_drops_censored() {
        let space = space();
        let history = runtime_history(&space, 50, 2);
        let mut rng = fastrand::Rng::with_seed(1);
        let converted = convert_history(
            &space,
            &history,
            RunObjective::Runtime {
                cutoff: 10.0,
                par_factor: 10.0,
            },
            &InstanceFeatures::default(),
            false,
            &mut rng,
        )
        .unwrap();
        assert_eq!(converted.x.len(), 48);
        assert_eq!(converted.y.len(), 48);
    }

    #[test]
    fn runtime_with_impute_keeps_censored() {
        let space = space();
        let history = runtime_history(&space, 50, 2);
        let mut rng = fastrand::Rng::with_seed(1);
        let converted = convert_history(
            &space,
            &history,
            RunObjective::Runtime {
                cutoff: 10.0,
                par_factor: 10.0,
            },
            &InstanceFeatures::default(),
            true,
            &mut rng,
        )
        .unwrap();
        assert_eq!(converted.x.len(), 50);
        // Imputed values stay within [bound, log threshold].
        let log_threshold = 100.0f64.log10();
        for &value in &converted.y[48..] {
            assert!(value <= log_threshold + 1e-12);
        }
    }

    #[test]
    fn runtime_targets_are_log_transformed() {
        let space = space();
        let mut history = RunHistory::new();
        let config = space
            .configuration(&[
                ("a", ParamValue::Categorical(0)),
                ("b", ParamValue::Float(1.0)),
                ("c", ParamValue::Int(10)),
            ])
            .unwrap();
        history.add(config.clone(), None, 100.0, RunStatus::Success);
        history.add(config, None, 1.0, RunStatus::Success);

        let mut rng = fastrand::Rng::with_seed(2);
        let converted = convert_history(
            &space,
            &history,
            RunObjective::Runtime {
                cutoff: 300.0,
                par_factor: 10.0,
            },
            &InstanceFeatures::default(),
            false,
            &mut rng,
        )
        .unwrap();
        assert!((converted.y[0] - 2.0).abs() < 1e-12);
        assert!(converted.y[1].abs() < 1e-12);
    }

    #[test]
    fn quality_keeps_every_record_unimputed() {
        let space = space();
        let history = runtime_history(&space, 20, 3);
        let mut rng = fastrand::Rng::with_seed(3);
        let converted = convert_history(
            &space,
            &history,
            RunObjective::Quality,
            &InstanceFeatures::default(),
            true,
            &mut rng,
        )
        .unwrap();
        assert_eq!(converted.x.len(), 20);
        // Costs pass through untransformed.
        assert!((converted.y[0] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn instance_features_extend_rows() {
        let space = space();
        let mut history = RunHistory::new();
        let config = space
            .configuration(&[
                ("a", ParamValue::Categorical(0)),
                ("b", ParamValue::Float(1.0)),
                ("c", ParamValue::Int(10)),
            ])
            .unwrap();
        history.add(config, Some("i1".into()), 2.0, RunStatus::Success);

        let features = InstanceFeatures::new(HashMap::from([
            ("i1".to_string(), vec![0.5, 1.5]),
            ("i2".to_string(), vec![1.0, 2.0]),
        ]));
        let mut rng = fastrand::Rng::with_seed(4);
        let converted = convert_history(
            &space,
            &history,
            RunObjective::Quality,
            &features,
            false,
            &mut rng,
        )
        .unwrap();
        assert_eq!(converted.x[0].len(), space.len() + 2);
    }

    #[test]
    fn unknown_instance_is_rejected() {
        let space = space();
        let mut history = RunHistory::new();
        let config = space.default_configuration();
        history.add(config, Some("mystery".into()), 2.0, RunStatus::Success);

        let features = InstanceFeatures::new(HashMap::from([("i1".to_string(), vec![0.5])]));
        let mut rng = fastrand::Rng::with_seed(4);
        let err = convert_history(
            &space,
            &history,
            RunObjective::Quality,
            &features,
            false,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownInstance(_)));
    }
}
