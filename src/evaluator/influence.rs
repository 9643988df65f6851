//! Influence-model importance: greedy forward selection over a linear
//! model, accepting a parameter only while the fit improves by more than
//! the configured margin.

use crate::error::{Error, Result};
use crate::evaluator::{EvaluationResult, Evaluator, EvaluatorSetup, ImportanceMap};

/// Ridge term keeping the normal equations solvable.
const RIDGE: f64 = 1e-8;

/// Linear influence model with an improvement margin.
pub struct InfluenceModel {
    setup: EvaluatorSetup,
    margin: f64,
    importance: ImportanceMap,
}

impl InfluenceModel {
    /// Builds the evaluator. The margin defaults to zero: parameters are
    /// accepted while they improve the fit at all.
    ///
    /// # Errors
    ///
    /// Construction itself cannot fail; the signature matches the shared
    /// evaluator contract.
    pub fn new(setup: EvaluatorSetup) -> Result<Self> {
        let margin = setup.margin.unwrap_or(0.0);
        Ok(Self {
            setup,
            margin,
            importance: ImportanceMap::new(),
        })
    }
}

impl Evaluator for InfluenceModel {
    fn name(&self) -> &'static str {
        "Influence Model"
    }

    #[allow(clippy::cast_precision_loss)]
    fn run(&mut self) -> Result<EvaluationResult> {
        let space = &self.setup.space;
        let rows = &*self.setup.x;
        let targets = &*self.setup.y;
        let n = rows.len() as f64;

        // Standardize parameter columns so coefficients are comparable.
        let columns: Vec<Vec<f64>> = (0..space.len())
            .map(|c| {
                let raw: Vec<f64> = rows.iter().map(|r| r[c]).collect();
                let mean = raw.iter().sum::<f64>() / n;
                let std = (raw.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                if std > 0.0 {
                    raw.iter().map(|v| (v - mean) / std).collect()
                } else {
                    vec![0.0; raw.len()]
                }
            })
            .collect();

        let mean_y = targets.iter().sum::<f64>() / n;
        let mut current_rmse =
            (targets.iter().map(|v| (v - mean_y).powi(2)).sum::<f64>() / n).sqrt();

        let mut selected: Vec<usize> = Vec::new();
        let mut remaining: Vec<usize> = (0..space.len()).collect();
        let mut importance = ImportanceMap::new();

        while !remaining.is_empty() && selected.len() < self.setup.report_limit() {
            let mut best: Option<(usize, f64)> = None;
            for (pos, &candidate) in remaining.iter().enumerate() {
                let mut subset = selected.clone();
                subset.push(candidate);
                let rmse = fit_rmse(&columns, targets, &subset)?;
                if best.is_none_or(|(_, r)| rmse < r) {
                    best = Some((pos, rmse));
                }
            }

            let Some((pos, rmse)) = best else { break };
            if current_rmse - rmse <= self.margin {
                trace_debug!(rmse, margin = self.margin, "improvement below margin");
                break;
            }
            let idx = remaining.remove(pos);
            importance.insert(space.hyperparameters()[idx].name(), rmse);
            selected.push(idx);
            current_rmse = rmse;
        }

        self.importance = importance.clone();
        Ok(EvaluationResult::from_map(importance))
    }

    fn importance(&self) -> &ImportanceMap {
        &self.importance
    }
}

/// RMSE of the least-squares fit on the selected (standardized) columns
/// plus an intercept.
#[allow(clippy::cast_precision_loss)]
fn fit_rmse(columns: &[Vec<f64>], targets: &[f64], subset: &[usize]) -> Result<f64> {
    let n_rows = targets.len();
    let dim = subset.len() + 1; // intercept last

    // Normal equations: (A^T A + ridge) w = A^T y.
    let mut ata = vec![vec![0.0; dim]; dim];
    let mut aty = vec![0.0; dim];
    for row in 0..n_rows {
        let mut features = Vec::with_capacity(dim);
        for &c in subset {
            features.push(columns[c][row]);
        }
        features.push(1.0);
        for i in 0..dim {
            aty[i] += features[i] * targets[row];
            for j in 0..dim {
                ata[i][j] += features[i] * features[j];
            }
        }
    }
    for (i, row) in ata.iter_mut().enumerate() {
        row[i] += RIDGE;
    }

    let weights = solve(ata, aty)?;

    let sq_err: f64 = (0..n_rows)
        .map(|row| {
            let mut pred = weights[subset.len()];
            for (w_idx, &c) in subset.iter().enumerate() {
                pred += weights[w_idx] * columns[c][row];
            }
            (pred - targets[row]).powi(2)
        })
        .sum();
    Ok((sq_err / n_rows as f64).sqrt())
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(core::cmp::Ordering::Equal)
            })
            .ok_or(Error::Internal("empty linear system"))?;
        if a[pivot][col].abs() < 1e-300 {
            return Err(Error::Internal("singular linear system"));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::history::RunHistory;
    use crate::rng_util;
    use crate::space::{ConfigSpace, Hyperparameter};
    use crate::surrogate::{RandomForestSurrogate, Surrogate};

    fn setup(margin: Option<f64>) -> EvaluatorSetup {
        let space = Arc::new(
            ConfigSpace::new(vec![
                Hyperparameter::continuous("alpha", 0.0, 1.0),
                Hyperparameter::continuous("beta", 0.0, 1.0),
                Hyperparameter::continuous("noise", 0.0, 1.0),
            ])
            .unwrap(),
        );
        let mut rng = fastrand::Rng::with_seed(33);
        let x: Vec<Vec<f64>> = (0..200)
            .map(|_| (0..3).map(|_| rng_util::f64_range(&mut rng, 0.0, 1.0)).collect())
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 8.0 * r[0] + 2.0 * r[1]).collect();
        let mut model = RandomForestSurrogate::standard(3, Vec::new(), 4);
        model.train(&x, &y).unwrap();

        EvaluatorSetup {
            space,
            model: Arc::new(model),
            x: Arc::new(x),
            y: Arc::new(y),
            history: Arc::new(RunHistory::new()),
            to_evaluate: None,
            incumbent: None,
            margin,
            seed: 9,
        }
    }

    #[test]
    fn selects_influential_parameters_in_order() {
        let mut evaluator = InfluenceModel::new(setup(None)).unwrap();
        let result = evaluator.run().unwrap();
        assert_eq!(result.order[0], "alpha");
        assert_eq!(result.order.get(1).map(String::as_str), Some("beta"));
    }

    #[test]
    fn margin_cuts_off_weak_parameters() {
        // A margin larger than beta's contribution stops after alpha.
        let mut evaluator = InfluenceModel::new(setup(Some(1.0))).unwrap();
        let result = evaluator.run().unwrap();
        assert_eq!(result.order, vec!["alpha".to_string()]);
    }

    #[test]
    fn linear_solver_handles_identity() {
        let a = vec![vec![1.0, 0.0], vec![0.0, 2.0]];
        let x = solve(a, vec![3.0, 4.0]).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }
}
