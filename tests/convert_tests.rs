//! Integration tests for history-to-matrix conversion through the
//! orchestrator: censoring, imputation, and objective handling.

use importance::prelude::*;

fn space() -> ConfigSpace {
    ConfigSpace::new(vec![
        Hyperparameter::categorical("a", &["red", "green"]),
        Hyperparameter::continuous("b", 0.0, 1.0),
        Hyperparameter::integer("c", 0, 10),
    ])
    .unwrap()
}

/// 50 runtime observations, the first `timeouts` censored at the cutoff.
fn runtime_history(space: &ConfigSpace, timeouts: usize) -> RunHistory {
    let mut rng = fastrand::Rng::with_seed(2024);
    let mut history = RunHistory::new();
    for i in 0..50 {
        let b = rng.f64();
        let config = space
            .configuration(&[
                ("a", ParamValue::Categorical(rng.usize(0..2))),
                ("b", ParamValue::Float(b)),
                ("c", ParamValue::Int(rng.i64(0..=10))),
            ])
            .unwrap();
        let (cost, status) = if i < timeouts {
            (10.0, RunStatus::Timeout)
        } else {
            (0.2 + 4.0 * b, RunStatus::Success)
        };
        history.add(config, None, cost, status);
    }
    history
}

fn incumbent(space: &ConfigSpace) -> Configuration {
    space
        .configuration(&[
            ("a", ParamValue::Categorical(0)),
            ("b", ParamValue::Float(0.1)),
            ("c", ParamValue::Int(1)),
        ])
        .unwrap()
}

#[test]
fn censored_records_are_dropped_without_imputation() {
    let space = space();
    let history = runtime_history(&space, 2);
    let inc = incumbent(&space);
    let importance = Importance::builder()
        .space(space)
        .history(history)
        .incumbent(inc)
        .objective(RunObjective::Runtime {
            cutoff: 10.0,
            par_factor: 10.0,
        })
        .impute_censored(false)
        .seed(3)
        .build()
        .unwrap();
    assert_eq!(importance.x().len(), 48);
    assert_eq!(importance.y().len(), 48);
}

#[test]
fn censored_records_are_imputed_when_enabled() {
    let space = space();
    let history = runtime_history(&space, 2);
    let inc = incumbent(&space);
    let importance = Importance::builder()
        .space(space)
        .history(history)
        .incumbent(inc)
        .objective(RunObjective::Runtime {
            cutoff: 10.0,
            par_factor: 10.0,
        })
        .impute_censored(true)
        .seed(3)
        .build()
        .unwrap();
    assert_eq!(importance.x().len(), 50);

    // Imputed log-costs stay within [observed bound, log threshold].
    let log_bound = 10.0f64.log10();
    let log_threshold = 100.0f64.log10();
    for &value in &importance.y()[48..] {
        assert!(value >= log_bound - 1e-12, "imputed {value} below bound");
        assert!(value <= log_threshold + 1e-12, "imputed {value} above cap");
    }
}

#[test]
fn quality_objective_ignores_the_impute_flag() {
    let space = space();
    let history = runtime_history(&space, 2);
    let inc = incumbent(&space);
    let importance = Importance::builder()
        .space(space)
        .history(history)
        .incumbent(inc)
        .objective(RunObjective::Quality)
        .impute_censored(true)
        .seed(3)
        .build()
        .unwrap();
    // Every record retained, costs untransformed.
    assert_eq!(importance.x().len(), 50);
    assert!(importance.y().iter().any(|&v| (v - 10.0).abs() < 1e-12));
}

#[test]
fn runtime_evaluation_runs_end_to_end() {
    let space = space();
    let history = runtime_history(&space, 2);
    let inc = incumbent(&space);
    let mut importance = Importance::builder()
        .space(space)
        .history(history)
        .incumbent(inc)
        .objective(RunObjective::Runtime {
            cutoff: 10.0,
            par_factor: 10.0,
        })
        .seed(7)
        .build()
        .unwrap();
    let result = importance.evaluate(EvaluatorKind::Fanova).unwrap();
    assert_eq!(result.order[0], "b");
}

#[test]
fn empty_history_is_rejected() {
    let space = space();
    let inc = incumbent(&space);
    let err = Importance::builder()
        .space(space)
        .history(RunHistory::new())
        .incumbent(inc)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::NoObservations));
}
