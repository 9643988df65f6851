#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Hyperparameter importance analysis for algorithm-configuration run
//! histories. Given the observations collected during a tuning run, the
//! crate trains a random-forest surrogate of the performance landscape
//! and ranks hyperparameters (and hyperparameter pairs) by how strongly
//! they influence predicted performance.
//!
//! # Getting Started
//!
//! ```
//! use importance::prelude::*;
//! use importance::space::{ConfigSpace, Hyperparameter, ParamValue};
//!
//! let space = ConfigSpace::new(vec![
//!     Hyperparameter::continuous("alpha", 0.0, 1.0),
//!     Hyperparameter::continuous("beta", 0.0, 1.0),
//! ])
//! .unwrap();
//!
//! // Observations from a past tuning run: alpha matters 4x more.
//! let mut history = RunHistory::new();
//! for i in 0..40u32 {
//!     let a = f64::from(i % 8) / 8.0;
//!     let b = f64::from(i % 5) / 5.0;
//!     let config = space
//!         .configuration(&[
//!             ("alpha", ParamValue::Float(a)),
//!             ("beta", ParamValue::Float(b)),
//!         ])
//!         .unwrap();
//!     history.add(config, None, 4.0 * a + b, RunStatus::Success);
//! }
//!
//! let incumbent = space
//!     .configuration(&[
//!         ("alpha", ParamValue::Float(0.0)),
//!         ("beta", ParamValue::Float(0.0)),
//!     ])
//!     .unwrap();
//!
//! let mut importance = Importance::builder()
//!     .space(space)
//!     .history(history)
//!     .incumbent(incumbent)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! let result = importance.evaluate(EvaluatorKind::Fanova).unwrap();
//! assert_eq!(result.order[0], "alpha");
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Importance`] | Orchestrate data preparation, surrogate training, and evaluator runs. |
//! | [`ConfigSpace`](space::ConfigSpace) | Define the search space — categorical, integer, and continuous hyperparameters with conditional activity. |
//! | [`RunHistory`](history::RunHistory) | The observation log: (configuration, instance, cost, status) records. |
//! | [`Surrogate`](surrogate::Surrogate) | Regression model predicting performance from a configuration, marginalized over instances. |
//! | [`Evaluator`](evaluator::Evaluator) | A ranking strategy producing an ordered [`ImportanceMap`](evaluator::ImportanceMap). |
//!
//! # Evaluation Methods
//!
//! | Method | Name | Scope |
//! |--------|------|-------|
//! | [`Fanova`](evaluator::EvaluatorKind::Fanova) | Functional-ANOVA variance decomposition | Whole configuration space, plus pairwise effects |
//! | [`Ablation`](evaluator::EvaluatorKind::Ablation) | Default-to-incumbent flip path | Between two configurations |
//! | [`ForwardSelection`](evaluator::EvaluatorKind::ForwardSelection) | Greedy predictive-subset growth | Whole configuration space |
//! | [`IncNeighbor`](evaluator::EvaluatorKind::IncNeighbor) | Local sensitivity around the incumbent | Incumbent neighborhood |
//! | [`InfluenceModel`](evaluator::EvaluatorKind::InfluenceModel) | Linear fit with improvement margin | Whole configuration space |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key pipeline points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod anova;
mod convert;
mod error;
pub mod evaluator;
mod forest;
pub mod history;
mod orchestrator;
mod report;
mod rng_util;
pub mod space;
pub mod surrogate;
mod trajectory;

pub use convert::{InstanceFeatures, RunObjective};
pub use error::{Error, Result};
pub use forest::{Forest, ForestConfig};
pub use orchestrator::{Importance, ImportanceBuilder, ScenarioResults};
pub use trajectory::read_trajectory;

/// Convenient wildcard import for the most common types.
///
/// ```
/// use importance::prelude::*;
/// ```
pub mod prelude {
    pub use crate::anova::FanovaEngine;
    pub use crate::convert::{InstanceFeatures, RunObjective};
    pub use crate::error::{Error, Result};
    pub use crate::evaluator::{
        AblationEvaluator, EvaluationResult, Evaluator, EvaluatorKind, EvaluatorSetup,
        FanovaEvaluator, ForwardSelector, ImportanceMap, IncNeighborEvaluator, InfluenceModel,
    };
    pub use crate::history::{RunHistory, RunRecord, RunStatus};
    pub use crate::orchestrator::{Importance, ImportanceBuilder, ScenarioResults};
    pub use crate::space::{ConfigSpace, Configuration, Hyperparameter, ParamKind, ParamValue};
    pub use crate::surrogate::{RandomForestSurrogate, Surrogate};
}
