//! Importance evaluators and their shared contract.
//!
//! Every evaluation strategy implements [`Evaluator`]: construct from an
//! [`EvaluatorSetup`] bundle, [`run`](Evaluator::run) once to produce an
//! insertion-ordered [`ImportanceMap`], and render the ranking with
//! [`plot_result`](Evaluator::plot_result). Strategies are enumerated by
//! the closed [`EvaluatorKind`]; unknown method names fail fast.

use core::str::FromStr;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::history::RunHistory;
use crate::space::{ConfigSpace, Configuration};
use crate::surrogate::Surrogate;

mod ablation;
mod fanova;
mod forward_selection;
mod incneighbor;
mod influence;

pub use ablation::AblationEvaluator;
pub use fanova::FanovaEvaluator;
pub use forward_selection::ForwardSelector;
pub use incneighbor::IncNeighborEvaluator;
pub use influence::InfluenceModel;

/// Insertion-ordered mapping from importance keys to values.
///
/// Insertion order encodes rank: singleton hyperparameters first (most
/// important first), pairwise keys appended after all singles. Never
/// mutated once returned from an evaluator run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportanceMap {
    entries: Vec<(String, f64)>,
}

impl ImportanceMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Keys are expected to be unique.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.entries.push((key.into(), value));
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Keys in insertion (rank) order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion (rank) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ImportanceMap {
    type Item = (&'a str, f64);
    type IntoIter = core::iter::Map<
        core::slice::Iter<'a, (String, f64)>,
        fn(&'a (String, f64)) -> (&'a str, f64),
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn entry(pair: &(String, f64)) -> (&str, f64) {
            (pair.0.as_str(), pair.1)
        }
        self.entries.iter().map(entry as fn(&'a (String, f64)) -> (&'a str, f64))
    }
}

/// Renders a pairwise key in its textual serialization.
#[must_use]
pub fn pair_key(a: &str, b: &str) -> String {
    format!("[{a}, {b}]")
}

/// Outcome of one evaluator run: the mapping and its key order.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluationResult {
    /// Ranked importance mapping.
    pub importance: ImportanceMap,
    /// The mapping's keys in rank order.
    pub order: Vec<String>,
}

impl EvaluationResult {
    pub(crate) fn from_map(importance: ImportanceMap) -> Self {
        let order = importance.keys().map(ToString::to_string).collect();
        Self { importance, order }
    }
}

/// A parameter-importance evaluation strategy.
pub trait Evaluator {
    /// Human-readable strategy name.
    fn name(&self) -> &'static str;

    /// Computes the importance ranking.
    ///
    /// # Errors
    ///
    /// Strategy-specific; see the implementations.
    fn run(&mut self) -> Result<EvaluationResult>;

    /// The importance mapping produced by the last [`run`](Self::run)
    /// (empty before the first run).
    fn importance(&self) -> &ImportanceMap;

    /// Number of leading singleton entries in [`importance`](Self::importance);
    /// the remaining entries are pairwise.
    fn num_singles(&self) -> usize {
        self.importance().len()
    }

    /// Writes an HTML ranking report, iterating singles in ranked order
    /// and pairs in reported order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the report cannot be written.
    fn plot_result(&self, path: &Path) -> Result<()> {
        crate::report::write_importance_report(path, self.name(), self.importance(), self.num_singles())
    }
}

/// The closed set of evaluation strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvaluatorKind {
    /// Greedy default-to-incumbent ablation path.
    Ablation,
    /// Functional-ANOVA variance decomposition.
    Fanova,
    /// Greedy forward subset selection.
    ForwardSelection,
    /// Linear influence model with improvement margin.
    InfluenceModel,
    /// Local neighborhood of the incumbent.
    IncNeighbor,
}

impl EvaluatorKind {
    /// Canonical method name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ablation => "ablation",
            Self::Fanova => "fanova",
            Self::ForwardSelection => "forward-selection",
            Self::InfluenceModel => "influence-model",
            Self::IncNeighbor => "incneighbor",
        }
    }

    /// Constructs the evaluator for this kind, validating the setup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIncumbent`] for kinds that need one, and
    /// any strategy-specific construction error.
    pub fn build(self, setup: EvaluatorSetup) -> Result<Box<dyn Evaluator>> {
        match self {
            Self::Ablation => Ok(Box::new(AblationEvaluator::new(setup)?)),
            Self::Fanova => Ok(Box::new(FanovaEvaluator::new(setup)?)),
            Self::ForwardSelection => Ok(Box::new(ForwardSelector::new(setup)?)),
            Self::InfluenceModel => Ok(Box::new(InfluenceModel::new(setup)?)),
            Self::IncNeighbor => Ok(Box::new(IncNeighborEvaluator::new(setup)?)),
        }
    }
}

impl FromStr for EvaluatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ablation" => Ok(Self::Ablation),
            "fanova" => Ok(Self::Fanova),
            "forward-selection" => Ok(Self::ForwardSelection),
            "influence-model" => Ok(Self::InfluenceModel),
            "incneighbor" => Ok(Self::IncNeighbor),
            other => Err(Error::InvalidMethod(other.to_string())),
        }
    }
}

impl core::fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform construction bundle handed to every evaluator.
///
/// Required fields are always present; optional fields are validated per
/// kind at construction time.
#[derive(Clone)]
pub struct EvaluatorSetup {
    /// The configuration space.
    pub space: Arc<ConfigSpace>,
    /// The trained surrogate model.
    pub model: Arc<dyn Surrogate>,
    /// Feature matrix the surrogate was trained on.
    pub x: Arc<Vec<Vec<f64>>>,
    /// Target vector the surrogate was trained on.
    pub y: Arc<Vec<f64>>,
    /// The observation history (consumed by fANOVA preprocessing).
    pub history: Arc<RunHistory>,
    /// Number of hyperparameters to report; `None` reports all.
    pub to_evaluate: Option<usize>,
    /// The resolved incumbent, required by ablation and incneighbor.
    pub incumbent: Option<Configuration>,
    /// Minimal improvement for the influence model to accept a parameter.
    pub margin: Option<f64>,
    /// Seed for evaluator-local randomness.
    pub seed: u64,
}

impl EvaluatorSetup {
    /// Number of singleton entries a run may report.
    pub(crate) fn report_limit(&self) -> usize {
        self.to_evaluate.unwrap_or(self.space.len()).min(self.space.len())
    }

    pub(crate) fn require_incumbent(&self, method: &'static str) -> Result<Configuration> {
        self.incumbent
            .clone()
            .ok_or(Error::MissingIncumbent(method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for kind in [
            EvaluatorKind::Ablation,
            EvaluatorKind::Fanova,
            EvaluatorKind::ForwardSelection,
            EvaluatorKind::InfluenceModel,
            EvaluatorKind::IncNeighbor,
        ] {
            assert_eq!(kind.as_str().parse::<EvaluatorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_method_fails_fast() {
        let err = "gradient-boosting".parse::<EvaluatorKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(_)));
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut map = ImportanceMap::new();
        map.insert("b", 0.6);
        map.insert("c", 0.3);
        map.insert(pair_key("b", "c"), 0.05);
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["b", "c", "[b, c]"]);
        assert_eq!(map.get("c"), Some(0.3));
        assert_eq!(map.get("missing"), None);
    }
}
