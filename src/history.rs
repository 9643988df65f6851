//! Run history: the observation log of a configuration run.
//!
//! A [`RunHistory`] owns the distinct configurations that were evaluated
//! and an append-only list of [`RunRecord`]s referencing them. Histories
//! are read from JSONL files, one JSON object per observation:
//!
//! ```text
//! {"config": {"a": "red", "b": 2.5, "c": 10}, "instance": "i1", "cost": 1.2, "status": "success"}
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::space::{ConfigSpace, Configuration, ParamKind, ParamValue};

/// Outcome status of a single observed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run finished and reported a true cost.
    Success,
    /// The run hit the cutoff; the cost is only a lower bound.
    Timeout,
    /// The run was adaptively capped; the cost is only a lower bound.
    Capped,
    /// The run crashed; the cost carries no signal.
    Crashed,
}

impl RunStatus {
    /// Whether the observed cost is censored (a lower bound, not a value).
    #[must_use]
    pub fn is_censored(self) -> bool {
        matches!(self, Self::Timeout | Self::Capped)
    }
}

/// One observation: a configuration run on an (optional) instance.
#[derive(Clone, Debug)]
pub struct RunRecord {
    /// Index into [`RunHistory::configurations`].
    pub config_id: usize,
    /// Problem-instance identifier, if the scenario has instances.
    pub instance: Option<String>,
    /// Observed cost (possibly censored, see [`RunStatus`]).
    pub cost: f64,
    /// Run outcome.
    pub status: RunStatus,
}

/// Append-only collection of run observations.
#[derive(Clone, Debug, Default)]
pub struct RunHistory {
    configs: Vec<Configuration>,
    records: Vec<RunRecord>,
}

impl RunHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one observation. Configurations are deduplicated by value.
    pub fn add(
        &mut self,
        config: Configuration,
        instance: Option<String>,
        cost: f64,
        status: RunStatus,
    ) {
        let config_id = self
            .configs
            .iter()
            .position(|c| same_vector(c.values(), config.values()))
            .unwrap_or_else(|| {
                self.configs.push(config);
                self.configs.len() - 1
            });
        self.records.push(RunRecord {
            config_id,
            instance,
            cost,
            status,
        });
    }

    /// Returns every distinct configuration, in first-seen order.
    #[must_use]
    pub fn configurations(&self) -> &[Configuration] {
        &self.configs
    }

    /// Returns the observation records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Returns the number of observation records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the history holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads a history from a single JSONL file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HistoryNotFound`] if the file does not exist and
    /// [`Error::Storage`] for unreadable or malformed records.
    pub fn load(space: &ConfigSpace, path: impl AsRef<Path>) -> Result<Self> {
        let mut history = Self::new();
        history.merge_file(space, path.as_ref())?;
        Ok(history)
    }

    /// Loads and merges every file matching `pattern` (a path, or a
    /// filename with a single `*` wildcard), in sorted path order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HistoryNotFound`] if nothing matches.
    pub fn load_pattern(space: &ConfigSpace, pattern: &str) -> Result<(Self, Vec<PathBuf>)> {
        let files = expand_pattern(pattern)?;
        let mut history = Self::new();
        for file in &files {
            history.merge_file(space, file)?;
        }
        Ok((history, files))
    }

    fn merge_file(&mut self, space: &ConfigSpace, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::HistoryNotFound(path.display().to_string())
            } else {
                Error::Storage(e.to_string())
            }
        })?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line.map_err(|e| Error::Storage(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawRecord =
                serde_json::from_str(line).map_err(|e| Error::Storage(e.to_string()))?;
            let config = parse_config(space, &raw.config)?;
            self.add(config, raw.instance, raw.cost, raw.status);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawRecord {
    config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    instance: Option<String>,
    cost: f64,
    status: RunStatus,
}

/// Casts JSON values per hyperparameter kind and encodes the configuration.
fn parse_config(space: &ConfigSpace, raw: &HashMap<String, serde_json::Value>) -> Result<Configuration> {
    let mut assignments: Vec<(&str, ParamValue)> = Vec::with_capacity(raw.len());
    for (name, value) in raw {
        let idx = space.index_of(name)?;
        let param = &space.hyperparameters()[idx];
        let parsed = match (param.kind(), value) {
            (ParamKind::Categorical { .. }, serde_json::Value::String(s)) => {
                ParamValue::Categorical(space.choice_index(name, s)?)
            }
            (ParamKind::Integer { .. }, serde_json::Value::Number(n)) => {
                ParamValue::Int(n.as_i64().ok_or(Error::Internal("non-integer value"))?)
            }
            (ParamKind::Continuous { .. }, serde_json::Value::Number(n)) => {
                ParamValue::Float(n.as_f64().ok_or(Error::Internal("non-numeric value"))?)
            }
            _ => {
                return Err(Error::Storage(format!(
                    "value for '{name}' does not match its hyperparameter kind"
                )));
            }
        };
        assignments.push((name.as_str(), parsed));
    }
    space.configuration(&assignments)
}

/// Bitwise vector equality that treats `NaN` placeholders as equal.
fn same_vector(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()))
}

/// Expands a path or single-`*` filename pattern into sorted matches.
pub(crate) fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Err(Error::HistoryNotFound(pattern.to_string()));
    };

    if !name.contains('*') {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        return Err(Error::HistoryNotFound(pattern.to_string()));
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let (prefix, suffix) = name.split_once('*').unwrap_or((name, ""));

    let entries = std::fs::read_dir(dir).map_err(|e| Error::Storage(e.to_string()))?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| {
                        n.len() >= prefix.len() + suffix.len()
                            && n.starts_with(prefix)
                            && n.ends_with(suffix)
                    })
        })
        .collect();
    if matches.is_empty() {
        return Err(Error::HistoryNotFound(pattern.to_string()));
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Hyperparameter;

    fn space() -> ConfigSpace {
        ConfigSpace::new(vec![
            Hyperparameter::categorical("a", &["red", "green"]),
            Hyperparameter::continuous("b", 0.0, 10.0),
        ])
        .unwrap()
    }

    #[test]
    fn deduplicates_configurations() {
        let space = space();
        let config = space
            .configuration(&[("a", ParamValue::Categorical(0)), ("b", ParamValue::Float(1.0))])
            .unwrap();
        let mut history = RunHistory::new();
        history.add(config.clone(), Some("i1".into()), 1.0, RunStatus::Success);
        history.add(config, Some("i2".into()), 2.0, RunStatus::Success);
        assert_eq!(history.configurations().len(), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[1].config_id, 0);
    }

    #[test]
    fn loads_jsonl_records() {
        let space = space();
        let dir = std::env::temp_dir().join("importance-history-load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runhistory.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"config": {"a": "red", "b": 2.5}, "instance": "i1", "cost": 1.5, "status": "success"}"#,
                "\n",
                r#"{"config": {"a": "green", "b": 5.0}, "cost": 3.0, "status": "timeout"}"#,
                "\n",
            ),
        )
        .unwrap();

        let history = RunHistory::load(&space, &path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[0].instance.as_deref(), Some("i1"));
        assert_eq!(history.records()[1].status, RunStatus::Timeout);
        assert!(history.records()[1].instance.is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_not_found() {
        let space = space();
        let err = RunHistory::load(&space, "/nonexistent/runhistory.jsonl").unwrap_err();
        assert!(matches!(err, Error::HistoryNotFound(_)));
    }

    #[test]
    fn pattern_expansion_sorts_matches() {
        let dir = std::env::temp_dir().join("importance-history-pattern");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("run-2.jsonl"), "").unwrap();
        std::fs::write(dir.join("run-1.jsonl"), "").unwrap();
        let pattern = dir.join("run-*.jsonl");
        let files = expand_pattern(pattern.to_str().unwrap()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("run-1.jsonl"));
        std::fs::remove_dir_all(dir).ok();
    }
}
