//! Trajectory files: the incumbent log written during a tuning run.
//!
//! A trajectory is a JSONL file whose lines record the incumbent at the
//! time of writing; the last parseable line is authoritative:
//!
//! ```text
//! {"incumbent": ["a=red", "b=2.5", "c=10"], "cost": 1.42}
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::space::{ConfigSpace, Configuration, ParamKind, ParamValue};

#[derive(Deserialize)]
struct TrajectoryLine {
    incumbent: Vec<String>,
    cost: f64,
}

/// Reads the authoritative (last) incumbent entry of a trajectory file.
///
/// # Errors
///
/// Returns [`Error::TrajectoryNotFound`] for missing files and
/// [`Error::Storage`] when no line parses into an incumbent record.
pub fn read_trajectory(space: &ConfigSpace, path: impl AsRef<Path>) -> Result<(Configuration, f64)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::TrajectoryNotFound(path.to_path_buf())
        } else {
            Error::Storage(e.to_string())
        }
    })?;

    let reader = BufReader::new(file);
    let mut last: Option<TrajectoryLine> = None;
    for line in reader.lines() {
        let line = line.map_err(|e| Error::Storage(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(parsed) = serde_json::from_str::<TrajectoryLine>(line) {
            last = Some(parsed);
        }
    }

    let last = last.ok_or_else(|| {
        Error::Storage(format!("no incumbent entry in {}", path.display()))
    })?;
    let config = parse_incumbent(space, &last.incumbent)?;
    Ok((config, last.cost))
}

/// Parses `name=value` assignment strings, casting per hyperparameter kind.
fn parse_incumbent(space: &ConfigSpace, entries: &[String]) -> Result<Configuration> {
    let mut assignments: Vec<(&str, ParamValue)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let cleaned = entry.replace('\'', "");
        let Some((name, value)) = cleaned.split_once('=') else {
            return Err(Error::Storage(format!("malformed incumbent entry '{entry}'")));
        };
        let name = name.trim();
        let value = value.trim();
        let idx = space.index_of(name)?;
        let parsed = match space.hyperparameters()[idx].kind() {
            ParamKind::Categorical { .. } => {
                ParamValue::Categorical(space.choice_index(name, value)?)
            }
            ParamKind::Continuous { .. } => ParamValue::Float(
                value
                    .parse::<f64>()
                    .map_err(|e| Error::Storage(e.to_string()))?,
            ),
            ParamKind::Integer { .. } => ParamValue::Int(
                value
                    .parse::<i64>()
                    .map_err(|e| Error::Storage(e.to_string()))?,
            ),
        };
        // Borrow the name from the space so assignments outlive `cleaned`.
        let name = space.hyperparameters()[idx].name();
        assignments.push((name, parsed));
    }
    space.configuration(&assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Hyperparameter;

    fn space() -> ConfigSpace {
        ConfigSpace::new(vec![
            Hyperparameter::categorical("a", &["red", "green"]),
            Hyperparameter::continuous("b", 0.0, 10.0),
            Hyperparameter::integer("c", 1, 100),
        ])
        .unwrap()
    }

    #[test]
    fn last_line_wins() {
        let space = space();
        let dir = std::env::temp_dir().join("importance-traj");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("traj.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"incumbent": ["a=red", "b=1.0", "c=5"], "cost": 9.0}"#,
                "\n",
                r#"{"incumbent": ["a=green", "b=2.5", "c=10"], "cost": 1.5}"#,
                "\n",
            ),
        )
        .unwrap();

        let (config, cost) = read_trajectory(&space, &path).unwrap();
        assert!((cost - 1.5).abs() < 1e-12);
        assert!((config.values()[0] - 1.0).abs() < 1e-12);
        assert!((config.values()[1] - 0.25).abs() < 1e-12);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_error() {
        let err = read_trajectory(&space(), "/nonexistent/traj.jsonl").unwrap_err();
        assert!(matches!(err, Error::TrajectoryNotFound(_)));
    }

    #[test]
    fn quoted_entries_are_cleaned() {
        let space = space();
        let dir = std::env::temp_dir().join("importance-traj-quoted");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("traj.jsonl");
        std::fs::write(
            &path,
            concat!(r#"{"incumbent": ["a='red'", "b=3.0", "c=7"], "cost": 2.0}"#, "\n"),
        )
        .unwrap();
        let (config, _) = read_trajectory(&space, &path).unwrap();
        assert!((config.values()[0]).abs() < 1e-12);
        std::fs::remove_file(path).ok();
    }
}
