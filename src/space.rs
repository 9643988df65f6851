//! Configuration space: hyperparameter definitions, conditional activity,
//! and the numeric encoding of configurations.
//!
//! A [`ConfigSpace`] owns an ordered list of [`Hyperparameter`]s. Every
//! [`Configuration`] is a fixed-length numeric vector in the *unit
//! representation*: continuous and integer parameters are normalized to
//! `[0, 1]` (log-aware), categorical parameters store their choice index.
//! Conditionally inactive parameters hold a `NaN` placeholder.
//!
//! # Example
//!
//! ```
//! use importance::space::{ConfigSpace, Hyperparameter, ParamValue};
//!
//! let space = ConfigSpace::new(vec![
//!     Hyperparameter::categorical("solver", &["sat", "smt"]),
//!     Hyperparameter::continuous("alpha", 0.0, 1.0),
//!     Hyperparameter::integer("restarts", 1, 100).log_scale(),
//! ])
//! .unwrap();
//!
//! let config = space
//!     .configuration(&[
//!         ("solver", ParamValue::Categorical(1)),
//!         ("alpha", ParamValue::Float(0.25)),
//!         ("restarts", ParamValue::Int(10)),
//!     ])
//!     .unwrap();
//! assert_eq!(config.values().len(), 3);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A typed hyperparameter value in its native scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// A continuous value.
    Float(f64),
    /// An integer value.
    Int(i64),
    /// A categorical value, stored as an index into the choices array.
    Categorical(usize),
}

/// The kind of a hyperparameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    /// A categorical parameter over named choices.
    Categorical {
        /// The available choices.
        choices: Vec<String>,
    },
    /// An integer parameter with inclusive bounds.
    Integer {
        /// Lower bound (inclusive).
        low: i64,
        /// Upper bound (inclusive).
        high: i64,
        /// Whether the range is interpolated in log space.
        log_scale: bool,
    },
    /// A continuous parameter with inclusive bounds.
    Continuous {
        /// Lower bound (inclusive).
        low: f64,
        /// Upper bound (inclusive).
        high: f64,
        /// Whether the range is interpolated in log space.
        log_scale: bool,
    },
}

/// Activity condition: the parameter is active only while its parent
/// categorical parameter takes one of the listed choices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the parent categorical hyperparameter.
    pub parent: String,
    /// Parent choices under which the child is active.
    pub choices: Vec<String>,
}

/// A named hyperparameter with optional default and activity condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameter {
    name: String,
    kind: ParamKind,
    default: Option<ParamValue>,
    condition: Option<Condition>,
}

impl Hyperparameter {
    /// Creates a categorical hyperparameter over the given choices.
    #[must_use]
    pub fn categorical(name: &str, choices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Categorical {
                choices: choices.iter().map(ToString::to_string).collect(),
            },
            default: None,
            condition: None,
        }
    }

    /// Creates an integer hyperparameter with inclusive bounds.
    #[must_use]
    pub fn integer(name: &str, low: i64, high: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Integer {
                low,
                high,
                log_scale: false,
            },
            default: None,
            condition: None,
        }
    }

    /// Creates a continuous hyperparameter with inclusive bounds.
    #[must_use]
    pub fn continuous(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Continuous {
                low,
                high,
                log_scale: false,
            },
            default: None,
            condition: None,
        }
    }

    /// Enables log-scale interpolation for a numeric hyperparameter.
    #[must_use]
    pub fn log_scale(mut self) -> Self {
        match &mut self.kind {
            ParamKind::Integer { log_scale, .. } | ParamKind::Continuous { log_scale, .. } => {
                *log_scale = true;
            }
            ParamKind::Categorical { .. } => {}
        }
        self
    }

    /// Sets the default value used for imputing inactive entries.
    #[must_use]
    pub fn default_value(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Restricts activity to configurations where `parent` takes one of
    /// the listed choices.
    #[must_use]
    pub fn conditional_on(mut self, parent: &str, choices: &[&str]) -> Self {
        self.condition = Some(Condition {
            parent: parent.to_string(),
            choices: choices.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Returns the hyperparameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hyperparameter kind.
    #[must_use]
    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    /// Returns `true` for categorical hyperparameters.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, ParamKind::Categorical { .. })
    }

    fn validate(&self) -> Result<()> {
        match &self.kind {
            ParamKind::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(Error::EmptyChoices);
                }
            }
            #[allow(clippy::cast_precision_loss)]
            ParamKind::Integer {
                low,
                high,
                log_scale,
            } => {
                if low > high {
                    return Err(Error::InvalidBounds {
                        low: *low as f64,
                        high: *high as f64,
                    });
                }
                if *log_scale && *low <= 0 {
                    return Err(Error::InvalidLogBounds);
                }
            }
            ParamKind::Continuous {
                low,
                high,
                log_scale,
            } => {
                if low > high {
                    return Err(Error::InvalidBounds {
                        low: *low,
                        high: *high,
                    });
                }
                if *log_scale && *low <= 0.0 {
                    return Err(Error::InvalidLogBounds);
                }
            }
        }
        Ok(())
    }

    /// Unit representation of the default value. Falls back to the range
    /// midpoint (numeric) or the first choice (categorical).
    #[allow(clippy::cast_precision_loss)]
    fn default_unit(&self) -> f64 {
        match (&self.default, &self.kind) {
            (Some(ParamValue::Categorical(idx)), ParamKind::Categorical { .. }) => *idx as f64,
            (Some(ParamValue::Float(v)), ParamKind::Continuous { .. }) => self.normalize(*v),
            (Some(ParamValue::Int(v)), ParamKind::Integer { .. }) => self.normalize(*v as f64),
            (_, ParamKind::Categorical { .. }) => 0.0,
            _ => 0.5,
        }
    }

    /// Maps a native-scale numeric value into `[0, 1]`. Categorical
    /// values pass through as their index.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn normalize(&self, value: f64) -> f64 {
        match &self.kind {
            ParamKind::Categorical { .. } => value,
            ParamKind::Integer {
                low,
                high,
                log_scale,
            } => normalize_range(value, *low as f64, *high as f64, *log_scale),
            ParamKind::Continuous {
                low,
                high,
                log_scale,
            } => normalize_range(value, *low, *high, *log_scale),
        }
    }

    /// Maps a unit-representation value back to the native scale.
    /// Categorical values are returned untouched; integers round.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn transform(&self, unit: f64) -> f64 {
        match &self.kind {
            ParamKind::Categorical { .. } => unit,
            ParamKind::Integer {
                low,
                high,
                log_scale,
            } => transform_range(unit, *low as f64, *high as f64, *log_scale).round(),
            ParamKind::Continuous {
                low,
                high,
                log_scale,
            } => transform_range(unit, *low, *high, *log_scale),
        }
    }

    /// Validates a native value and returns its unit representation.
    #[allow(clippy::cast_precision_loss)]
    fn encode(&self, value: ParamValue) -> Result<f64> {
        match (value, &self.kind) {
            (ParamValue::Categorical(idx), ParamKind::Categorical { choices }) => {
                if idx >= choices.len() {
                    return Err(Error::UnknownChoice {
                        name: self.name.clone(),
                        choice: format!("#{idx}"),
                    });
                }
                Ok(idx as f64)
            }
            (ParamValue::Float(v), ParamKind::Continuous { low, high, .. }) => {
                if v < *low || v > *high {
                    return Err(Error::ValueOutOfBounds {
                        name: self.name.clone(),
                        value: v,
                        low: *low,
                        high: *high,
                    });
                }
                Ok(self.normalize(v))
            }
            (ParamValue::Int(v), ParamKind::Integer { low, high, .. }) => {
                if v < *low || v > *high {
                    return Err(Error::ValueOutOfBounds {
                        name: self.name.clone(),
                        value: v as f64,
                        low: *low as f64,
                        high: *high as f64,
                    });
                }
                Ok(self.normalize(v as f64))
            }
            _ => Err(Error::Internal("parameter value does not match its kind")),
        }
    }
}

fn normalize_range(value: f64, low: f64, high: f64, log_scale: bool) -> f64 {
    if high <= low {
        return 0.0;
    }
    if log_scale {
        (value.ln() - low.ln()) / (high.ln() - low.ln())
    } else {
        (value - low) / (high - low)
    }
}

fn transform_range(unit: f64, low: f64, high: f64, log_scale: bool) -> f64 {
    if log_scale {
        (low.ln() + unit * (high.ln() - low.ln())).exp()
    } else {
        low + unit * (high - low)
    }
}

/// A single assignment of values to the active hyperparameters of a space.
///
/// Immutable once created. Inactive entries hold `NaN`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    values: Vec<f64>,
}

impl Configuration {
    /// Returns the unit-representation vector, one entry per
    /// hyperparameter in space order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns `true` if the hyperparameter at `index` is active.
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        !self.values[index].is_nan()
    }
}

/// An ordered collection of hyperparameters with conditional structure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigSpace {
    params: Vec<Hyperparameter>,
}

impl ConfigSpace {
    /// Creates a configuration space from an ordered list of
    /// hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any hyperparameter has invalid bounds or
    /// choices, or if a condition references an unknown or non-categorical
    /// parent, or a parent declared after its child.
    pub fn new(params: Vec<Hyperparameter>) -> Result<Self> {
        for (idx, param) in params.iter().enumerate() {
            param.validate()?;
            if let Some(cond) = &param.condition {
                let parent_idx = params
                    .iter()
                    .position(|p| p.name == cond.parent)
                    .ok_or_else(|| Error::UnknownHyperparameter(cond.parent.clone()))?;
                if parent_idx >= idx {
                    return Err(Error::Internal(
                        "condition parent must be declared before its child",
                    ));
                }
                let ParamKind::Categorical { choices } = &params[parent_idx].kind else {
                    return Err(Error::Internal("condition parent must be categorical"));
                };
                for choice in &cond.choices {
                    if !choices.contains(choice) {
                        return Err(Error::UnknownChoice {
                            name: cond.parent.clone(),
                            choice: choice.clone(),
                        });
                    }
                }
            }
        }
        Ok(Self { params })
    }

    /// Returns the number of hyperparameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if the space has no hyperparameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the hyperparameters in declaration order.
    #[must_use]
    pub fn hyperparameters(&self) -> &[Hyperparameter] {
        &self.params
    }

    /// Returns the index of the named hyperparameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHyperparameter`] for names outside the space.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::UnknownHyperparameter(name.to_string()))
    }

    /// Resolves a categorical choice string to its index.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names, non-categorical parameters, or
    /// unknown choices.
    pub fn choice_index(&self, name: &str, choice: &str) -> Result<usize> {
        let param = &self.params[self.index_of(name)?];
        let ParamKind::Categorical { choices } = &param.kind else {
            return Err(Error::Internal("choice lookup on non-categorical parameter"));
        };
        choices
            .iter()
            .position(|c| c == choice)
            .ok_or_else(|| Error::UnknownChoice {
                name: name.to_string(),
                choice: choice.to_string(),
            })
    }

    /// Builds a configuration from `(name, value)` assignments.
    ///
    /// Active hyperparameters without an assignment take their default.
    /// Inactive hyperparameters must not be assigned and encode as `NaN`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names, kind mismatches, out-of-bounds
    /// values, or assignments to inactive hyperparameters.
    pub fn configuration(&self, assignments: &[(&str, ParamValue)]) -> Result<Configuration> {
        let mut assigned: Vec<Option<ParamValue>> = vec![None; self.params.len()];
        for (name, value) in assignments {
            let idx = self.index_of(name)?;
            assigned[idx] = Some(*value);
        }

        let mut values = vec![f64::NAN; self.params.len()];
        for idx in 0..self.params.len() {
            let param = &self.params[idx];
            if self.entry_active(param, &values) {
                let unit = match assigned[idx] {
                    Some(value) => param.encode(value)?,
                    None => param.default_unit(),
                };
                values[idx] = unit;
            } else if assigned[idx].is_some() {
                return Err(Error::InactiveParameter(param.name.clone()));
            }
        }
        Ok(Configuration { values })
    }

    /// Returns the configuration where every unconditionally active
    /// hyperparameter takes its default.
    #[must_use]
    pub fn default_configuration(&self) -> Configuration {
        let mut values = vec![f64::NAN; self.params.len()];
        for idx in 0..self.params.len() {
            let param = &self.params[idx];
            if self.entry_active(param, &values) {
                values[idx] = param.default_unit();
            }
        }
        Configuration { values }
    }

    /// Replaces inactive (`NaN`) entries with the parameter defaults,
    /// producing a fully numeric vector.
    #[must_use]
    pub fn impute_inactive_values(&self, config: &Configuration) -> Configuration {
        let values = config
            .values
            .iter()
            .zip(&self.params)
            .map(|(&v, p)| if v.is_nan() { p.default_unit() } else { v })
            .collect();
        Configuration { values }
    }

    /// Maps the unit value at `index` back to the native parameter scale.
    #[must_use]
    pub fn transform(&self, index: usize, unit: f64) -> f64 {
        self.params[index].transform(unit)
    }

    /// Whether `param` is active given the (partially filled) unit vector.
    /// Parents precede children, so earlier entries are already decided.
    fn entry_active(&self, param: &Hyperparameter, values: &[f64]) -> bool {
        let Some(cond) = &param.condition else {
            return true;
        };
        // Parent index is validated at construction.
        let Ok(parent_idx) = self.index_of(&cond.parent) else {
            return false;
        };
        let parent_value = values[parent_idx];
        if parent_value.is_nan() {
            return false;
        }
        let ParamKind::Categorical { choices } = &self.params[parent_idx].kind else {
            return false;
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let choice_idx = parent_value as usize;
        choices
            .get(choice_idx)
            .is_some_and(|choice| cond.choices.contains(choice))
    }
}
