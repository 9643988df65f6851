use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when an unknown evaluation method name is requested.
    #[error("unknown evaluation method '{0}'")]
    InvalidMethod(String),

    /// Returned when an evaluator that needs an incumbent is constructed
    /// without one.
    #[error("method '{0}' requires a resolved incumbent configuration")]
    MissingIncumbent(&'static str),

    /// Returned when no trajectory file, history-adjacent trajectory, or
    /// direct configuration is available to resolve an incumbent from.
    #[error("no incumbent source: supply a trajectory file or a configuration")]
    NoIncumbentSource,

    /// Returned when the variance decomposition degenerates because the
    /// surrogate predicts with zero total variance.
    #[error("variance decomposition degenerated: total predicted variance is zero")]
    DegenerateVariance,

    /// Returned when a trajectory file does not exist.
    #[error("trajectory file not found: {}", .0.display())]
    TrajectoryNotFound(PathBuf),

    /// Returned when no run-history file matches the given path or pattern.
    #[error("no run history found for '{0}'")]
    HistoryNotFound(String),

    /// Returned when a history, trajectory, or report file cannot be read,
    /// written, or parsed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when log scale is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for log scale")]
    InvalidLogBounds,

    /// Returned when categorical choices are empty.
    #[error("categorical choices cannot be empty")]
    EmptyChoices,

    /// Returned when a hyperparameter name is not part of the space.
    #[error("unknown hyperparameter '{0}'")]
    UnknownHyperparameter(String),

    /// Returned when a categorical value is not among the declared choices.
    #[error("unknown choice '{choice}' for hyperparameter '{name}'")]
    UnknownChoice {
        /// The hyperparameter name.
        name: String,
        /// The rejected choice.
        choice: String,
    },

    /// Returned when a numeric value lies outside the declared bounds.
    #[error("value {value} for hyperparameter '{name}' is outside [{low}, {high}]")]
    ValueOutOfBounds {
        /// The hyperparameter name.
        name: String,
        /// The rejected value.
        value: f64,
        /// The lower bound.
        low: f64,
        /// The upper bound.
        high: f64,
    },

    /// Returned when a value is assigned to a conditionally inactive
    /// hyperparameter.
    #[error("hyperparameter '{0}' is inactive under this configuration")]
    InactiveParameter(String),

    /// Returned when a record references an instance with no feature vector.
    #[error("instance '{0}' has no feature vector")]
    UnknownInstance(String),

    /// Returned when X and y row counts disagree.
    #[error("shape mismatch: X has {rows_x} rows but y has {rows_y}")]
    ShapeMismatch {
        /// Rows in the feature matrix.
        rows_x: usize,
        /// Rows in the target vector.
        rows_y: usize,
    },

    /// Returned when the conversion retains no usable observations.
    #[error("run history yields no usable observations")]
    NoObservations,

    /// Returned when a surrogate is queried before being trained.
    #[error("surrogate model must be trained before prediction")]
    NotTrained,

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
