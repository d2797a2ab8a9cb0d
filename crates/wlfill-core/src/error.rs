//! Error types for the gap-filling engine.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result type for gap-filling operations.
pub type Result<T> = std::result::Result<T, FillError>;

/// Error types for gap-filling operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FillError {
    #[error("Malformed input: {reason} ({rows} rows affected)")]
    MalformedInput { rows: usize, reason: String },

    #[error("Insufficient data for {scope}: need at least {needed} rows, got {got}")]
    InsufficientData {
        scope: String,
        needed: usize,
        got: usize,
    },

    #[error(
        "Deletion of {rows} of {total} rows between {start} and {end} exceeds the allowed fraction {max_fraction}"
    )]
    ExcessiveDeletion {
        start: NaiveDateTime,
        end: NaiveDateTime,
        rows: usize,
        total: usize,
        max_fraction: f64,
    },

    #[error("No data found between {start} and {end}")]
    NoDataInRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl FillError {
    /// Whether the error aborts the current run.
    ///
    /// Gridding, feature and configuration failures are fatal. Training
    /// scopes without data and rejected deletions are reported to the caller
    /// while the rest of the run continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            FillError::MalformedInput { .. }
            | FillError::InvalidParameter { .. }
            | FillError::InvalidInput(_)
            | FillError::ComputationError(_) => true,
            FillError::InsufficientData { .. }
            | FillError::ExcessiveDeletion { .. }
            | FillError::NoDataInRange { .. } => false,
        }
    }

    pub(crate) fn insufficient(scope: impl Into<String>, needed: usize, got: usize) -> Self {
        FillError::InsufficientData {
            scope: scope.into(),
            needed,
            got,
        }
    }

    pub(crate) fn invalid_parameter(
        param: &str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        FillError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
