//! Gap-filling engine for fixed-cadence water-level sensor series.
//!
//! Raw readings are regularised onto a fixed-interval grid, missing rows are
//! grouped by week and severity, and each group is filled by a regression
//! forest trained on the smallest sufficient scope of surrounding data.
//! Filled rows keep their provenance, and a synthetic deletion can be
//! scored against the original values.

pub mod config;
pub mod deletion;
pub mod error;
pub mod features;
pub mod fill;
pub mod forest;
pub mod grid;
pub mod imputation;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod search;
pub mod validation;

// Re-exports for convenience
pub use config::{FillConfig, TimeWindow};
pub use deletion::{delete_range, DeletionOutcome};
pub use error::{FillError, Result};
pub use features::{
    days_in_month, derive_calendar, derive_value_prev, feature_matrix, target_vector,
    CalendarFeatures, FeatureSet, CALENDAR_FEATURES, VALUE_PREV,
};
pub use fill::{fill_backward, fill_both, fill_forward, fill_interpolate};
pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use grid::{
    clean_readings, detect_interval, normalize, parse_timestamp, CleaningStats, Grid, GridRow,
    OutputRecord, RawRecord, Reading,
};
pub use imputation::{
    impute, ImputationReport, ImputationStatus, TrainingScope, UnresolvedSpan, WeekResolution,
};
pub use metrics::{accuracy_report, mae, mse, r2, rmse, AccuracyReport};
pub use partition::{
    missing_spans, partition_gaps, GapPartition, MissingSpan, Severity, WeekGroup,
    DEFAULT_SEVERITY_THRESHOLD,
};
pub use pipeline::{run, FillOutcome};
pub use search::{train_regressor, Scoring, SearchConfig, SearchSpace, TrainedModel};
pub use validation::{CrossValidator, CvScheme, CvSplit};
