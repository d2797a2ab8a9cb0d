//! Run configuration for the gap-filling engine.

use crate::error::{FillError, Result};
use crate::features::FeatureSet;
use crate::partition::DEFAULT_SEVERITY_THRESHOLD;
use crate::search::SearchConfig;
use chrono::{Duration, NaiveDateTime};
use std::ops::RangeInclusive;

/// Inclusive timestamp range; open ends extend to the grid edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Options for one gap-filling run.
#[derive(Debug, Clone, PartialEq)]
pub struct FillConfig {
    /// Grid spacing
    pub interval: Duration,
    /// Plausible sensor values; zero is always rejected
    pub valid_range: RangeInclusive<f64>,
    /// Weeks with at most this many missing rows are low-severity
    pub severity_threshold: usize,
    pub feature_set: FeatureSet,
    /// Shift added to auxiliary station timestamps
    pub auxiliary_lag: Duration,
    /// Add the previous calendar month to adjacent-week training scopes
    pub include_prior_month: bool,
    /// Retry low-severity weeks without present rows on the adjacent-week path
    pub low_severity_fallback: bool,
    /// Rows considered for imputation
    pub window: TimeWindow,
    /// Range to blank before imputation, for evaluation
    pub deletion: Option<(NaiveDateTime, NaiveDateTime)>,
    /// Largest share of grid rows a deletion may blank
    pub max_deletion_fraction: f64,
    pub search: SearchConfig,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(15),
            valid_range: 100.0..=450.0,
            severity_threshold: DEFAULT_SEVERITY_THRESHOLD,
            feature_set: FeatureSet::Calendar,
            auxiliary_lag: Duration::zero(),
            include_prior_month: false,
            low_severity_fallback: true,
            window: TimeWindow::default(),
            deletion: None,
            max_deletion_fraction: 0.30,
            search: SearchConfig::default(),
        }
    }
}

impl FillConfig {
    /// Autoregressive features, prior-month rows in adjacent scopes and the
    /// extended search.
    pub fn extended() -> Self {
        Self {
            feature_set: FeatureSet::Autoregressive,
            include_prior_month: true,
            search: SearchConfig::extended(),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_valid_range(mut self, range: RangeInclusive<f64>) -> Self {
        self.valid_range = range;
        self
    }

    pub fn with_severity_threshold(mut self, threshold: usize) -> Self {
        self.severity_threshold = threshold;
        self
    }

    pub fn with_feature_set(mut self, feature_set: FeatureSet) -> Self {
        self.feature_set = feature_set;
        self
    }

    pub fn with_auxiliary_lag(mut self, lag: Duration) -> Self {
        self.auxiliary_lag = lag;
        self
    }

    pub fn with_prior_month(mut self, include: bool) -> Self {
        self.include_prior_month = include;
        self
    }

    pub fn with_low_severity_fallback(mut self, fallback: bool) -> Self {
        self.low_severity_fallback = fallback;
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_deletion(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.deletion = Some((start, end));
        self
    }

    pub fn with_max_deletion_fraction(mut self, fraction: f64) -> Self {
        self.max_deletion_fraction = fraction;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval < Duration::seconds(1) {
            return Err(FillError::invalid_parameter(
                "interval",
                self.interval,
                "must be at least one second",
            ));
        }

        let (lo, hi) = (*self.valid_range.start(), *self.valid_range.end());
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(FillError::invalid_parameter(
                "valid_range",
                format!("{}..={}", lo, hi),
                "bounds must be finite and ordered",
            ));
        }

        if self.severity_threshold == 0 {
            return Err(FillError::invalid_parameter(
                "severity_threshold",
                0,
                "must be positive",
            ));
        }

        if !(self.max_deletion_fraction > 0.0 && self.max_deletion_fraction <= 1.0) {
            return Err(FillError::invalid_parameter(
                "max_deletion_fraction",
                self.max_deletion_fraction,
                "must be in (0, 1]",
            ));
        }

        if let (Some(s), Some(e)) = (self.window.start, self.window.end) {
            if s > e {
                return Err(FillError::invalid_parameter(
                    "window",
                    format!("{} .. {}", s, e),
                    "start must not be after end",
                ));
            }
        }

        if let Some((s, e)) = self.deletion {
            if s > e {
                return Err(FillError::invalid_parameter(
                    "deletion",
                    format!("{} .. {}", s, e),
                    "start must not be after end",
                ));
            }
        }

        self.search.validate()
    }
}
