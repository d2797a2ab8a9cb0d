//! Week-by-week imputation of missing grid rows.
//!
//! Low-severity weeks are filled first from their own present rows. High
//! severity weeks are then filled from the adjacent weeks (after the low
//! severity fills have been merged in), or from the whole calendar month when
//! the following week is itself heavily missing. A fresh model is trained for
//! every week and dropped once its predictions are written.

use crate::config::FillConfig;
use crate::error::{FillError, Result};
use crate::features::{feature_matrix, target_vector};
use crate::forest::ForestParams;
use crate::grid::Grid;
use crate::partition::{missing_spans, partition_gaps, MissingSpan, Severity, WeekGroup};
use crate::search::train_regressor;
use chrono::Local;
use log::{info, warn};
use std::collections::BTreeSet;
use std::fmt;

/// Overall result of an imputation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImputationStatus {
    /// The window had no missing rows
    NothingToDo,
    /// Every missing row was filled
    Completed,
    /// Some spans could not be filled
    Partial,
}

/// Rows a week's model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingScope {
    /// Present rows of the week itself
    Week { week: u32 },
    /// Present or filled rows of the neighbouring weeks, optionally with the
    /// previous calendar month
    AdjacentWeeks {
        prev: u32,
        next: u32,
        prior_month: Option<u32>,
    },
    /// Present or filled rows of the calendar month anywhere in the grid
    Month { month: u32 },
}

impl fmt::Display for TrainingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingScope::Week { week } => write!(f, "week {}", week),
            TrainingScope::AdjacentWeeks {
                prev,
                next,
                prior_month,
            } => {
                write!(f, "weeks {} and {}", prev, next)?;
                if let Some(m) = prior_month {
                    write!(f, " plus month {}", m)?;
                }
                Ok(())
            }
            TrainingScope::Month { month } => write!(f, "month {}", month),
        }
    }
}

/// How one week was filled.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekResolution {
    pub week: u32,
    pub severity: Severity,
    pub scope: TrainingScope,
    /// Rows filled
    pub rows: usize,
    pub training_rows: usize,
    /// NaN when the scope was too small to cross-validate
    pub cv_score: f64,
    pub params: ForestParams,
}

/// Missing rows left unfilled, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSpan {
    pub week: u32,
    pub span: MissingSpan,
    pub reason: FillError,
}

/// Summary of an imputation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationReport {
    pub status: ImputationStatus,
    /// Rows filled across all weeks
    pub filled: usize,
    pub resolutions: Vec<WeekResolution>,
    pub unresolved: Vec<UnresolvedSpan>,
}

impl ImputationReport {
    fn new() -> Self {
        Self {
            status: ImputationStatus::NothingToDo,
            filled: 0,
            resolutions: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    /// Rows left unfilled.
    pub fn unresolved_rows(&self) -> usize {
        self.unresolved.iter().map(|u| u.span.rows).sum()
    }

    fn mark_unresolved(&mut self, grid: &Grid, group: &WeekGroup, reason: FillError) {
        for span in missing_spans(grid, &group.missing) {
            warn!("Unresolved week {} span {}: {}", group.week, span, reason);
            self.unresolved.push(UnresolvedSpan {
                week: group.week,
                span,
                reason: reason.clone(),
            });
        }
    }
}

/// Fill the missing rows of the configured window.
///
/// Calendar features (and `value_prev` for the autoregressive feature set)
/// must already be derived. Weeks whose training scope is empty are reported
/// as unresolved spans; other failures abort the run.
pub fn impute(grid: &mut Grid, config: &FillConfig) -> Result<ImputationReport> {
    let window = grid.window(config.window.start, config.window.end);
    if window.is_empty() {
        return Err(FillError::NoDataInRange {
            start: config.window.start.unwrap_or_else(|| grid.start()),
            end: config.window.end.unwrap_or_else(|| grid.end()),
        });
    }

    let partition = partition_gaps(grid, window.clone(), config.severity_threshold);
    let mut report = ImputationReport::new();

    if partition.is_empty() {
        info!("No missing values to predict");
        return Ok(report);
    }

    info!(
        "{} missing rows: {} low-severity and {} high-severity weeks",
        partition.total_missing(),
        partition.low.len(),
        partition.high.len()
    );

    let present: Vec<usize> = window
        .clone()
        .filter(|&i| !grid.rows()[i].is_missing())
        .collect();

    let mut deferred: Vec<&WeekGroup> = Vec::new();
    for group in &partition.low {
        let scope_rows: Vec<usize> = present
            .iter()
            .copied()
            .filter(|&i| week_of(grid, i) == Some(group.week))
            .collect();

        if scope_rows.is_empty() {
            if config.low_severity_fallback {
                info!(
                    "Week {} has no present rows, retrying from adjacent weeks",
                    group.week
                );
                deferred.push(group);
            } else {
                let reason = no_training_rows(grid, group, TrainingScope::Week { week: group.week });
                report.mark_unresolved(grid, group, reason);
            }
            continue;
        }

        resolve(
            grid,
            group,
            TrainingScope::Week { week: group.week },
            &scope_rows,
            config,
            &mut report,
        )?;
    }

    // pools for the high-severity pass include the low-severity fills
    let pool: Vec<usize> = window
        .clone()
        .filter(|&i| grid.rows()[i].merged_value().is_some())
        .collect();
    let month_pool: Vec<usize> = (0..grid.len())
        .filter(|&i| grid.rows()[i].merged_value().is_some())
        .collect();

    // deferred low-severity weeks look past the weeks with gaps
    let high = partition
        .high
        .iter()
        .map(|g| (g, partition.adjacent_weeks(g.week)));
    let fallback = deferred.into_iter().map(|g| (g, neighbour_weeks(g.week)));

    for (group, (prev, next)) in high.chain(fallback) {
        let (scope, scope_rows) = if partition.is_high(next) {
            let rows: Vec<usize> = month_pool
                .iter()
                .copied()
                .filter(|&i| month_of(grid, i) == Some(group.month))
                .collect();
            (TrainingScope::Month { month: group.month }, rows)
        } else {
            let prior_month = (config.include_prior_month && group.month > 1).then(|| group.month - 1);
            let rows: BTreeSet<usize> = pool
                .iter()
                .copied()
                .filter(|&i| {
                    let week = week_of(grid, i);
                    week == Some(prev)
                        || week == Some(next)
                        || (prior_month.is_some() && month_of(grid, i) == prior_month)
                })
                .collect();
            (
                TrainingScope::AdjacentWeeks {
                    prev,
                    next,
                    prior_month,
                },
                rows.into_iter().collect(),
            )
        };

        resolve(grid, group, scope, &scope_rows, config, &mut report)?;
    }

    report.status = if report.unresolved.is_empty() {
        ImputationStatus::Completed
    } else {
        ImputationStatus::Partial
    };

    info!(
        "Filled {} rows in {} weeks, {} rows unresolved",
        report.filled,
        report.resolutions.len(),
        report.unresolved_rows()
    );

    Ok(report)
}

fn neighbour_weeks(week: u32) -> (u32, u32) {
    let prev = if week > 1 { week - 1 } else { week };
    let next = if week < 53 { week + 1 } else { week };
    (prev, next)
}

fn week_of(grid: &Grid, idx: usize) -> Option<u32> {
    grid.rows()[idx].features.map(|f| f.week_of_year)
}

fn month_of(grid: &Grid, idx: usize) -> Option<u32> {
    grid.rows()[idx].features.map(|f| f.month)
}

fn no_training_rows(grid: &Grid, group: &WeekGroup, scope: TrainingScope) -> FillError {
    let first = grid.rows()[group.missing[0]].timestamp;
    let last = grid.rows()[group.missing[group.missing.len() - 1]].timestamp;
    FillError::insufficient(
        format!(
            "week {} ({} .. {}) from {}",
            group.week, first, last, scope
        ),
        1,
        0,
    )
}

/// Train on `scope_rows` and fill the week, recording failures that only
/// affect this week.
fn resolve(
    grid: &mut Grid,
    group: &WeekGroup,
    scope: TrainingScope,
    scope_rows: &[usize],
    config: &FillConfig,
    report: &mut ImputationReport,
) -> Result<()> {
    match fit_and_fill(grid, group, scope, scope_rows, config) {
        Ok(resolution) => {
            info!(
                "Week {} ({} severity): filled {} rows from {} ({} training rows, cv {:.4})",
                resolution.week,
                resolution.severity,
                resolution.rows,
                resolution.scope,
                resolution.training_rows,
                resolution.cv_score
            );
            report.filled += resolution.rows;
            report.resolutions.push(resolution);
            Ok(())
        }
        Err(e) if !e.is_fatal() => {
            report.mark_unresolved(grid, group, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn fit_and_fill(
    grid: &mut Grid,
    group: &WeekGroup,
    scope: TrainingScope,
    scope_rows: &[usize],
    config: &FillConfig,
) -> Result<WeekResolution> {
    if scope_rows.is_empty() {
        return Err(no_training_rows(grid, group, scope));
    }

    let x = feature_matrix(grid, scope_rows, config.feature_set)?;
    let y = target_vector(grid, scope_rows)?;
    let model = train_regressor(&x, &y, &config.search)?;

    let x_missing = feature_matrix(grid, &group.missing, config.feature_set)?;
    let predicted = model.predict(&x_missing)?;

    let at = Local::now().naive_local();
    for (&idx, &value) in group.missing.iter().zip(predicted.iter()) {
        grid.record_forecast(idx, value, at)?;
    }

    Ok(WeekResolution {
        week: group.week,
        severity: group.severity,
        scope,
        rows: group.missing.len(),
        training_rows: model.n_train(),
        cv_score: model.cv_score(),
        params: model.params().clone(),
    })
}
