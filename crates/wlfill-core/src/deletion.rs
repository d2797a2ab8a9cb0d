//! Synthetic blanking of a time range for accuracy evaluation.

use crate::error::{FillError, Result};
use crate::grid::Grid;
use chrono::NaiveDateTime;
use log::{info, warn};
use std::ops::Range;

/// Rows blanked by [`delete_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub rows: usize,
}

/// Blank the observed values of rows in `scope` with
/// `start <= timestamp <= end`.
///
/// `scope` is the range of grid rows being processed; matches outside it are
/// not touched and the guard is measured against `scope.len()`. Rows already
/// missing count towards the match but stay missing. Fails with
/// `NoDataInRange` when no row in scope matches and with `ExcessiveDeletion`
/// when more than `max_fraction` of the scope would be blanked; the grid is
/// left untouched in both cases.
pub fn delete_range(
    grid: &mut Grid,
    scope: Range<usize>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    max_fraction: f64,
) -> Result<DeletionOutcome> {
    let matched = grid.window(Some(start), Some(end));
    let lo = matched.start.max(scope.start);
    let hi = matched.end.min(scope.end).max(lo);
    let window = lo..hi;
    let rows = window.len();

    if rows == 0 {
        warn!("No data in scope between {} and {}", start, end);
        return Err(FillError::NoDataInRange { start, end });
    }

    let total = scope.len();
    if rows as f64 > max_fraction * total as f64 {
        warn!(
            "Refusing to delete {} of {} rows in scope between {} and {}",
            rows, total, start, end
        );
        return Err(FillError::ExcessiveDeletion {
            start,
            end,
            rows,
            total,
            max_fraction,
        });
    }

    for row in &mut grid.rows_mut()[window] {
        row.value = None;
    }
    info!("Deleted {} rows between {} and {}", rows, start, end);

    Ok(DeletionOutcome { start, end, rows })
}
