//! Week-bucketed classification of missing rows.
//!
//! Missing rows inside a window are grouped by ISO week number. A week with
//! at most `threshold` missing rows is low-severity, otherwise high-severity.
//! Week numbers carry no year, so windows crossing a year boundary merge
//! weeks with the same number.

use crate::grid::Grid;
use chrono::{Datelike, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// One day of 15-minute samples.
pub const DEFAULT_SEVERITY_THRESHOLD: usize = 288;

/// Severity class of a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Missing rows of one ISO week.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekGroup {
    pub week: u32,
    /// Calendar month of the first missing row
    pub month: u32,
    pub severity: Severity,
    /// Grid indices in ascending order
    pub missing: Vec<usize>,
}

/// Disjoint low- and high-severity week groups.
#[derive(Debug, Clone, PartialEq)]
pub struct GapPartition {
    pub low: Vec<WeekGroup>,
    pub high: Vec<WeekGroup>,
    threshold: usize,
    counts: BTreeMap<u32, usize>,
}

impl GapPartition {
    pub fn is_empty(&self) -> bool {
        self.low.is_empty() && self.high.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Missing rows in `week`, zero for weeks without gaps.
    pub fn missing_count(&self, week: u32) -> usize {
        self.counts.get(&week).copied().unwrap_or(0)
    }

    pub fn total_missing(&self) -> usize {
        self.counts.values().sum()
    }

    /// Smallest and largest week number with missing rows.
    pub fn week_bounds(&self) -> Option<(u32, u32)> {
        let min = *self.counts.keys().next()?;
        let max = *self.counts.keys().next_back()?;
        Some((min, max))
    }

    /// Whether `week` has more missing rows than the threshold.
    pub fn is_high(&self, week: u32) -> bool {
        self.missing_count(week) > self.threshold
    }

    /// Weeks adjacent to `week`, clamped to the weeks with gaps.
    pub fn adjacent_weeks(&self, week: u32) -> (u32, u32) {
        match self.week_bounds() {
            Some((min, max)) => {
                let prev = if week > min { week - 1 } else { week };
                let next = if week < max { week + 1 } else { week };
                (prev, next)
            }
            None => (week, week),
        }
    }
}

/// ISO week number of a timestamp.
pub fn iso_week(ts: NaiveDateTime) -> u32 {
    ts.iso_week().week()
}

/// Classify the missing rows of `window` by week.
///
/// Weeks keep the order in which they first appear.
pub fn partition_gaps(grid: &Grid, window: Range<usize>, threshold: usize) -> GapPartition {
    let mut order: Vec<u32> = Vec::new();
    let mut groups: BTreeMap<u32, (u32, Vec<usize>)> = BTreeMap::new();

    for idx in window {
        let row = &grid.rows()[idx];
        if !row.is_missing() {
            continue;
        }
        let week = row
            .features
            .map_or_else(|| iso_week(row.timestamp), |f| f.week_of_year);
        groups
            .entry(week)
            .or_insert_with(|| {
                order.push(week);
                (row.timestamp.month(), Vec::new())
            })
            .1
            .push(idx);
    }

    let counts: BTreeMap<u32, usize> = groups.iter().map(|(w, (_, m))| (*w, m.len())).collect();

    let mut low = Vec::new();
    let mut high = Vec::new();
    for week in order {
        let Some((month, missing)) = groups.remove(&week) else {
            continue;
        };
        let severity = if missing.len() <= threshold {
            Severity::Low
        } else {
            Severity::High
        };
        let group = WeekGroup {
            week,
            month,
            severity,
            missing,
        };
        match severity {
            Severity::Low => low.push(group),
            Severity::High => high.push(group),
        }
    }

    GapPartition {
        low,
        high,
        threshold,
        counts,
    }
}

/// A maximal run of consecutive grid rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub rows: usize,
}

impl fmt::Display for MissingSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {} ({} rows)", self.start, self.end, self.rows)
    }
}

/// Collapse grid indices into contiguous spans.
pub fn missing_spans(grid: &Grid, rows: &[usize]) -> Vec<MissingSpan> {
    let mut sorted = rows.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut spans = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return spans;
    };

    let (mut run_start, mut run_end) = (first, first);
    for idx in iter {
        if idx == run_end + 1 {
            run_end = idx;
            continue;
        }
        spans.push(span(grid, run_start, run_end));
        run_start = idx;
        run_end = idx;
    }
    spans.push(span(grid, run_start, run_end));
    spans
}

fn span(grid: &Grid, start: usize, end: usize) -> MissingSpan {
    MissingSpan {
        start: grid.rows()[start].timestamp,
        end: grid.rows()[end].timestamp,
        rows: end - start + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Reading;
    use chrono::{Duration, NaiveDate};

    /// A 15-minute grid over May 2024 with the listed index ranges blanked.
    fn may_grid(blank: &[Range<usize>]) -> Grid {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let readings: Vec<Reading> = (0..31 * 96)
            .map(|i| Reading {
                timestamp: start + Duration::minutes(15 * i as i64),
                value: 200.0,
                code: None,
            })
            .collect();
        let mut grid = Grid::from_readings(&readings, Duration::minutes(15)).unwrap();
        for r in blank {
            for idx in r.clone() {
                grid.rows_mut()[idx].value = None;
            }
        }
        grid
    }

    // Week 18 is May 1-5 (480 rows), week 19 starts at index 480.
    const WEEK19: usize = 480;
    const WEEK20: usize = WEEK19 + 672;

    #[test]
    fn test_no_missing_rows() {
        let grid = may_grid(&[]);
        let p = partition_gaps(&grid, 0..grid.len(), DEFAULT_SEVERITY_THRESHOLD);
        assert!(p.is_empty());
        assert_eq!(p.week_bounds(), None);
    }

    #[test]
    fn test_threshold_boundary() {
        let grid = may_grid(&[WEEK19..WEEK19 + 288, WEEK20..WEEK20 + 289]);
        let p = partition_gaps(&grid, 0..grid.len(), DEFAULT_SEVERITY_THRESHOLD);

        assert_eq!(p.low.len(), 1);
        assert_eq!(p.low[0].week, 19);
        assert_eq!(p.low[0].severity, Severity::Low);
        assert_eq!(p.high.len(), 1);
        assert_eq!(p.high[0].week, 20);
        assert!(p.is_high(20));
        assert!(!p.is_high(19));
    }

    #[test]
    fn test_partition_disjoint_and_covering() {
        let blank = [5..8, WEEK19 + 100..WEEK19 + 500, WEEK20 + 10..WEEK20 + 20, 2900..2976];
        let grid = may_grid(&blank);
        let p = partition_gaps(&grid, 0..grid.len(), 50);

        let mut all: Vec<usize> = p
            .low
            .iter()
            .chain(p.high.iter())
            .flat_map(|g| g.missing.clone())
            .collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);

        let expected: Vec<usize> = blank.iter().flat_map(|r| r.clone()).collect();
        assert_eq!(all, expected);
        assert_eq!(p.total_missing(), expected.len());
    }

    #[test]
    fn test_window_restricts_partition() {
        let grid = may_grid(&[5..8, WEEK19..WEEK19 + 10]);
        let p = partition_gaps(&grid, WEEK19..grid.len(), DEFAULT_SEVERITY_THRESHOLD);
        assert_eq!(p.low.len(), 1);
        assert_eq!(p.low[0].week, 19);
        assert_eq!(p.missing_count(18), 0);
    }

    #[test]
    fn test_adjacent_weeks_are_clamped() {
        let grid = may_grid(&[5..8, WEEK20..WEEK20 + 3]);
        let p = partition_gaps(&grid, 0..grid.len(), DEFAULT_SEVERITY_THRESHOLD);
        assert_eq!(p.week_bounds(), Some((18, 20)));
        assert_eq!(p.adjacent_weeks(18), (18, 19));
        assert_eq!(p.adjacent_weeks(19), (18, 20));
        assert_eq!(p.adjacent_weeks(20), (19, 20));
    }

    #[test]
    fn test_missing_spans() {
        let grid = may_grid(&[]);
        let spans = missing_spans(&grid, &[7, 3, 4, 5, 9, 4]);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].rows, 3);
        assert_eq!(spans[0].start, grid.rows()[3].timestamp);
        assert_eq!(spans[0].end, grid.rows()[5].timestamp);
        assert_eq!(spans[1].rows, 1);
        assert_eq!(spans[2].start, grid.rows()[9].timestamp);
        assert!(missing_spans(&grid, &[]).is_empty());
    }
}
