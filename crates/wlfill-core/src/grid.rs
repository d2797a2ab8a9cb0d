//! Regularisation of raw readings onto a fixed-interval time axis.
//!
//! Raw rows are parsed and filtered by [`clean_readings`], then placed on a
//! [`Grid`] spanning the first to the last valid timestamp. Every grid
//! boundary appears exactly once; absent readings are rows with no value.

use crate::error::{FillError, Result};
use crate::features::CalendarFeatures;
use crate::fill::fill_both;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use log::warn;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::{Range, RangeInclusive};

/// Output format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// A row of the input table before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    pub datetime: String,
    pub value: Option<f64>,
    pub code: Option<String>,
}

impl RawRecord {
    pub fn new(datetime: impl Into<String>, value: Option<f64>, code: Option<&str>) -> Self {
        Self {
            datetime: datetime.into(),
            value,
            code: code.map(str::to_string),
        }
    }
}

/// A validated reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub code: Option<String>,
}

/// Row counts from cleaning and gridding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleaningStats {
    pub total: usize,
    pub bad_timestamp: usize,
    pub missing_value: usize,
    /// Zero or outside the valid range
    pub out_of_range: usize,
    /// Later readings on an already occupied timestamp
    pub duplicate: usize,
    /// Readings between interval boundaries
    pub off_grid: usize,
}

impl CleaningStats {
    /// Rows that made it onto the grid.
    pub fn kept(&self) -> usize {
        self.total
            - self.bad_timestamp
            - self.missing_value
            - self.out_of_range
            - self.duplicate
            - self.off_grid
    }
}

/// Parse a timestamp in any of the accepted layouts.
///
/// RFC 3339 values keep their wall-clock time and drop the offset. Bare dates
/// are placed at midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Drop rows with unparseable timestamps and implausible values.
///
/// A value is implausible when absent, NaN, zero or outside `valid_range`.
/// Fails with `MalformedInput` when no row survives.
pub fn clean_readings(
    raw: &[RawRecord],
    valid_range: &RangeInclusive<f64>,
) -> Result<(Vec<Reading>, CleaningStats)> {
    let mut stats = CleaningStats {
        total: raw.len(),
        ..Default::default()
    };
    let mut readings = Vec::with_capacity(raw.len());

    for record in raw {
        let Some(timestamp) = parse_timestamp(&record.datetime) else {
            stats.bad_timestamp += 1;
            continue;
        };
        let value = match record.value {
            Some(v) if !v.is_nan() => v,
            _ => {
                stats.missing_value += 1;
                continue;
            }
        };
        if value == 0.0 || !valid_range.contains(&value) {
            stats.out_of_range += 1;
            continue;
        }
        readings.push(Reading {
            timestamp,
            value,
            code: record.code.clone(),
        });
    }

    if readings.is_empty() {
        return Err(FillError::MalformedInput {
            rows: stats.total,
            reason: format!(
                "no valid readings ({} bad timestamps, {} missing values, {} out of range {:?})",
                stats.bad_timestamp, stats.missing_value, stats.out_of_range, valid_range
            ),
        });
    }

    if stats.total > readings.len() {
        warn!(
            "Dropped {} of {} rows during cleaning ({} bad timestamps, {} missing values, {} out of range)",
            stats.total - readings.len(),
            stats.total,
            stats.bad_timestamp,
            stats.missing_value,
            stats.out_of_range
        );
    }

    Ok((readings, stats))
}

/// Clean `raw` and place the surviving readings on a grid.
pub fn normalize(
    raw: &[RawRecord],
    interval: Duration,
    valid_range: &RangeInclusive<f64>,
) -> Result<(Grid, CleaningStats)> {
    let (readings, mut stats) = clean_readings(raw, valid_range)?;
    let (grid, duplicate, off_grid) = Grid::place(&readings, interval)?;
    stats.duplicate = duplicate;
    stats.off_grid = off_grid;
    Ok((grid, stats))
}

/// Most common positive spacing between timestamps.
pub fn detect_interval(timestamps: &[NaiveDateTime]) -> Result<Duration> {
    if timestamps.len() < 2 {
        return Err(FillError::insufficient(
            "interval detection",
            2,
            timestamps.len(),
        ));
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for w in sorted.windows(2) {
        let diff = (w[1] - w[0]).num_seconds();
        if diff > 0 {
            *counts.entry(diff).or_insert(0) += 1;
        }
    }

    // ties resolve to the shorter interval
    counts
        .into_iter()
        .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then(db.cmp(da)))
        .map(|(diff, _)| Duration::seconds(diff))
        .ok_or_else(|| FillError::InvalidInput("Could not detect interval".to_string()))
}

/// One grid slot.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub timestamp: NaiveDateTime,
    /// Observed value; never overwritten by a fill
    pub value: Option<f64>,
    pub code: Option<String>,
    pub features: Option<CalendarFeatures>,
    /// Autoregressive input, when derived
    pub value_prev: Option<f64>,
    /// Predicted value for a missing slot
    pub forecast: Option<f64>,
    /// When the forecast was computed
    pub filled_at: Option<NaiveDateTime>,
}

impl GridRow {
    fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            value: None,
            code: None,
            features: None,
            value_prev: None,
            forecast: None,
            filled_at: None,
        }
    }

    /// Observed value where present, forecast otherwise.
    pub fn merged_value(&self) -> Option<f64> {
        self.value.or(self.forecast)
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }
}

/// A complete fixed-interval time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    interval: Duration,
    rows: Vec<GridRow>,
}

impl Grid {
    /// Place readings on a grid from the first to the last timestamp.
    pub fn from_readings(readings: &[Reading], interval: Duration) -> Result<Self> {
        Self::place(readings, interval).map(|(grid, _, _)| grid)
    }

    fn place(readings: &[Reading], interval: Duration) -> Result<(Self, usize, usize)> {
        let step = interval.num_seconds();
        if step <= 0 {
            return Err(FillError::invalid_parameter(
                "interval",
                interval,
                "must be at least one second",
            ));
        }

        let (Some(first), Some(last)) = (
            readings.iter().map(|r| r.timestamp).min(),
            readings.iter().map(|r| r.timestamp).max(),
        ) else {
            return Err(FillError::MalformedInput {
                rows: 0,
                reason: "no readings to grid".to_string(),
            });
        };

        let len = ((last - first).num_seconds() / step) as usize + 1;
        let mut rows: Vec<GridRow> = (0..len)
            .map(|i| GridRow::empty(first + Duration::seconds(step * i as i64)))
            .collect();

        let mut duplicate = 0;
        let mut off_grid = 0;
        for reading in readings {
            let offset = (reading.timestamp - first).num_seconds();
            if offset % step != 0 || (reading.timestamp - first).subsec_nanos() != 0 {
                off_grid += 1;
                continue;
            }
            let row = &mut rows[(offset / step) as usize];
            if row.value.is_some() {
                duplicate += 1;
                continue;
            }
            row.value = Some(reading.value);
            row.code = reading.code.clone();
        }

        if duplicate + off_grid > 0 {
            warn!(
                "Ignored {} duplicate and {} off-grid readings while gridding at {} s",
                duplicate, off_grid, step
            );
        }

        Ok((Self { interval, rows }, duplicate, off_grid))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [GridRow] {
        &mut self.rows
    }

    pub fn start(&self) -> NaiveDateTime {
        self.rows[0].timestamp
    }

    pub fn end(&self) -> NaiveDateTime {
        self.rows[self.rows.len() - 1].timestamp
    }

    /// Indices of rows with `start <= timestamp <= end`; open bounds extend to
    /// the grid edges.
    pub fn window(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Range<usize> {
        let step = self.interval.num_seconds();
        let origin = self.start();

        let lo = match start {
            Some(s) if s > origin => {
                let secs = (s - origin).num_seconds();
                ((secs + step - 1) / step) as usize
            }
            _ => 0,
        };
        let hi = match end {
            Some(e) if e < origin => 0,
            Some(e) => ((e - origin).num_seconds() / step + 1) as usize,
            None => self.rows.len(),
        };

        let hi = hi.min(self.rows.len());
        lo.min(hi)..hi
    }

    /// Forward- then backward-fill station codes across the grid.
    pub fn fill_codes(&mut self) {
        let codes: Vec<Option<String>> = self.rows.iter().map(|r| r.code.clone()).collect();
        for (row, code) in self.rows.iter_mut().zip(fill_both(&codes)) {
            row.code = code;
        }
    }

    /// `(timestamp, observed value)` pairs.
    pub fn observed_series(&self) -> Vec<(NaiveDateTime, Option<f64>)> {
        self.rows.iter().map(|r| (r.timestamp, r.value)).collect()
    }

    /// `(timestamp, merged value)` pairs.
    pub fn merged_series(&self) -> Vec<(NaiveDateTime, Option<f64>)> {
        self.rows
            .iter()
            .map(|r| (r.timestamp, r.merged_value()))
            .collect()
    }

    /// Write a prediction into a missing slot. Each slot takes one forecast.
    pub fn record_forecast(&mut self, idx: usize, value: f64, at: NaiveDateTime) -> Result<()> {
        let row = self.rows.get_mut(idx).ok_or_else(|| {
            FillError::InvalidInput(format!("Row {} is outside the grid", idx))
        })?;
        if row.value.is_some() {
            return Err(FillError::InvalidInput(format!(
                "Row at {} has an observed value and cannot be filled",
                row.timestamp
            )));
        }
        if row.forecast.is_some() {
            return Err(FillError::ComputationError(format!(
                "Row at {} was already filled",
                row.timestamp
            )));
        }
        row.forecast = Some(value);
        row.filled_at = Some(at);
        Ok(())
    }

    /// Flatten the grid into output rows.
    pub fn to_records(&self) -> Vec<OutputRecord> {
        self.rows
            .iter()
            .map(|row| {
                let cal = row
                    .features
                    .unwrap_or_else(|| CalendarFeatures::from_timestamp(row.timestamp));
                OutputRecord {
                    datetime: row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    code: row.code.clone(),
                    year: cal.year,
                    month: cal.month,
                    day: cal.day,
                    hour: cal.hour,
                    minute: cal.minute,
                    day_of_week: cal.day_of_week,
                    day_of_year: cal.day_of_year,
                    week_of_year: cal.week_of_year,
                    days_in_month: cal.days_in_month,
                    wl_up: row.value,
                    wl_up_prev: row.value_prev,
                    wl_forecast: row.forecast,
                    timestamp: row
                        .filled_at
                        .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                    wl_up2: row.merged_value(),
                }
            })
            .collect()
    }
}

/// One row of the reconstructed table.
///
/// `wl_up` keeps the gaps, `wl_forecast` and `timestamp` record fills, and
/// `wl_up2` merges both. `wl_up_prev` is empty unless the autoregressive
/// feature was derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub datetime: String,
    pub code: Option<String>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub day_of_week: u32,
    pub day_of_year: u32,
    pub week_of_year: u32,
    pub days_in_month: u32,
    pub wl_up: Option<f64>,
    pub wl_up_prev: Option<f64>,
    pub wl_forecast: Option<f64>,
    pub timestamp: Option<String>,
    pub wl_up2: Option<f64>,
}
