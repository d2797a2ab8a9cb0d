//! Calendar and autoregressive features for grid rows.

use crate::error::{FillError, Result};
use crate::fill::fill_interpolate;
use crate::grid::{Grid, Reading};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Calendar feature names, in matrix column order.
pub const CALENDAR_FEATURES: [&str; 9] = [
    "year",
    "month",
    "day",
    "hour",
    "minute",
    "day_of_week",
    "day_of_year",
    "week_of_year",
    "days_in_month",
];

/// Name of the autoregressive column.
pub const VALUE_PREV: &str = "wl_up_prev";

/// Calendar components of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub day_of_year: u32,
    /// ISO 8601 week number
    pub week_of_year: u32,
    pub days_in_month: u32,
}

impl CalendarFeatures {
    pub fn from_timestamp(ts: NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
            minute: ts.minute(),
            day_of_week: ts.weekday().num_days_from_monday(),
            day_of_year: ts.ordinal(),
            week_of_year: ts.iso_week().week(),
            days_in_month: days_in_month(ts.year(), ts.month()),
        }
    }

    pub fn to_array(&self) -> [f64; 9] {
        [
            self.year as f64,
            self.month as f64,
            self.day as f64,
            self.hour as f64,
            self.minute as f64,
            self.day_of_week as f64,
            self.day_of_year as f64,
            self.week_of_year as f64,
            self.days_in_month as f64,
        ]
    }
}

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

/// Columns fed to the regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSet {
    /// Calendar components only
    #[default]
    Calendar,
    /// Calendar components plus the preceding value
    Autoregressive,
}

impl FeatureSet {
    pub fn names(self) -> Vec<&'static str> {
        let mut names = CALENDAR_FEATURES.to_vec();
        if self == FeatureSet::Autoregressive {
            names.push(VALUE_PREV);
        }
        names
    }

    pub fn width(self) -> usize {
        match self {
            FeatureSet::Calendar => CALENDAR_FEATURES.len(),
            FeatureSet::Autoregressive => CALENDAR_FEATURES.len() + 1,
        }
    }
}

/// Attach calendar features to every grid row.
///
/// Features are a pure function of the timestamp, so calling this again on a
/// featured grid leaves it unchanged.
pub fn derive_calendar(grid: &mut Grid) {
    for row in grid.rows_mut() {
        row.features = Some(CalendarFeatures::from_timestamp(row.timestamp));
    }
}

/// Derive `value_prev` for every grid row.
///
/// With an auxiliary station, each auxiliary reading is shifted forward by
/// `lag` and joined on timestamp. Without one, the observed series is shifted
/// by one grid step. Remaining gaps are linearly interpolated.
pub fn derive_value_prev(grid: &mut Grid, auxiliary: Option<&[Reading]>, lag: Duration) -> Result<()> {
    let raw: Vec<Option<f64>> = match auxiliary {
        Some(readings) => {
            let shifted: HashMap<NaiveDateTime, f64> = readings
                .iter()
                .rev()
                .map(|r| (r.timestamp + lag, r.value))
                .collect();
            grid.rows()
                .iter()
                .map(|row| shifted.get(&row.timestamp).copied())
                .collect()
        }
        None => std::iter::once(None)
            .chain(grid.rows().iter().map(|r| r.value))
            .take(grid.len())
            .collect(),
    };

    let filled = fill_interpolate(&raw).ok_or_else(|| {
        let source = if auxiliary.is_some() {
            "auxiliary station"
        } else {
            "lagged primary series"
        };
        FillError::insufficient(
            format!(
                "{} from {} between {} and {}",
                VALUE_PREV,
                source,
                grid.start(),
                grid.end()
            ),
            1,
            0,
        )
    })?;

    for (row, v) in grid.rows_mut().iter_mut().zip(filled) {
        row.value_prev = Some(v);
    }
    Ok(())
}

/// Feature matrix for the given grid rows, one row per index.
pub fn feature_matrix(grid: &Grid, rows: &[usize], set: FeatureSet) -> Result<Array2<f64>> {
    let width = set.width();
    let mut data = Vec::with_capacity(rows.len() * width);

    for &idx in rows {
        let row = grid.rows().get(idx).ok_or_else(|| {
            FillError::InvalidInput(format!("Row {} is outside the grid", idx))
        })?;
        let cal = row.features.ok_or_else(|| {
            FillError::InvalidInput(format!(
                "Calendar features not derived for row at {}",
                row.timestamp
            ))
        })?;
        data.extend_from_slice(&cal.to_array());

        if set == FeatureSet::Autoregressive {
            let prev = row.value_prev.ok_or_else(|| {
                FillError::InvalidInput(format!(
                    "{} not derived for row at {}",
                    VALUE_PREV, row.timestamp
                ))
            })?;
            data.push(prev);
        }
    }

    Array2::from_shape_vec((rows.len(), width), data)
        .map_err(|e| FillError::ComputationError(e.to_string()))
}

/// Merged values (observed or already filled) for the given rows.
pub fn target_vector(grid: &Grid, rows: &[usize]) -> Result<Array1<f64>> {
    rows.iter()
        .map(|&idx| {
            grid.rows()
                .get(idx)
                .and_then(|row| row.merged_value())
                .ok_or_else(|| {
                    FillError::InvalidInput(format!("Row {} has no value to train on", idx))
                })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn grid(values: &[Option<f64>]) -> Grid {
        let readings: Vec<Reading> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading {
                timestamp: ts(5, 6, 0, 0) + Duration::minutes(15 * i as i64),
                value: v.unwrap_or(200.0),
                code: None,
            })
            .collect();
        let mut g = Grid::from_readings(&readings, Duration::minutes(15)).unwrap();
        for (row, v) in g.rows_mut().iter_mut().zip(values) {
            row.value = *v;
        }
        g
    }

    #[test]
    fn test_calendar_features() {
        let f = CalendarFeatures::from_timestamp(ts(2, 29, 13, 45));
        assert_eq!(f.year, 2024);
        assert_eq!(f.month, 2);
        assert_eq!(f.day, 29);
        assert_eq!(f.hour, 13);
        assert_eq!(f.minute, 45);
        assert_eq!(f.day_of_week, 3);
        assert_eq!(f.day_of_year, 60);
        assert_eq!(f.week_of_year, 9);
        assert_eq!(f.days_in_month, 29);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        let dec31 = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(CalendarFeatures::from_timestamp(dec31).week_of_year, 1);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn test_derive_calendar_is_idempotent() {
        let mut g = grid(&[Some(200.0), None, Some(202.0)]);
        derive_calendar(&mut g);
        let once = g.clone();
        derive_calendar(&mut g);
        assert_eq!(g, once);
        assert!(g.rows().iter().all(|r| r.features.is_some()));
    }

    #[test]
    fn test_value_prev_from_lagged_series() {
        let mut g = grid(&[Some(200.0), None, Some(204.0), Some(206.0)]);
        derive_value_prev(&mut g, None, Duration::zero()).unwrap();

        let prev: Vec<f64> = g.rows().iter().map(|r| r.value_prev.unwrap()).collect();
        // shifted: [None, 200, None, 204] then interpolated
        assert_eq!(prev, vec![200.0, 200.0, 202.0, 204.0]);
    }

    #[test]
    fn test_value_prev_from_auxiliary_station() {
        let mut g = grid(&[Some(200.0), Some(201.0), Some(202.0), Some(203.0)]);
        let aux = vec![
            Reading {
                timestamp: ts(5, 5, 0, 0),
                value: 300.0,
                code: None,
            },
            Reading {
                timestamp: ts(5, 5, 0, 30),
                value: 310.0,
                code: None,
            },
        ];
        derive_value_prev(&mut g, Some(&aux), Duration::days(1)).unwrap();

        let prev: Vec<f64> = g.rows().iter().map(|r| r.value_prev.unwrap()).collect();
        assert_eq!(prev, vec![300.0, 305.0, 310.0, 310.0]);
    }

    #[test]
    fn test_value_prev_without_overlap_fails() {
        let mut g = grid(&[Some(200.0), Some(201.0)]);
        let aux = vec![Reading {
            timestamp: ts(1, 1, 0, 0),
            value: 300.0,
            code: None,
        }];
        let err = derive_value_prev(&mut g, Some(&aux), Duration::zero()).unwrap_err();
        assert!(matches!(err, FillError::InsufficientData { .. }));
    }

    #[test]
    fn test_feature_matrix_shape() {
        let mut g = grid(&[Some(200.0), None, Some(202.0)]);
        assert!(feature_matrix(&g, &[0], FeatureSet::Calendar).is_err());

        derive_calendar(&mut g);
        let x = feature_matrix(&g, &[0, 2], FeatureSet::Calendar).unwrap();
        assert_eq!(x.dim(), (2, 9));
        assert_eq!(x[[1, 4]], 30.0);

        assert!(feature_matrix(&g, &[0], FeatureSet::Autoregressive).is_err());
        derive_value_prev(&mut g, None, Duration::zero()).unwrap();
        let x = feature_matrix(&g, &[1], FeatureSet::Autoregressive).unwrap();
        assert_eq!(x.dim(), (1, 10));
        assert_eq!(x[[0, 9]], 200.0);
    }

    #[test]
    fn test_target_vector_requires_values() {
        let g = grid(&[Some(200.0), None, Some(202.0)]);
        assert_eq!(target_vector(&g, &[0, 2]).unwrap().to_vec(), vec![200.0, 202.0]);
        assert!(target_vector(&g, &[1]).is_err());
    }

    #[test]
    fn test_feature_set_names() {
        assert_eq!(FeatureSet::Calendar.names().len(), 9);
        assert_eq!(FeatureSet::Autoregressive.names().last(), Some(&VALUE_PREV));
    }
}
