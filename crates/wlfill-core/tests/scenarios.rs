//! End-to-end gap-filling scenarios.
//!
//! Each test builds a synthetic 15-minute water-level table, runs it through
//! the public pipeline and checks the reconstructed grid and reports.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::ops::Range;
use wlfill_core::{
    accuracy_report, normalize, partition_gaps, run, FillConfig, FillError, ImputationStatus,
    MaxFeatures, SearchConfig, SearchSpace, Severity, TimeWindow, TrainingScope,
};

// ── Synthetic data generators ────────────────────────────────────────────────

const ROWS_PER_DAY: usize = 96;
const ROWS_PER_WEEK: usize = 672;
/// May 2024 on a 15-minute grid
const MAY_ROWS: usize = 31 * ROWS_PER_DAY;
/// Monday 2024-05-06, first row of ISO week 19
const WEEK19: usize = 5 * ROWS_PER_DAY;
const WEEK20: usize = WEEK19 + ROWS_PER_WEEK;
const WEEK21: usize = WEEK20 + ROWS_PER_WEEK;

fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::minutes(15 * i as i64)
}

fn level(i: usize) -> f64 {
    let phase = 2.0 * std::f64::consts::PI * (i % ROWS_PER_DAY) as f64 / ROWS_PER_DAY as f64;
    240.0 + 35.0 * phase.sin() + 0.005 * i as f64
}

/// Readings for rows `0..n` except those in `gaps`.
fn station_table(n: usize, gaps: &[Range<usize>]) -> Vec<wlfill_core::RawRecord> {
    (0..n)
        .filter(|i| !gaps.iter().any(|g| g.contains(i)))
        .map(|i| {
            wlfill_core::RawRecord::new(
                ts(i).format("%Y-%m-%d %H:%M:%S").to_string(),
                Some(level(i)),
                Some("CPY011"),
            )
        })
        .collect()
}

fn quick_config() -> FillConfig {
    let space = SearchSpace {
        n_estimators: vec![10],
        max_depth: vec![Some(8)],
        min_samples_split: vec![2, 5],
        min_samples_leaf: vec![1],
        max_features: vec![MaxFeatures::All],
        bootstrap: vec![true],
    };
    FillConfig::default().with_search(
        SearchConfig::default()
            .with_space(space)
            .with_n_iter(2)
            .with_folds(3),
    )
}

// ── Grid normalisation ───────────────────────────────────────────────────────

#[test]
fn grid_is_complete_and_evenly_spaced() {
    let records = station_table(3 * ROWS_PER_DAY, &[10..40, 150..151, 200..260]);
    let config = FillConfig::default();
    let (grid, stats) = normalize(&records, config.interval, &config.valid_range).unwrap();

    assert_eq!(grid.len(), 3 * ROWS_PER_DAY);
    assert_eq!(grid.start(), ts(0));
    assert_eq!(grid.end(), ts(3 * ROWS_PER_DAY - 1));
    for pair in grid.rows().windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(15));
    }
    assert_eq!(stats.kept(), 3 * ROWS_PER_DAY - 91);
    assert_eq!(grid.rows().iter().filter(|r| r.is_missing()).count(), 91);
}

#[test]
fn dirty_rows_are_dropped_before_gridding() {
    let mut records = station_table(ROWS_PER_DAY, &[]);
    records[3].value = Some(0.0);
    records[4].value = Some(999.0);
    records[5].datetime = "not a date".to_string();
    records.push(records[0].clone());

    let config = FillConfig::default();
    let (grid, stats) = normalize(&records, config.interval, &config.valid_range).unwrap();

    assert_eq!(stats.out_of_range, 2);
    assert_eq!(stats.bad_timestamp, 1);
    assert_eq!(stats.duplicate, 1);
    assert_eq!(grid.len(), ROWS_PER_DAY);
    assert!(grid.rows()[3].is_missing());
    assert!(grid.rows()[4].is_missing());
    assert!(grid.rows()[5].is_missing());
}

// ── Gap partitioning ─────────────────────────────────────────────────────────

#[test]
fn partition_covers_every_missing_row_once() {
    let gaps = [100..150, WEEK19 + 10..WEEK19 + 400, WEEK21 + 5..WEEK21 + 20];
    let records = station_table(MAY_ROWS, &gaps);
    let config = FillConfig::default();
    let (mut grid, _) = normalize(&records, config.interval, &config.valid_range).unwrap();
    wlfill_core::derive_calendar(&mut grid);

    let partition = partition_gaps(&grid, 0..grid.len(), config.severity_threshold);

    let mut seen: Vec<usize> = partition
        .low
        .iter()
        .chain(partition.high.iter())
        .flat_map(|g| g.missing.iter().copied())
        .collect();
    seen.sort_unstable();
    let expected: Vec<usize> = (0..grid.len()).filter(|&i| grid.rows()[i].is_missing()).collect();
    assert_eq!(seen, expected);

    for group in &partition.low {
        assert_eq!(group.severity, Severity::Low);
        assert!(group.missing.len() <= config.severity_threshold);
    }
    assert_eq!(partition.high.len(), 1);
    assert_eq!(partition.high[0].week, 19);
    assert_eq!(partition.high[0].missing.len(), 390);
}

// ── Imputation ───────────────────────────────────────────────────────────────

#[test]
fn nothing_to_do_on_complete_series() {
    let records = station_table(ROWS_PER_DAY, &[]);
    let outcome = run(&records, None, &quick_config()).unwrap();

    assert_eq!(outcome.imputation.status, ImputationStatus::NothingToDo);
    assert_eq!(outcome.imputation.filled, 0);
    assert!(outcome.grid.rows().iter().all(|r| r.forecast.is_none()));
}

#[test]
fn short_gap_is_filled_from_its_own_week() {
    // one ISO week with three missing samples
    let week: Vec<_> = station_table(WEEK20, &[WEEK19 + 200..WEEK19 + 203])
        .into_iter()
        .skip(WEEK19)
        .collect();
    let outcome = run(&week, None, &quick_config()).unwrap();
    let report = &outcome.imputation;

    assert_eq!(report.status, ImputationStatus::Completed);
    assert_eq!(report.filled, 3);
    assert_eq!(report.resolutions.len(), 1);
    assert_eq!(report.resolutions[0].severity, Severity::Low);
    assert_eq!(report.resolutions[0].scope, TrainingScope::Week { week: 19 });
    assert_eq!(report.resolutions[0].training_rows, ROWS_PER_WEEK - 3);

    for i in 200..203 {
        let row = &outcome.grid.rows()[i];
        let forecast = row.forecast.unwrap();
        assert!((100.0..=450.0).contains(&forecast));
        assert!(row.filled_at.is_some());
        assert_eq!(row.merged_value(), Some(forecast));
    }
}

#[test]
fn surrounded_missing_week_uses_month_scope() {
    let gaps = [
        WEEK19 + 300..WEEK20,
        WEEK20..WEEK21,
        WEEK21..WEEK21 + 320,
    ];
    let records = station_table(MAY_ROWS, &gaps);
    let outcome = run(&records, None, &quick_config()).unwrap();
    let report = &outcome.imputation;

    assert_eq!(report.status, ImputationStatus::Completed);
    assert!(report.unresolved.is_empty());
    assert!(outcome.grid.rows().iter().all(|r| r.merged_value().is_some()));

    let week20 = report.resolutions.iter().find(|r| r.week == 20).unwrap();
    assert_eq!(week20.severity, Severity::High);
    assert_eq!(week20.scope, TrainingScope::Month { month: 5 });
    assert_eq!(week20.rows, ROWS_PER_WEEK);

    // week 19 is followed by a high-severity week as well
    let week19 = report.resolutions.iter().find(|r| r.week == 19).unwrap();
    assert_eq!(week19.scope, TrainingScope::Month { month: 5 });
}

#[test]
fn observed_values_are_never_overwritten() {
    let gaps = [50..60, WEEK20 + 10..WEEK20 + 400];
    let records = station_table(MAY_ROWS, &gaps);
    let outcome = run(&records, None, &quick_config()).unwrap();

    let mut forecasts = 0;
    for (i, row) in outcome.grid.rows().iter().enumerate() {
        let gap = gaps.iter().any(|g| g.contains(&i));
        if gap {
            assert!(row.value.is_none());
            assert!(row.forecast.is_some());
            forecasts += 1;
        } else {
            assert_eq!(row.value, Some(level(i)));
            assert!(row.forecast.is_none());
            assert!(row.filled_at.is_none());
        }
        assert_eq!(row.code.as_deref(), Some("CPY011"));
    }
    assert_eq!(forecasts, outcome.imputation.filled);
}

#[test]
fn filled_rows_cannot_be_filled_again() {
    let records = station_table(ROWS_PER_DAY * 2, &[20..25]);
    let mut outcome = run(&records, None, &quick_config()).unwrap();

    let before = outcome.grid.rows()[21].forecast;
    let err = outcome.grid.record_forecast(21, 200.0, ts(0)).unwrap_err();
    assert!(matches!(err, FillError::ComputationError(_)));
    assert_eq!(outcome.grid.rows()[21].forecast, before);
    let err = outcome.grid.record_forecast(30, 200.0, ts(0)).unwrap_err();
    assert!(matches!(err, FillError::InvalidInput(_)));
}

// ── Deletion and accuracy ────────────────────────────────────────────────────

#[test]
fn deletion_is_scored_against_the_original() {
    let records = station_table(MAY_ROWS, &[]);
    let config = quick_config().with_deletion(ts(WEEK20 + 100), ts(WEEK20 + 159));
    let outcome = run(&records, None, &config).unwrap();

    assert!(outcome.deletion_applied());
    assert_eq!(outcome.imputation.filled, 60);
    let accuracy = outcome.accuracy.unwrap();
    assert_eq!(accuracy.n, MAY_ROWS);
    assert!(accuracy.mse >= 0.0);
    assert!(accuracy.mae < 35.0);
    assert!(accuracy.r2 > 0.5);
}

#[test]
fn excessive_deletion_is_rejected_and_data_untouched() {
    let records = station_table(ROWS_PER_DAY * 10, &[]);
    // 40% of the grid
    let config = quick_config().with_deletion(ts(0), ts(4 * ROWS_PER_DAY - 1));
    let outcome = run(&records, None, &config).unwrap();

    assert!(matches!(
        outcome.deletion,
        Some(Err(FillError::ExcessiveDeletion { .. }))
    ));
    assert!(!outcome.deletion_applied());
    assert!(outcome.grid.rows().iter().all(|r| r.value.is_some()));
    assert_eq!(outcome.imputation.status, ImputationStatus::NothingToDo);
    assert!(outcome.accuracy.is_none());
}

#[test]
fn deletion_outside_the_data_is_rejected() {
    let records = station_table(ROWS_PER_DAY, &[]);
    let config = quick_config().with_deletion(ts(5 * ROWS_PER_DAY), ts(6 * ROWS_PER_DAY));
    let outcome = run(&records, None, &config).unwrap();

    assert!(matches!(
        outcome.deletion,
        Some(Err(FillError::NoDataInRange { .. }))
    ));
    assert!(outcome.accuracy.is_none());
    for (i, row) in outcome.grid.rows().iter().enumerate() {
        assert_eq!(row.value, Some(level(i)));
    }
}

/// Day 11 of a four-week table.
const DAY11: Range<usize> = 10 * ROWS_PER_DAY..11 * ROWS_PER_DAY;

fn day11_window() -> TimeWindow {
    TimeWindow::between(ts(DAY11.start), ts(DAY11.end - 1))
}

#[test]
fn deletion_guard_counts_rows_in_the_window() {
    let records = station_table(28 * ROWS_PER_DAY, &[]);
    // the whole window, a small share of the table
    let config = quick_config()
        .with_window(day11_window())
        .with_deletion(ts(DAY11.start), ts(DAY11.end - 1));
    let outcome = run(&records, None, &config).unwrap();

    assert!(matches!(
        outcome.deletion,
        Some(Err(FillError::ExcessiveDeletion { rows: 96, total: 96, .. }))
    ));
    assert!(!outcome.deletion_applied());
    assert!(outcome.accuracy.is_none());
    for (i, row) in outcome.grid.rows().iter().enumerate() {
        assert_eq!(row.value, Some(level(i)));
    }
}

#[test]
fn deletion_is_clipped_to_the_window() {
    let records = station_table(28 * ROWS_PER_DAY, &[]);
    // 20:00 on day 10 through 01:00 on day 11; only the last five rows are in scope
    let config = quick_config()
        .with_window(day11_window())
        .with_deletion(ts(DAY11.start - 16), ts(DAY11.start + 4));
    let outcome = run(&records, None, &config).unwrap();

    let deletion = outcome.deletion.clone().unwrap().unwrap();
    assert_eq!(deletion.rows, 5);
    assert_eq!(outcome.imputation.filled, 5);

    for (i, row) in outcome.grid.rows().iter().enumerate() {
        if (DAY11.start..DAY11.start + 5).contains(&i) {
            assert!(row.value.is_none());
            assert!(row.forecast.is_some());
        } else {
            assert_eq!(row.value, Some(level(i)));
        }
    }

    let accuracy = outcome.accuracy.unwrap();
    assert_eq!(accuracy.n, ROWS_PER_DAY);
}

#[test]
fn deletion_outside_the_window_is_rejected() {
    let records = station_table(28 * ROWS_PER_DAY, &[]);
    let config = quick_config()
        .with_window(day11_window())
        .with_deletion(ts(20 * ROWS_PER_DAY), ts(20 * ROWS_PER_DAY + 8));
    let outcome = run(&records, None, &config).unwrap();

    assert!(matches!(
        outcome.deletion,
        Some(Err(FillError::NoDataInRange { .. }))
    ));
    assert!(outcome.grid.rows().iter().all(|r| r.value.is_some()));
    assert_eq!(outcome.imputation.status, ImputationStatus::NothingToDo);
}

#[test]
fn accuracy_of_identical_and_disjoint_series() {
    let series: Vec<_> = (0..50).map(|i| (ts(i), Some(level(i)))).collect();
    let report = accuracy_report(&series, &series).unwrap();
    assert_eq!(report.mse, 0.0);
    assert_eq!(report.mae, 0.0);
    assert_eq!(report.r2, 1.0);
    assert_eq!(report.n, 50);

    let other: Vec<_> = (100..150).map(|i| (ts(i), Some(level(i)))).collect();
    let err = accuracy_report(&series, &other).unwrap_err();
    assert!(matches!(err, FillError::InsufficientData { .. }));
}

// ── Configuration ────────────────────────────────────────────────────────────

#[test]
fn autoregressive_run_with_auxiliary_station() {
    let records = station_table(ROWS_PER_DAY * 14, &[300..340]);
    let auxiliary: Vec<_> = station_table(ROWS_PER_DAY * 14, &[])
        .into_iter()
        .map(|mut r| {
            r.value = r.value.map(|v| v - 20.0);
            r
        })
        .collect();
    let config = quick_config()
        .with_feature_set(wlfill_core::FeatureSet::Autoregressive)
        .with_auxiliary_lag(Duration::days(1));

    let outcome = run(&records, Some(&auxiliary), &config).unwrap();

    assert!(outcome.auxiliary_cleaning.is_some());
    assert_eq!(outcome.imputation.filled, 40);
    assert!(outcome.grid.rows().iter().all(|r| r.value_prev.is_some()));
}

#[test]
fn invalid_search_configuration_is_fatal() {
    let records = station_table(ROWS_PER_DAY, &[10..12]);
    let config = quick_config().with_search(SearchConfig::default().with_n_iter(0));
    let err = run(&records, None, &config).unwrap_err();
    assert!(matches!(err, FillError::InvalidParameter { .. }));
    assert!(err.is_fatal());
}
