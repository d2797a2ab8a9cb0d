//! Reconstruction accuracy metrics.
//!
//! - **Scale-dependent metrics**: MAE, MSE, RMSE
//! - **Explained variance**: R²
//!
//! [`accuracy_report`] aligns a reference series with a reconstructed one by
//! timestamp before scoring.

use crate::error::{FillError, Result};
use chrono::NaiveDateTime;
use statrs::statistics::Statistics;
use std::collections::HashMap;

/// Mean absolute difference between observed and reconstructed levels, in
/// the units of the series.
///
/// ```
/// use wlfill_core::metrics::mae;
/// // water levels in cm; the middle reading was filled 0.5 cm high
/// let observed = [212.0, 215.5, 219.0];
/// let filled = [211.0, 216.0, 219.0];
/// assert_eq!(mae(&observed, &filled).unwrap(), 0.5);
/// ```
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean squared difference; large misses on a filled span dominate.
///
/// # Formula
/// MSE = (1/n) * Σ(actual_i - forecast_i)²
pub fn mse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Square root of [`mse`], back in the units of the series.
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    Ok(mse(actual, forecast)?.sqrt())
}

/// R-squared (Coefficient of Determination)
///
/// A constant reference scores 1.0 when matched exactly and 0.0 otherwise.
pub fn r2(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;

    let mean = actual.mean();

    let ss_res: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum();

    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot.abs() < f64::EPSILON {
        return Ok(if ss_res.abs() < f64::EPSILON { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}

/// Accuracy of a reconstructed series against its reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyReport {
    pub mse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Timestamps shared by both series
    pub n: usize,
}

/// Score `reconstructed` against `reference` over their common timestamps.
///
/// Rows absent from either side, or carrying no value, are excluded rather
/// than counted as zero error. An empty join is `InsufficientData`.
pub fn accuracy_report(
    reference: &[(NaiveDateTime, Option<f64>)],
    reconstructed: &[(NaiveDateTime, Option<f64>)],
) -> Result<AccuracyReport> {
    let lookup: HashMap<NaiveDateTime, f64> = reconstructed
        .iter()
        .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
        .collect();

    let (actual, forecast): (Vec<f64>, Vec<f64>) = reference
        .iter()
        .filter_map(|(ts, v)| Some((v.as_ref().copied()?, *lookup.get(ts)?)))
        .unzip();

    if actual.is_empty() {
        return Err(FillError::insufficient(
            "accuracy report (no overlapping timestamps)",
            1,
            0,
        ));
    }

    Ok(AccuracyReport {
        mse: mse(&actual, &forecast)?,
        mae: mae(&actual, &forecast)?,
        r2: r2(&actual, &forecast)?,
        n: actual.len(),
    })
}

fn validate_inputs(actual: &[f64], forecast: &[f64]) -> Result<()> {
    if actual.len() != forecast.len() {
        return Err(FillError::InvalidInput(format!(
            "Actual and forecast arrays must have the same length: {} vs {}",
            actual.len(),
            forecast.len()
        )));
    }
    if actual.is_empty() {
        return Err(FillError::insufficient("metric input", 1, 0));
    }
    Ok(())
}
