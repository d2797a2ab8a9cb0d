//! End-to-end gap-filling run over raw input tables.

use crate::config::FillConfig;
use crate::deletion::{delete_range, DeletionOutcome};
use crate::error::Result;
use crate::features::{derive_calendar, derive_value_prev, FeatureSet};
use crate::grid::{clean_readings, normalize, CleaningStats, Grid, RawRecord};
use crate::imputation::{impute, ImputationReport};
use crate::metrics::{accuracy_report, AccuracyReport};
use log::{debug, info, warn};

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    /// Reconstructed grid with provenance columns
    pub grid: Grid,
    pub cleaning: CleaningStats,
    /// Cleaning of the auxiliary table, when it was used
    pub auxiliary_cleaning: Option<CleaningStats>,
    /// Result of the requested synthetic deletion; a rejection leaves the
    /// data untouched and the run continues
    pub deletion: Option<Result<DeletionOutcome>>,
    pub imputation: ImputationReport,
    /// Only computed when a deletion was applied
    pub accuracy: Option<AccuracyReport>,
}

impl FillOutcome {
    /// Whether the requested deletion was applied.
    pub fn deletion_applied(&self) -> bool {
        matches!(self.deletion, Some(Ok(_)))
    }
}

/// Clean, grid, optionally blank, featurise and impute `primary`.
///
/// `auxiliary` supplies `value_prev` for the autoregressive feature set; it
/// is ignored otherwise.
pub fn run(
    primary: &[RawRecord],
    auxiliary: Option<&[RawRecord]>,
    config: &FillConfig,
) -> Result<FillOutcome> {
    config.validate()?;

    let (mut grid, cleaning) = normalize(primary, config.interval, &config.valid_range)?;
    grid.fill_codes();
    info!(
        "Gridded {} of {} rows onto {} slots from {} to {}",
        cleaning.kept(),
        cleaning.total,
        grid.len(),
        grid.start(),
        grid.end()
    );

    let reference = grid.observed_series();

    let scope = grid.window(config.window.start, config.window.end);
    let deletion = config.deletion.map(|(start, end)| {
        delete_range(
            &mut grid,
            scope.clone(),
            start,
            end,
            config.max_deletion_fraction,
        )
    });
    if let Some(Err(e)) = &deletion {
        warn!("Deletion rejected, continuing on untouched data: {}", e);
    }

    derive_calendar(&mut grid);

    let mut auxiliary_cleaning = None;
    match (config.feature_set, auxiliary) {
        (FeatureSet::Autoregressive, Some(raw)) => {
            let (readings, stats) = clean_readings(raw, &config.valid_range)?;
            auxiliary_cleaning = Some(stats);
            derive_value_prev(&mut grid, Some(&readings), config.auxiliary_lag)?;
        }
        (FeatureSet::Autoregressive, None) => {
            derive_value_prev(&mut grid, None, config.auxiliary_lag)?;
        }
        (FeatureSet::Calendar, Some(_)) => {
            debug!("Auxiliary table ignored for calendar-only features");
        }
        (FeatureSet::Calendar, None) => {}
    }

    let imputation = impute(&mut grid, config)?;

    let accuracy = if matches!(deletion, Some(Ok(_))) {
        let window = grid.window(config.window.start, config.window.end);
        let merged = grid.merged_series();
        match accuracy_report(&reference, &merged[window]) {
            Ok(report) => {
                info!(
                    "Accuracy over {} rows: MSE {:.4}, MAE {:.4}, R2 {:.4}",
                    report.n, report.mse, report.mae, report.r2
                );
                Some(report)
            }
            Err(e) => {
                warn!("Accuracy not computed: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(FillOutcome {
        grid,
        cleaning,
        auxiliary_cleaning,
        deletion,
        imputation,
        accuracy,
    })
}
