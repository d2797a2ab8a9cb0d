//! Subcommands of the wlfill CLI.

use crate::io::{read_records_file, write_grid_file};
use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Args, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use wlfill_core::validation::DEFAULT_FORWARD_CHAINING_MIN_ROWS;
use wlfill_core::{
    clean_readings, derive_calendar, detect_interval, missing_spans, normalize, parse_timestamp,
    partition_gaps, run, CvScheme, FeatureSet, FillConfig, FillOutcome, ImputationStatus,
    RawRecord, TimeWindow,
};

#[derive(Subcommand)]
pub enum Command {
    /// Fill gaps in a water-level series and write the reconstructed table
    Fill {
        #[command(flatten)]
        input: InputArgs,

        /// Output path for the reconstructed CSV
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Auxiliary station CSV supplying the previous-value feature
        #[arg(short = 'a', long)]
        auxiliary: Option<PathBuf>,

        /// Days added to auxiliary station timestamps
        #[arg(long, default_value_t = 0)]
        lag_days: i64,

        /// Start of a range to blank for accuracy evaluation
        #[arg(long, requires = "delete_end")]
        delete_start: Option<String>,

        /// End of the range to blank (inclusive)
        #[arg(long, requires = "delete_start")]
        delete_end: Option<String>,

        /// Largest share of rows a deletion may blank
        #[arg(long, default_value_t = 0.3)]
        max_deletion_fraction: f64,

        /// Use the wider search space, previous-value feature and prior-month rows
        #[arg(long)]
        extended: bool,

        /// Add the previous value as a feature
        #[arg(long)]
        autoregressive: bool,

        /// Add previous calendar month rows to adjacent-week training
        #[arg(long)]
        prior_month: bool,

        /// Leave low-severity weeks without present rows unfilled
        #[arg(long)]
        no_fallback: bool,

        /// Hyperparameter candidates per model
        #[arg(long)]
        n_iter: Option<usize>,

        /// Cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Cross-validation scheme
        #[arg(long, value_enum)]
        cv: Option<CvArg>,

        /// Random seed for search and forests
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Report missing rows per week without filling them
    Inspect {
        #[command(flatten)]
        input: InputArgs,
    },
}

/// Options shared by every subcommand.
#[derive(Args)]
pub struct InputArgs {
    /// Primary station CSV with `datetime`, `wl_up` and optional `code` columns
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// First day to process (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last day to process, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Grid spacing in minutes; detected from the input when omitted
    #[arg(long)]
    interval_minutes: Option<i64>,

    /// Lowest plausible reading
    #[arg(long, default_value_t = 100.0)]
    min_value: f64,

    /// Highest plausible reading
    #[arg(long, default_value_t = 450.0)]
    max_value: f64,

    /// Missing rows per week above which a week is high-severity
    #[arg(long, default_value_t = 288)]
    threshold: usize,
}

impl InputArgs {
    fn window(&self) -> TimeWindow {
        TimeWindow::new(
            self.start_date.and_then(|d| d.and_hms_opt(0, 0, 0)),
            self.end_date.and_then(|d| d.and_hms_opt(23, 59, 59)),
        )
    }

    /// Configured grid spacing, or the most common spacing of the valid
    /// readings in `records`.
    fn interval(&self, records: &[RawRecord]) -> anyhow::Result<Duration> {
        if let Some(minutes) = self.interval_minutes {
            return Ok(Duration::minutes(minutes));
        }
        let (readings, _) = clean_readings(records, &(self.min_value..=self.max_value))?;
        let stamps: Vec<NaiveDateTime> = readings.iter().map(|r| r.timestamp).collect();
        let interval = detect_interval(&stamps).context("Could not detect the grid interval")?;
        info!("Detected a {} minute interval", interval.num_minutes());
        Ok(interval)
    }

    fn apply(&self, config: FillConfig, interval: Duration) -> FillConfig {
        config
            .with_interval(interval)
            .with_valid_range(self.min_value..=self.max_value)
            .with_severity_threshold(self.threshold)
            .with_window(self.window())
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CvArg {
    /// Contiguous k-fold
    Kfold,
    /// Expanding-window time-ordered folds
    Forward,
    /// Forward-chaining for week-sized scopes, k-fold below
    Auto,
}

impl From<CvArg> for CvScheme {
    fn from(arg: CvArg) -> Self {
        match arg {
            CvArg::Kfold => CvScheme::KFold { shuffle: false },
            CvArg::Forward => CvScheme::ForwardChaining,
            CvArg::Auto => CvScheme::Auto {
                forward_chaining_min_rows: DEFAULT_FORWARD_CHAINING_MIN_ROWS,
            },
        }
    }
}

fn parse_bound(name: &str, value: &str) -> anyhow::Result<NaiveDateTime> {
    parse_timestamp(value).with_context(|| format!("Could not parse --{} '{}'", name, value))
}

pub fn run_command(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Fill {
            input,
            output,
            auxiliary,
            lag_days,
            delete_start,
            delete_end,
            max_deletion_fraction,
            extended,
            autoregressive,
            prior_month,
            no_fallback,
            n_iter,
            folds,
            cv,
            seed,
        } => {
            let primary = read_records_file(&input.input)?;
            let aux = auxiliary.as_deref().map(read_records_file).transpose()?;
            info!("Read {} rows from {}", primary.len(), input.input.display());

            let base = if extended {
                FillConfig::extended()
            } else {
                FillConfig::default()
            };
            let mut config = input.apply(base, input.interval(&primary)?);
            config = config
                .with_auxiliary_lag(Duration::days(lag_days))
                .with_max_deletion_fraction(max_deletion_fraction)
                .with_low_severity_fallback(!no_fallback);
            if autoregressive {
                config = config.with_feature_set(FeatureSet::Autoregressive);
            }
            if prior_month {
                config = config.with_prior_month(true);
            }
            if let (Some(s), Some(e)) = (&delete_start, &delete_end) {
                config = config.with_deletion(
                    parse_bound("delete-start", s)?,
                    parse_bound("delete-end", e)?,
                );
            }

            let mut search = config.search.clone().with_random_state(seed);
            if let Some(n) = n_iter {
                search = search.with_n_iter(n);
            }
            if let Some(k) = folds {
                search = search.with_folds(k);
            }
            if let Some(scheme) = cv {
                search = search.with_cv(scheme.into());
            }
            config = config.with_search(search);

            let outcome = run(&primary, aux.as_deref(), &config)?;
            write_grid_file(&outcome.grid, &output)?;
            print_summary(&outcome);
            info!("Output: {}", output.display());
            Ok(())
        }
        Command::Inspect { input } => {
            let primary = read_records_file(&input.input)?;
            let config = input.apply(FillConfig::default(), input.interval(&primary)?);
            config.validate()?;

            let (mut grid, stats) = normalize(&primary, config.interval, &config.valid_range)?;
            derive_calendar(&mut grid);

            println!(
                "rows: {} read, {} kept, {} grid slots of {} min ({} .. {})",
                stats.total,
                stats.kept(),
                grid.len(),
                grid.interval().num_minutes(),
                grid.start(),
                grid.end()
            );

            let window = grid.window(config.window.start, config.window.end);
            let partition = partition_gaps(&grid, window, config.severity_threshold);
            if partition.is_empty() {
                println!("no missing rows");
                return Ok(());
            }
            println!(
                "{} missing rows; weeks above {} missing rows are high severity",
                partition.total_missing(),
                partition.threshold()
            );

            for group in partition.low.iter().chain(partition.high.iter()) {
                let spans = missing_spans(&grid, &group.missing);
                println!(
                    "week {:>2}  {:>4} severity  {:>5} missing rows in {} spans",
                    group.week,
                    group.severity.to_string(),
                    group.missing.len(),
                    spans.len()
                );
                for span in spans {
                    println!("    {}", span);
                }
            }
            Ok(())
        }
    }
}

fn print_summary(outcome: &FillOutcome) {
    let report = &outcome.imputation;
    match report.status {
        ImputationStatus::NothingToDo => println!("No missing values to predict."),
        _ => println!(
            "Filled {} rows in {} weeks; {} rows unresolved.",
            report.filled,
            report.resolutions.len(),
            report.unresolved_rows()
        ),
    }
    for unresolved in &report.unresolved {
        println!(
            "  unresolved week {} {}: {}",
            unresolved.week, unresolved.span, unresolved.reason
        );
    }

    if let Some(Err(e)) = &outcome.deletion {
        println!("Deletion not applied: {}", e);
    }
    if let Some(accuracy) = &outcome.accuracy {
        println!("Mean Squared Error (MSE): {:.4}", accuracy.mse);
        println!("Mean Absolute Error (MAE): {:.4}", accuracy.mae);
        println!("R-squared (R2): {:.4}", accuracy.r2);
    }
}
