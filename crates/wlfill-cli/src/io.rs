//! CSV reading and writing for input tables and reconstructed output.

use anyhow::Context;
use log::warn;
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use wlfill_core::{Grid, RawRecord};

/// Input row: `datetime`, `wl_up` and an optional `code` column. Other
/// columns are ignored.
#[derive(Debug, Deserialize)]
struct InputRow {
    datetime: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    wl_up: Option<f64>,
    #[serde(default)]
    code: Option<String>,
}

/// Read raw records from any CSV source.
///
/// Rows that fail to deserialize are kept as records with an empty timestamp
/// so the cleaning step counts them as dropped.
pub fn read_records<R: Read>(reader: R) -> anyhow::Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();
    for required in ["datetime", "wl_up"] {
        if !headers.iter().any(|h| h == required) {
            anyhow::bail!("Missing required column '{}'", required);
        }
    }

    let mut records = Vec::new();
    let mut malformed = 0usize;
    for result in rdr.deserialize::<InputRow>() {
        match result {
            Ok(row) => records.push(RawRecord {
                datetime: row.datetime,
                value: row.wl_up,
                code: row.code.filter(|c| !c.is_empty()),
            }),
            Err(e) => {
                malformed += 1;
                if malformed == 1 {
                    warn!("Skipping malformed CSV row: {}", e);
                }
                records.push(RawRecord::default());
            }
        }
    }
    if malformed > 1 {
        warn!("{} malformed CSV rows in total", malformed);
    }

    Ok(records)
}

/// Read raw records from a CSV file.
pub fn read_records_file(path: &Path) -> anyhow::Result<Vec<RawRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_records(file).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write the reconstructed grid as CSV.
pub fn write_grid<W: Write>(grid: &Grid, writer: W) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in grid.to_records() {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the reconstructed grid to a CSV file.
pub fn write_grid_file(grid: &Grid, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_grid(grid, file).with_context(|| format!("Failed to write {}", path.display()))
}
