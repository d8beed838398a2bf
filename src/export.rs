use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tracing::info;

use crate::errors::AppResult;
use crate::ingestion::{FinalizedRow, NormalizedRow};

pub const LOCATIONS_HEADER: [&str; 5] = ["Indirizzo", "Tipologia", "Carta BIP", "Lat", "Lng"];
pub const ERRORS_HEADER: [&str; 3] = ["Indirizzo", "Tipologia", "Carta BIP"];

/// `<stem>.csv` in the working directory, named after the first input file.
pub fn default_output_path(first_input: &Path) -> PathBuf {
    let stem = first_input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "locations".to_string());
    PathBuf::from(format!("{stem}.csv"))
}

/// `out.csv` -> `out.partial.csv` in the same directory.
pub fn partial_output_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "locations".to_string());
    output.with_file_name(format!("{stem}.partial.csv"))
}

pub fn write_locations<P: AsRef<Path>>(
    path: P,
    header: &[&str],
    rows: &[FinalizedRow],
) -> AppResult<()> {
    write_rows(path.as_ref(), header, rows)
}

pub fn write_errors<P: AsRef<Path>>(path: P, rows: &[NormalizedRow]) -> AppResult<()> {
    write_rows(path.as_ref(), &ERRORS_HEADER, rows)
}

fn write_rows<T: serde::Serialize>(path: &Path, header: &[&str], rows: &[T]) -> AppResult<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}
