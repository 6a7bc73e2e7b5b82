//! Tabular export of resolved courts.
//!
//! One CSV per run: a header row (`id`, every court field, provenance columns)
//! followed by one row per court in the order the pipeline resolved them.

use std::fs::File;
use std::path::{Path, PathBuf};

use courtscout_shared::{COURT_FIELDS, CourtScoutError, ExportRow, Location, Result, RunMode};
use csv::Writer;

/// Separator used when several image URLs share one cell.
const IMAGE_SEPARATOR: &str = ";";

/// Destination for a run's export buffer.
pub trait ExportSink: Send {
    /// Write all rows as one artifact. Returns `None` when `rows` is empty.
    fn write_rows(&mut self, rows: &[ExportRow]) -> Result<Option<PathBuf>>;
}

/// Writes `<province><city><district>_<mode>_courts.csv` under a directory.
pub struct CsvExporter {
    dir: PathBuf,
    location: Location,
    mode: RunMode,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>, location: Location, mode: RunMode) -> Self {
        Self {
            dir: dir.into(),
            location,
            mode,
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_courts.csv",
            self.location.label(),
            self.mode.as_str()
        ))
    }
}

/// Header row shared by every export.
pub fn header() -> Vec<&'static str> {
    let mut columns = Vec::with_capacity(COURT_FIELDS.len() + 4);
    columns.push("id");
    columns.extend(COURT_FIELDS.iter().map(|f| f.name));
    columns.extend(["source_url", "source_title", "image_urls"]);
    columns
}

fn record_cells(row: &ExportRow) -> Vec<String> {
    let mut cells = Vec::with_capacity(COURT_FIELDS.len() + 4);
    cells.push(row.id.to_string());
    cells.extend(COURT_FIELDS.iter().map(|f| row.court.0.display(f.name)));
    cells.push(row.source_url.clone().unwrap_or_default());
    cells.push(row.source_title.clone().unwrap_or_default());
    cells.push(row.image_urls.join(IMAGE_SEPARATOR));
    cells
}

fn export_err(path: &Path, e: impl std::fmt::Display) -> CourtScoutError {
    CourtScoutError::Export(format!("{}: {e}", path.display()))
}

impl ExportSink for CsvExporter {
    fn write_rows(&mut self, rows: &[ExportRow]) -> Result<Option<PathBuf>> {
        if rows.is_empty() {
            tracing::info!("export buffer empty, nothing written");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| CourtScoutError::io(&self.dir, e))?;
        let path = self.file_path();
        let file = File::create(&path).map_err(|e| CourtScoutError::io(&path, e))?;
        let mut writer = Writer::from_writer(file);

        writer
            .write_record(header())
            .map_err(|e| export_err(&path, e))?;
        for row in rows {
            writer
                .write_record(record_cells(row))
                .map_err(|e| export_err(&path, e))?;
        }
        writer.flush().map_err(|e| CourtScoutError::io(&path, e))?;

        tracing::info!(rows = rows.len(), path = %path.display(), "export written");
        Ok(Some(path))
    }
}
