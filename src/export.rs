//! CSV export and bulk import.

use std::fs::File;
use std::path::Path;

use csv::{Reader, Writer};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::error::{Result, SightingError};
use crate::record::{NewSighting, SightingRecord};
use crate::store::SightingStore;

/// Outcome of a bulk import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub created: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub failed: usize,
}

impl ImportReport {
    /// Count one create result. Infrastructure failures are counted but not
    /// fatal, so one bad row never stops the rest.
    pub fn record(&mut self, row: usize, result: &Result<SightingRecord>) {
        match result {
            Ok(_) => self.created += 1,
            Err(SightingError::Duplicate) => {
                warn!("Row {}: duplicate sighting skipped", row);
                self.duplicates += 1;
            }
            Err(e @ SightingError::Validation { .. }) => {
                warn!("Row {}: {}", row, e);
                self.invalid += 1;
            }
            Err(e) => {
                warn!("Row {}: {}", row, e);
                self.failed += 1;
            }
        }
    }

    /// Count a row that could not be parsed into a sighting.
    pub fn unreadable(&mut self, line: usize, err: &csv::Error) {
        warn!("Row {}: unreadable: {}", line, err);
        self.invalid += 1;
    }

    pub fn total(&self) -> usize {
        self.created + self.duplicates + self.invalid + self.failed
    }
}

/// Write records to a CSV file with a header row.
pub fn save_to_csv(records: &[SightingRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = Writer::from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;
    info!("Saved {} sightings to {}", records.len(), path.display());
    Ok(())
}

/// Rows read from a CSV file, each tagged with its line number. Rows that
/// could not be read at all are already counted in `report.invalid`.
#[derive(Debug, Default)]
pub struct CsvRows {
    pub sightings: Vec<(usize, NewSighting)>,
    pub report: ImportReport,
}

/// Read `species,location,date,time` rows. Extra columns such as `id` in a
/// previous export are ignored. A malformed row is skipped with a warning.
pub fn load_from_csv(path: impl AsRef<Path>) -> Result<CsvRows> {
    let path = path.as_ref();
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = CsvRows::default();
    for (index, result) in reader.records().enumerate() {
        // Line numbers count the header as line 1.
        let fallback = index + 2;
        match result {
            Ok(record) => {
                let line = record.position().map_or(fallback, |p| p.line() as usize);
                match record.deserialize::<NewSighting>(Some(&headers)) {
                    Ok(sighting) => rows.sightings.push((line, sighting)),
                    Err(e) => rows.report.unreadable(line, &e),
                }
            }
            Err(e) => {
                let line = e.position().map_or(fallback, |p| p.line() as usize);
                rows.report.unreadable(line, &e);
            }
        }
    }

    info!(
        "Loaded {} rows from {} ({} unreadable)",
        rows.sightings.len(),
        path.display(),
        rows.report.invalid
    );
    Ok(rows)
}

/// Create every sighting through the store, continuing past rejected rows.
pub fn import_into(store: &dyn SightingStore, rows: CsvRows) -> ImportReport {
    let progress_bar = ProgressBar::new(rows.sightings.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
    {
        progress_bar.set_style(style.progress_chars("##-"));
    }
    progress_bar.set_message("Importing sightings");

    let mut report = rows.report;
    for (line, sighting) in &rows.sightings {
        report.record(*line, &store.create(sighting));
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    info!(
        "Imported {} of {} rows ({} duplicates, {} invalid, {} failed)",
        report.created,
        report.total(),
        report.duplicates,
        report.invalid,
        report.failed
    );
    report
}
