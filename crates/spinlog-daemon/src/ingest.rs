//! CSV cleaning: scrobble export to raw history records.
//!
//! The export is headerless with columns `Artist, Album, Title, Date`.
//! Timestamps are `"%d %b %Y %H:%M"` in UTC and come out as Unix
//! milliseconds. Bad rows are dropped and counted, never fatal; a file
//! with no usable rows at all is fatal, because an empty history would
//! leave clients polling a readiness endpoint that can never turn ready.

use chrono::NaiveDateTime;
use csv::StringRecord;
use spinlog_proto::history::RawPlay;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const DATE_FORMAT: &str = "%d %b %Y %H:%M";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV file is empty")]
    Empty,
    #[error("no usable rows in CSV ({skipped} skipped)")]
    NoUsableRows { skipped: usize },
}

/// Cleaned batch plus the counts the upload reply and logs report.
#[derive(Debug, Clone)]
pub struct CleanedCsv {
    pub records: Vec<RawPlay>,
    pub rows_read: usize,
    pub rows_skipped: usize,
}

pub fn clean_csv(path: &Path) -> Result<CleanedCsv, IngestError> {
    let file = File::open(path).map_err(|e| IngestError::Open {
        path: path.display().to_string(),
        source: e,
    })?;
    let cleaned = clean_reader(file)?;
    info!(
        "[ingest] {}: {} rows kept, {} skipped",
        path.display(),
        cleaned.records.len(),
        cleaned.rows_skipped
    );
    Ok(cleaned)
}

fn clean_reader<R: Read>(input: R) -> Result<CleanedCsv, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut records = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                rows_skipped += 1;
                warn!("[ingest] row {} unreadable: {}", line, e);
                continue;
            }
        };

        match parse_row(&record) {
            Ok(raw) => records.push(raw),
            Err(reason) => {
                rows_skipped += 1;
                warn!("[ingest] row {} dropped: {}", line, reason);
            }
        }
    }

    if rows_read == 0 {
        return Err(IngestError::Empty);
    }
    if records.is_empty() {
        return Err(IngestError::NoUsableRows {
            skipped: rows_skipped,
        });
    }

    Ok(CleanedCsv {
        records,
        rows_read,
        rows_skipped,
    })
}

fn parse_row(record: &StringRecord) -> Result<RawPlay, String> {
    let artist = field(record, 0, "Artist")?;
    let album = field(record, 1, "Album")?;
    let title = field(record, 2, "Title")?;
    let date = field(record, 3, "Date")?;

    let naive = NaiveDateTime::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| format!("bad date '{}': {}", date, e))?;
    // Export timestamps are UTC wall clock; local rendering happens at read
    // time, so the stored value is plain epoch milliseconds.
    let played_at_ms = naive.and_utc().timestamp_millis();

    Ok(RawPlay::new(title, artist, album, played_at_ms))
}

fn field<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing {}", name))
}

// ── tests ────────────────────────────────────────────────────────────────────
