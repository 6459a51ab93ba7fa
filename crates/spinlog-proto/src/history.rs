//! Play-history records and parsing.
//!
//! The daemon's cleaner writes `output.json`: a JSON array of raw records,
//! one per scrobble, in the column naming of the Last.fm CSV export
//! (`Title` / `Artist` / `Album` / `Date`). Dates travel as Unix
//! milliseconds, already shifted to the local timezone by the cleaner.
//! Older export generations spelled the date key `date` or `DATE`, and some
//! hand-rolled files carry ISO-8601 strings instead of milliseconds, so
//! resolution falls back across all three keys in priority order and
//! accepts both value forms.
//!
//! Parsing a batch never fails wholesale: records whose date cannot be
//! resolved are dropped and counted, and the count rides along in
//! [`History`] so views can surface the loss.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

// ── Wire shape ───────────────────────────────────────────────────────────────

/// One scrobble as it appears in `output.json` / `json_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlay {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Artist", default)]
    pub artist: String,
    #[serde(rename = "Album", default)]
    pub album: String,
    /// Canonical date key; what the cleaner emits.
    #[serde(rename = "Date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    /// Legacy lower-case spelling, consulted when `Date` is absent.
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub date_lower: Option<Value>,
    /// Legacy upper-case spelling, last resort.
    #[serde(rename = "DATE", default, skip_serializing_if = "Option::is_none")]
    pub date_upper: Option<Value>,
}

/// Why a record's timestamp could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("record has no Date/date/DATE field")]
    Missing,
    #[error("unrecognised date value: {0}")]
    Unrecognised(String),
    #[error("timestamp out of range: {0} ms")]
    OutOfRange(i64),
}

impl RawPlay {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        played_at_ms: i64,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            date: Some(Value::from(played_at_ms)),
            date_lower: None,
            date_upper: None,
        }
    }

    /// Ordered fallback across the three historical key spellings.
    fn date_value(&self) -> Option<&Value> {
        self.date
            .as_ref()
            .or(self.date_lower.as_ref())
            .or(self.date_upper.as_ref())
    }

    /// Resolve the record's timestamp, or say exactly why it cannot be.
    pub fn played_at(&self) -> Result<DateTime<Local>, DateError> {
        let value = self.date_value().ok_or(DateError::Missing)?;
        match value {
            Value::Number(n) => {
                let ms = n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .ok_or_else(|| DateError::Unrecognised(n.to_string()))?;
                Local
                    .timestamp_millis_opt(ms)
                    .single()
                    .ok_or(DateError::OutOfRange(ms))
            }
            Value::String(s) => parse_date_string(s),
            other => Err(DateError::Unrecognised(other.to_string())),
        }
    }
}

/// Accepts RFC 3339 ("2021-01-05T20:15:00Z") and bare ISO date-times
/// ("2021-01-05T20:15:00", "2021-01-05"), the latter read as local time.
fn parse_date_string(s: &str) -> Result<DateTime<Local>, DateError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        if let Some(dt) = naive.and_local_timezone(Local).earliest() {
            return Ok(dt);
        }
    }
    if let Ok(day) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = day
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
        {
            return Ok(dt);
        }
    }
    Err(DateError::Unrecognised(s.to_string()))
}

// ── Parsed records ───────────────────────────────────────────────────────────

/// A scrobble with a resolved timestamp. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Play {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub played_at: DateTime<Local>,
}

/// A parsed batch: every well-formed record plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Stored newest first, matching the cleaner's output order.
    pub plays: Vec<Play>,
    /// Records dropped because their date could not be resolved.
    pub skipped: usize,
}

impl History {
    /// Parse a raw batch. A bad row never sinks the batch: it is skipped,
    /// counted, and logged.
    pub fn from_raw(records: &[RawPlay]) -> Self {
        let mut plays = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for (idx, raw) in records.iter().enumerate() {
            match raw.played_at() {
                Ok(played_at) => plays.push(Play {
                    title: raw.title.clone(),
                    artist: raw.artist.clone(),
                    album: raw.album.clone(),
                    played_at,
                }),
                Err(e) => {
                    skipped += 1;
                    warn!("[history] dropping record {}: {}", idx, e);
                }
            }
        }

        Self { plays, skipped }
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    /// Most recent play. Records are stored newest first.
    pub fn latest(&self) -> Option<&Play> {
        self.plays.first()
    }
}

// ── Persistence ──────────────────────────────────────────────────────────────

/// Read and parse a history file written by the cleaner.
pub async fn load_raw_history(path: &Path) -> anyhow::Result<Vec<RawPlay>> {
    let bytes = tokio::fs::read(path).await?;
    let records: Vec<RawPlay> = serde_json::from_slice(&bytes)?;
    Ok(records)
}

/// Write a raw batch as pretty-printed JSON, creating parent directories.
pub async fn write_raw_history(path: &Path, records: &[RawPlay]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn raw(json: &str) -> RawPlay {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_date_key_fallback_order() {
        // Capitalised key wins over the legacy spellings.
        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b",
                         "Date": 1000, "date": 2000, "DATE": 3000 }"#);
        assert_eq!(r.played_at().unwrap().timestamp_millis(), 1000);

        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b",
                         "date": 2000, "DATE": 3000 }"#);
        assert_eq!(r.played_at().unwrap().timestamp_millis(), 2000);

        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b", "DATE": 3000 }"#);
        assert_eq!(r.played_at().unwrap().timestamp_millis(), 3000);
    }

    #[test]
    fn test_missing_date_is_explicit() {
        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b" }"#);
        assert_eq!(r.played_at(), Err(DateError::Missing));
    }

    #[test]
    fn test_iso_string_dates_accepted() {
        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b",
                         "Date": "2021-01-05T20:15:00" }"#);
        let at = r.played_at().unwrap();
        assert_eq!(at.hour(), 20);
        assert_eq!(at.minute(), 15);

        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b",
                         "Date": "2021-01-05" }"#);
        assert!(r.played_at().is_ok());
    }

    #[test]
    fn test_garbage_dates_are_errors_not_panics() {
        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b", "Date": "last tuesday" }"#);
        assert!(matches!(r.played_at(), Err(DateError::Unrecognised(_))));

        let r = raw(r#"{ "Title": "t", "Artist": "a", "Album": "b", "Date": true }"#);
        assert!(matches!(r.played_at(), Err(DateError::Unrecognised(_))));
    }

    #[test]
    fn test_batch_parse_skips_and_counts() {
        let records = vec![
            RawPlay::new("one", "A", "x", 1_600_000_000_000),
            raw(r#"{ "Title": "bad", "Artist": "A", "Album": "x" }"#),
            RawPlay::new("two", "B", "y", 1_600_000_060_000),
        ];
        let history = History::from_raw(&records);
        assert_eq!(history.len(), 2);
        assert_eq!(history.skipped, 1);
        assert_eq!(history.latest().unwrap().title, "one");
    }

    #[test]
    fn test_serialised_shape_matches_cleaner_output() {
        // Only the canonical four keys appear in what we write.
        let json = serde_json::to_value(RawPlay::new("t", "a", "b", 42)).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["Album", "Artist", "Date", "Title"]);
    }
}
