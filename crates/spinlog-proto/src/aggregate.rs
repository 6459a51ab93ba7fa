//! Pure aggregation over parsed play history.
//!
//! Everything in here is a deterministic function of its arguments: no
//! clocks except the `now` the caller passes in, no shared state, safe to
//! call repeatedly or from several tasks at once. Rankings use a stable
//! descending sort, so equal counts keep the order the keys were first
//! seen in the input. Trace order in the monthly series is likewise
//! first-encounter order, tracked explicitly rather than left to map
//! iteration.

use crate::history::{History, Play};
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use std::collections::HashMap;
use std::fmt;

/// Rankings are cut to this many entries unless the caller asks otherwise.
pub const TOP_N: usize = 10;
/// How many records the recent-plays view shows.
pub const RECENT_PLAYS: usize = 50;
/// Slots on the scrobble clock.
pub const CLOCK_HOURS: usize = 24;

// ── Time windows ─────────────────────────────────────────────────────────────

/// Reporting window, as an inclusive lower bound on `played_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    PastWeek,
    #[default]
    PastMonth,
    PastSixMonths,
    PastYear,
    AllTime,
}

impl Window {
    pub const ALL: [Window; 5] = [
        Window::PastWeek,
        Window::PastMonth,
        Window::PastSixMonths,
        Window::PastYear,
        Window::AllTime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::PastWeek => "1-week",
            Self::PastMonth => "1-month",
            Self::PastSixMonths => "6-months",
            Self::PastYear => "1-year",
            Self::AllTime => "alltime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1-week" | "week" => Some(Self::PastWeek),
            "1-month" | "month" => Some(Self::PastMonth),
            "6-months" => Some(Self::PastSixMonths),
            "1-year" | "year" => Some(Self::PastYear),
            "alltime" | "all" => Some(Self::AllTime),
            _ => None,
        }
    }

    /// Inclusive lower bound for this window, relative to `now`.
    pub fn cutoff(self, now: DateTime<Local>) -> DateTime<Local> {
        let days = match self {
            Self::PastWeek => 7,
            Self::PastMonth => 30,
            Self::PastSixMonths => 180,
            Self::PastYear => 365,
            Self::AllTime => return DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local),
        };
        now - chrono::Duration::days(days)
    }
}

// ── Top-N grouping ───────────────────────────────────────────────────────────

/// A song identity. Structured on purpose: joining title and artist into
/// one string would corrupt entries whose fields contain the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SongKey {
    pub title: String,
    pub artist: String,
}

impl fmt::Display for SongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.artist)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey {
    pub album: String,
    pub artist: String,
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.album, self.artist)
    }
}

/// One ranked entry: a key and how many plays it accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<K> {
    pub key: K,
    pub plays: usize,
}

/// Count plays at or after `cutoff` per key, rank descending, keep `n`.
///
/// Equal counts keep first-encounter order: keys are collected in input
/// order and the sort is stable.
pub fn top_by_key<K, F>(plays: &[Play], cutoff: DateTime<Local>, n: usize, key_of: F) -> Vec<Tally<K>>
where
    K: Clone + Eq + std::hash::Hash,
    F: Fn(&Play) -> K,
{
    let mut counts: HashMap<K, usize> = HashMap::new();
    let mut order: Vec<K> = Vec::new();

    for play in plays {
        if play.played_at < cutoff {
            continue;
        }
        let key = key_of(play);
        match counts.get_mut(&key) {
            Some(c) => *c += 1,
            None => {
                counts.insert(key.clone(), 1);
                order.push(key);
            }
        }
    }

    let mut ranked: Vec<Tally<K>> = order
        .into_iter()
        .map(|key| {
            let plays = counts[&key];
            Tally { key, plays }
        })
        .collect();
    ranked.sort_by(|a, b| b.plays.cmp(&a.plays));
    ranked.truncate(n);
    ranked
}

pub fn top_artists(plays: &[Play], cutoff: DateTime<Local>, n: usize) -> Vec<Tally<String>> {
    top_by_key(plays, cutoff, n, |p| p.artist.clone())
}

pub fn top_songs(plays: &[Play], cutoff: DateTime<Local>, n: usize) -> Vec<Tally<SongKey>> {
    top_by_key(plays, cutoff, n, |p| SongKey {
        title: p.title.clone(),
        artist: p.artist.clone(),
    })
}

pub fn top_albums(plays: &[Play], cutoff: DateTime<Local>, n: usize) -> Vec<Tally<AlbumKey>> {
    top_by_key(plays, cutoff, n, |p| AlbumKey {
        album: p.album.clone(),
        artist: p.artist.clone(),
    })
}

// ── Monthly trend series ─────────────────────────────────────────────────────

/// Zero-padded "YYYY-MM". The padding is what makes lexicographic order
/// equal chronological order on the month axis.
pub fn month_label(at: DateTime<Local>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistTrace {
    pub artist: String,
    /// One count per entry of [`MonthlySeries::months`], zeros included.
    pub counts: Vec<usize>,
}

/// Per-artist play counts aligned on a common month axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonthlySeries {
    /// Sorted ascending union of every month any play fell in.
    pub months: Vec<String>,
    /// One trace per artist, in the order artists first appear in the input.
    pub traces: Vec<ArtistTrace>,
}

pub fn monthly_series(plays: &[Play]) -> MonthlySeries {
    let mut months: Vec<String> = Vec::new();
    let mut artists: Vec<String> = Vec::new();
    let mut artist_idx: HashMap<String, usize> = HashMap::new();
    let mut counts: HashMap<(usize, String), usize> = HashMap::new();

    for play in plays {
        let month = month_label(play.played_at);
        if !months.contains(&month) {
            months.push(month.clone());
        }
        let idx = match artist_idx.get(&play.artist) {
            Some(&idx) => idx,
            None => {
                let idx = artists.len();
                artists.push(play.artist.clone());
                artist_idx.insert(play.artist.clone(), idx);
                idx
            }
        };
        *counts.entry((idx, month)).or_insert(0) += 1;
    }

    months.sort_unstable();

    let traces = artists
        .into_iter()
        .enumerate()
        .map(|(idx, artist)| ArtistTrace {
            counts: months
                .iter()
                .map(|m| counts.get(&(idx, m.clone())).copied().unwrap_or(0))
                .collect(),
            artist,
        })
        .collect();

    MonthlySeries { months, traces }
}

// ── Scrobble clock ───────────────────────────────────────────────────────────

/// Hour-of-day histogram in local time, plus the records that never made
/// it into the parsed history. `hours.sum() + skipped` equals the raw
/// batch length the history was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockFace {
    pub hours: [usize; CLOCK_HOURS],
    pub skipped: usize,
}

impl Default for ClockFace {
    fn default() -> Self {
        Self {
            hours: [0; CLOCK_HOURS],
            skipped: 0,
        }
    }
}

impl ClockFace {
    pub fn total(&self) -> usize {
        self.hours.iter().sum()
    }

    /// Hour with the most plays; earliest wins a tie. None when empty.
    pub fn peak_hour(&self) -> Option<usize> {
        if self.total() == 0 {
            return None;
        }
        self.hours
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(h, _)| h)
    }
}

pub fn scrobble_clock(history: &History) -> ClockFace {
    let mut face = ClockFace {
        skipped: history.skipped,
        ..Default::default()
    };
    for play in &history.plays {
        face.hours[play.played_at.hour() as usize] += 1;
    }
    face
}

// ── Recent plays and summary line ────────────────────────────────────────────

/// First `RECENT_PLAYS` records in stored order (newest first).
pub fn recent_plays(history: &History) -> &[Play] {
    let n = history.plays.len().min(RECENT_PLAYS);
    &history.plays[..n]
}

/// "12 Jan 2021 20:15 (3h ago)" for the latest play, relative to `now`.
pub fn last_scrobble_summary(history: &History, now: DateTime<Local>) -> Option<String> {
    let latest = history.latest()?;
    let elapsed = now.signed_duration_since(latest.played_at);
    // Rounded to the nearest hour, floored at zero for clock skew.
    let hours = ((elapsed.num_minutes().max(0) as f64) / 60.0).round() as i64;
    Some(format!(
        "{} ({}h ago)",
        latest.played_at.format("%d %b %Y %H:%M"),
        hours
    ))
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn play(title: &str, artist: &str, album: &str, y: i32, mo: u32, d: u32, h: u32) -> Play {
        Play {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            played_at: Local.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap(),
        }
    }

    fn epoch() -> DateTime<Local> {
        DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local)
    }

    #[test]
    fn test_window_labels_round_trip() {
        for w in Window::ALL {
            assert_eq!(Window::parse(w.label()), Some(w));
        }
        assert_eq!(Window::default(), Window::PastMonth);
        assert!(Window::parse("fortnight").is_none());
    }

    #[test]
    fn test_window_cutoff_ordering() {
        let now = Local.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        let mut cutoffs: Vec<_> = Window::ALL.iter().map(|w| w.cutoff(now)).collect();
        let sorted = {
            let mut c = cutoffs.clone();
            c.sort();
            c
        };
        cutoffs.reverse();
        assert_eq!(cutoffs, sorted);
        assert_eq!(Window::AllTime.cutoff(now), epoch());
    }

    #[test]
    fn test_top_artists_counts_and_order() {
        let plays = vec![
            play("s1", "A", "x", 2021, 1, 5, 10),
            play("s2", "A", "x", 2021, 1, 20, 11),
            play("s3", "B", "y", 2021, 2, 1, 12),
        ];
        let top = top_artists(&plays, epoch(), 2);
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].key.as_str(), top[0].plays), ("A", 2));
        assert_eq!((top[1].key.as_str(), top[1].plays), ("B", 1));
    }

    #[test]
    fn test_top_ties_keep_first_encounter_order() {
        let plays = vec![
            play("s", "C", "x", 2021, 1, 1, 0),
            play("s", "A", "x", 2021, 1, 2, 0),
            play("s", "B", "x", 2021, 1, 3, 0),
        ];
        let top = top_artists(&plays, epoch(), 10);
        let names: Vec<_> = top.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_top_respects_cutoff_and_n() {
        let plays = vec![
            play("old", "A", "x", 2020, 1, 1, 0),
            play("new", "B", "x", 2021, 3, 1, 0),
            play("new", "C", "x", 2021, 3, 2, 0),
        ];
        let cutoff = Local.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let top = top_artists(&plays, cutoff, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "B");

        assert!(top_artists(&[], epoch(), 10).is_empty());
    }

    #[test]
    fn test_songs_and_albums_use_structured_keys() {
        // A hyphen inside a title must not bleed into the artist field.
        let plays = vec![play("Ashes - Remix", "Bowie", "Scary", 2021, 1, 1, 0)];
        let songs = top_songs(&plays, epoch(), 10);
        assert_eq!(songs[0].key.title, "Ashes - Remix");
        assert_eq!(songs[0].key.artist, "Bowie");

        let albums = top_albums(&plays, epoch(), 10);
        assert_eq!(albums[0].key.album, "Scary");
        assert_eq!(albums[0].key.artist, "Bowie");
    }

    #[test]
    fn test_month_labels_zero_padded() {
        let at = Local.with_ymd_and_hms(2021, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(month_label(at), "2021-01");
    }

    #[test]
    fn test_monthly_series_zero_fills_shared_axis() {
        let plays = vec![
            play("s", "A", "x", 2021, 1, 5, 0),
            play("s", "A", "x", 2021, 1, 20, 0),
            play("s", "B", "y", 2021, 2, 1, 0),
        ];
        let series = monthly_series(&plays);
        assert_eq!(series.months, vec!["2021-01", "2021-02"]);
        assert_eq!(series.traces.len(), 2);
        assert_eq!(series.traces[0].artist, "A");
        assert_eq!(series.traces[0].counts, vec![2, 0]);
        assert_eq!(series.traces[1].artist, "B");
        assert_eq!(series.traces[1].counts, vec![0, 1]);
    }

    #[test]
    fn test_monthly_series_axis_is_chronological() {
        // Input arrives newest first; the axis still comes out ascending.
        let plays = vec![
            play("s", "A", "x", 2021, 12, 1, 0),
            play("s", "A", "x", 2021, 2, 1, 0),
            play("s", "A", "x", 2020, 11, 1, 0),
        ];
        let series = monthly_series(&plays);
        assert_eq!(series.months, vec!["2020-11", "2021-02", "2021-12"]);
        assert_eq!(series.traces[0].counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_empty_series() {
        let series = monthly_series(&[]);
        assert!(series.months.is_empty());
        assert!(series.traces.is_empty());
    }

    #[test]
    fn test_clock_buckets_by_local_hour() {
        let history = History {
            plays: vec![
                play("s", "A", "x", 2021, 1, 1, 0),
                play("s", "A", "x", 2021, 1, 2, 23),
                play("s", "A", "x", 2021, 1, 3, 23),
            ],
            skipped: 2,
        };
        let face = scrobble_clock(&history);
        assert_eq!(face.hours[0], 1);
        assert_eq!(face.hours[23], 2);
        assert_eq!(face.total(), 3);
        assert_eq!(face.skipped, 2);
        assert_eq!(face.peak_hour(), Some(23));
    }

    #[test]
    fn test_clock_empty_history() {
        let face = scrobble_clock(&History::default());
        assert_eq!(face.hours, [0; CLOCK_HOURS]);
        assert_eq!(face.peak_hour(), None);
    }

    #[test]
    fn test_recent_plays_caps_at_fifty() {
        let plays: Vec<Play> = (0..120)
            .map(|i| play(&format!("s{i}"), "A", "x", 2021, 1, 1, 0))
            .collect();
        let history = History { plays, skipped: 0 };
        let recent = recent_plays(&history);
        assert_eq!(recent.len(), RECENT_PLAYS);
        assert_eq!(recent[0].title, "s0");

        let short = History {
            plays: vec![play("only", "A", "x", 2021, 1, 1, 0)],
            skipped: 0,
        };
        assert_eq!(recent_plays(&short).len(), 1);
    }

    #[test]
    fn test_last_scrobble_summary_rounds_hours() {
        let history = History {
            plays: vec![play("s", "A", "x", 2021, 1, 12, 20)],
            skipped: 0,
        };
        let now = Local.with_ymd_and_hms(2021, 1, 12, 23, 40, 0).unwrap();
        let line = last_scrobble_summary(&history, now).unwrap();
        // 3h40m rounds to 4.
        assert!(line.ends_with("(4h ago)"), "got: {line}");
        assert!(line.starts_with("12 Jan 2021 20:00"), "got: {line}");

        assert_eq!(last_scrobble_summary(&History::default(), now), None);
    }
}
