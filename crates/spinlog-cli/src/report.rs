//! Plain-text rendering of the aggregate views.
//!
//! The rankings respect the requested window; the trend, clock, and
//! recent-plays sections always cover the whole history, since their whole
//! point is the long-term shape of it. Pure string building, so the tests
//! just look at the output.

use chrono::{DateTime, Local};
use spinlog_proto::aggregate::{
    self, ArtistTrace, ClockFace, MonthlySeries, Tally, Window, TOP_N,
};
use spinlog_proto::history::History;
use std::fmt::Display;
use std::fmt::Write as _;

/// Traces shown in the trend table. More becomes unreadable in a terminal.
const TREND_ARTISTS: usize = 5;
/// Width of a full bar on the scrobble clock.
const CLOCK_BAR: usize = 40;

pub fn render_report(history: &History, window: Window, now: DateTime<Local>) -> String {
    let cutoff = window.cutoff(now);
    let mut out = String::new();

    out.push_str("Scrobble report\n===============\n");
    match aggregate::last_scrobble_summary(history, now) {
        Some(line) => {
            let _ = writeln!(out, "Last scrobble: {}", line);
        }
        None => out.push_str("No plays recorded yet.\n"),
    }
    let _ = writeln!(out, "{} plays parsed, {} skipped", history.len(), history.skipped);
    out.push('\n');

    out.push_str(&render_ranking(
        &format!("Top artists ({})", window.label()),
        &aggregate::top_artists(&history.plays, cutoff, TOP_N),
    ));
    out.push('\n');
    out.push_str(&render_ranking(
        &format!("Top songs ({})", window.label()),
        &aggregate::top_songs(&history.plays, cutoff, TOP_N),
    ));
    out.push('\n');
    out.push_str(&render_ranking(
        &format!("Top albums ({})", window.label()),
        &aggregate::top_albums(&history.plays, cutoff, TOP_N),
    ));
    out.push('\n');

    out.push_str(&heading("Monthly trend"));
    out.push_str(&render_trend(&aggregate::monthly_series(&history.plays)));
    out.push('\n');

    out.push_str(&heading("Scrobble clock"));
    out.push_str(&render_clock(&aggregate::scrobble_clock(history)));
    out.push('\n');

    out.push_str(&heading("Recent plays"));
    out.push_str(&render_recent(history));

    out
}

fn heading(title: &str) -> String {
    format!("{}\n{}\n", title, "-".repeat(title.chars().count()))
}

fn render_ranking<K: Display>(title: &str, entries: &[Tally<K>]) -> String {
    let mut out = heading(title);
    if entries.is_empty() {
        out.push_str("  no plays in this window\n");
        return out;
    }
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. {:<44} {:>6}", i + 1, entry.key.to_string(), entry.plays);
    }
    out
}

/// Months as columns, the busiest artists as rows.
fn render_trend(series: &MonthlySeries) -> String {
    if series.months.is_empty() {
        return "  no plays yet\n".to_string();
    }

    let mut traces: Vec<&ArtistTrace> = series.traces.iter().collect();
    traces.sort_by(|a, b| trace_total(b).cmp(&trace_total(a)));
    traces.truncate(TREND_ARTISTS);

    let name_width = traces
        .iter()
        .map(|t| t.artist.chars().count())
        .max()
        .unwrap_or(0)
        .max(6);

    let mut out = String::new();
    out.push_str(&" ".repeat(name_width + 2));
    for month in &series.months {
        let _ = write!(out, "{:>9}", month);
    }
    out.push('\n');
    for trace in traces {
        let _ = write!(out, "  {:<width$}", trace.artist, width = name_width);
        for count in &trace.counts {
            let _ = write!(out, "{:>9}", count);
        }
        out.push('\n');
    }
    out
}

fn trace_total(trace: &ArtistTrace) -> usize {
    trace.counts.iter().sum()
}

fn render_clock(face: &ClockFace) -> String {
    let max = face.hours.iter().copied().max().unwrap_or(0);
    let mut out = String::new();
    for (hour, &count) in face.hours.iter().enumerate() {
        let bar = if max == 0 {
            0
        } else {
            (count * CLOCK_BAR).div_ceil(max)
        };
        let _ = writeln!(out, " {:02}  {:<width$}  {}", hour, "#".repeat(bar), count, width = CLOCK_BAR);
    }
    if let Some(peak) = face.peak_hour() {
        let _ = writeln!(out, "peak hour: {:02}:00", peak);
    }
    out
}

fn render_recent(history: &History) -> String {
    let recent = aggregate::recent_plays(history);
    if recent.is_empty() {
        return "  no plays yet\n".to_string();
    }
    let mut out = String::new();
    for play in recent {
        let _ = writeln!(
            out,
            "  {}  {} - {} ({})",
            play.played_at.format("%d %b %Y %H:%M"),
            play.title,
            play.artist,
            play.album
        );
    }
    out
}

// ── tests ────────────────────────────────────────────────────────────────────
