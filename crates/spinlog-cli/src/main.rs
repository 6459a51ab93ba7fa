mod client;
mod poller;
mod report;

use anyhow::Context;
use chrono::Local;
use client::DaemonClient;
use spinlog_proto::aggregate::Window;
use spinlog_proto::config::Config;
use spinlog_proto::history::History;
use spinlog_proto::protocol::{ArtworkKind, FetchStatus, STATUS_SUCCESS};
use std::path::Path;

const USAGE: &str = "\
spinlog - scrobble history reports

Usage:
  spinlog upload <file.csv|file.json>    send an export to the daemon
  spinlog watch                          poll until the history is ready, then report
  spinlog report [window]                report over a ready history
  spinlog artwork <artist|album|song> <target> [artist]
                                         look up cover art

Windows: 1-week, 1-month (default), 6-months, 1-year, alltime
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so report output stays pipeable. Quiet unless
    // RUST_LOG says otherwise.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        usage_exit();
    };
    let rest = &args[1..];

    match command {
        "upload" => cmd_upload(rest.first()).await,
        "watch" => cmd_watch().await,
        "report" => cmd_report(rest.first()).await,
        "artwork" => cmd_artwork(rest).await,
        "help" | "--help" | "-h" => {
            print!("{USAGE}");
            Ok(())
        }
        _ => usage_exit(),
    }
}

fn usage_exit() -> ! {
    eprint!("{USAGE}");
    std::process::exit(2);
}

async fn cmd_upload(path: Option<&String>) -> anyhow::Result<()> {
    let Some(path) = path else { usage_exit() };
    let path = Path::new(path);

    let config = Config::load()?;
    let client = DaemonClient::new(&config.http)?;

    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let reply = if is_json {
        client.upload_json(path).await?
    } else {
        client.upload_csv(path).await?
    };

    println!("{}", reply.message);
    if let Some(stored) = reply.file_path {
        println!("stored as {}", stored);
    }
    if !is_json {
        println!("Run `spinlog watch` to wait for the cleaned history.");
    }
    Ok(())
}

async fn cmd_watch() -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = DaemonClient::new(&config.http)?;
    println!(
        "Waiting for history from {} ...",
        config.http.base_url()
    );

    let handle = poller::start_poll(
        client,
        &config.poll,
        Some(Box::new(|records| {
            println!("History ready: {} records.", records.len());
        })),
    );

    // Mirror the daemon's status lines while the session runs.
    let mut rx = handle.subscribe();
    let mut last_line = String::new();
    let snap = loop {
        let snap = rx.borrow().clone();
        if snap.status.is_terminal() {
            break snap;
        }
        if !snap.message.is_empty() && snap.message != last_line {
            println!("  daemon: {}", snap.message);
            last_line = snap.message.clone();
        }
        if rx.changed().await.is_err() {
            break rx.borrow().clone();
        }
    };

    match snap.status {
        FetchStatus::Succeeded => {
            let records = snap.payload.unwrap_or_default();
            let history = History::from_raw(&records);
            print!("{}", report::render_report(&history, Window::default(), Local::now()));
            Ok(())
        }
        _ => {
            if let Some(e) = snap.last_error {
                anyhow::bail!("{} (last error: {})", snap.message, e);
            }
            anyhow::bail!("{}", snap.message);
        }
    }
}

async fn cmd_report(window: Option<&String>) -> anyhow::Result<()> {
    let window = match window {
        None => Window::default(),
        Some(s) => match Window::parse(s) {
            Some(w) => w,
            None => usage_exit(),
        },
    };

    let config = Config::load()?;
    let client = DaemonClient::new(&config.http)?;
    let resp = client
        .check_json()
        .await
        .context("is the daemon running?")?;
    if !resp.is_ready() {
        anyhow::bail!("history not ready: {}", resp.message);
    }

    let records = resp.into_records();
    let history = History::from_raw(&records);
    print!("{}", report::render_report(&history, window, Local::now()));
    Ok(())
}

async fn cmd_artwork(args: &[String]) -> anyhow::Result<()> {
    let (Some(kind), Some(target)) = (args.first(), args.get(1)) else {
        usage_exit();
    };
    let Some(kind) = ArtworkKind::parse(kind) else {
        usage_exit();
    };
    let artist = args.get(2).cloned().unwrap_or_default();

    let config = Config::load()?;
    let client = DaemonClient::new(&config.http)?;
    let reply = client.get_img(target, &artist, kind).await?;
    if reply.status == STATUS_SUCCESS {
        println!("{}", reply.get_img.unwrap_or_default());
        Ok(())
    } else {
        anyhow::bail!("{}", reply.message);
    }
}
