//! The daemon's HTTP surface.
//!
//! Four routes: CSV upload (which also runs the cleaner), JSON upload,
//! the readiness endpoint the poller hits, and the artwork proxy. Replies
//! are JSON throughout, with the status strings and messages the clients
//! key on.

use crate::artwork::{ArtworkClient, ArtworkError};
use crate::ingest;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use spinlog_proto::config::Config;
use spinlog_proto::history;
use spinlog_proto::protocol::{ArtworkReply, ArtworkRequest, HistoryResponse, UploadReply};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Upload cap, matching the web client's advertised limit.
pub const MAX_UPLOAD_BYTES: usize = 12 * 1024 * 1024;
/// The cleaned history file the readiness endpoint serves.
pub const OUTPUT_JSON: &str = "output.json";

// ── Shared state ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub uploads_dir: PathBuf,
    pub artwork: ArtworkClient,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            uploads_dir: config.paths.uploads_dir.clone(),
            artwork: ArtworkClient::new(&config.artwork)?,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload-csv", post(upload_csv))
        .route("/upload-json", post(upload_json))
        .route("/check-json", get(check_json))
        .route("/get-img", post(get_img))
        // Margin over the file cap so the 12 MiB check below answers with
        // the proper message instead of a bare 413.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve on the configured address. Binding failure is fatal;
/// later serve errors are logged from the spawned task.
pub async fn start_server(config: &Config) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let state = AppState::new(config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {}", addr))?;
    info!("HTTP API listening on http://{}", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    }))
}

// ── Upload routes ────────────────────────────────────────────────────────────

enum FilePart {
    Found { filename: String, bytes: Bytes },
    Missing,
    Oversize,
}

/// Pull the `file` field out of a multipart body.
async fn read_file_part(mut multipart: Multipart) -> FilePart {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return FilePart::Missing,
            Err(e) => {
                warn!("[http] unreadable multipart payload: {}", e);
                return FilePart::Missing;
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return FilePart::Missing;
        }
        return match field.bytes().await {
            Ok(bytes) => FilePart::Found { filename, bytes },
            // The body limiter is the only plausible mid-field failure.
            Err(e) => {
                warn!("[http] failed to read upload body: {}", e);
                FilePart::Oversize
            }
        };
    }
}

async fn upload_csv(State(state): State<AppState>, multipart: Multipart) -> Response {
    let (filename, bytes) = match read_file_part(multipart).await {
        FilePart::Found { filename, bytes } => (filename, bytes),
        FilePart::Missing => {
            return reply(
                StatusCode::BAD_REQUEST,
                UploadReply::message("No file selected"),
            )
        }
        FilePart::Oversize => {
            return reply(
                StatusCode::BAD_REQUEST,
                UploadReply::message("File size exceeds the limit."),
            )
        }
    };

    if !has_extension(&filename, "csv") {
        return reply(
            StatusCode::BAD_REQUEST,
            UploadReply::message("Invalid file type. Please upload a CSV file."),
        );
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return reply(
            StatusCode::BAD_REQUEST,
            UploadReply::message("File size exceeds the limit."),
        );
    }

    let file_path = state.uploads_dir.join(sanitize_filename(&filename));
    if let Err(e) = save_upload(&file_path, &bytes).await {
        error!("[http] failed to save {}: {}", file_path.display(), e);
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            UploadReply::message("Error processing file."),
        );
    }

    // The cleaner does blocking file and parse work; keep it off the
    // async workers. The request waits for it so a 200 means the history
    // is really there.
    let parse_path = file_path.clone();
    let cleaned = tokio::task::spawn_blocking(move || ingest::clean_csv(&parse_path)).await;

    let cleaned = match cleaned {
        Ok(Ok(cleaned)) => cleaned,
        Ok(Err(e)) => {
            warn!("[http] cleaner rejected {}: {}", file_path.display(), e);
            let _ = tokio::fs::remove_file(&file_path).await;
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::message("Error processing file."),
            );
        }
        Err(e) => {
            error!("[http] cleaner task failed: {}", e);
            let _ = tokio::fs::remove_file(&file_path).await;
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::message("Error processing file."),
            );
        }
    };

    let output_path = state.uploads_dir.join(OUTPUT_JSON);
    if let Err(e) = history::write_raw_history(&output_path, &cleaned.records).await {
        error!("[http] failed to write {}: {}", output_path.display(), e);
        let _ = tokio::fs::remove_file(&file_path).await;
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            UploadReply::message("Error processing file."),
        );
    }

    info!(
        "[http] upload {} accepted: {} plays, {} rows skipped",
        file_path.display(),
        cleaned.records.len(),
        cleaned.rows_skipped
    );
    reply(
        StatusCode::OK,
        UploadReply::saved(
            "CSV file uploaded successfully.",
            file_path.display().to_string(),
        ),
    )
}

async fn upload_json(State(state): State<AppState>, multipart: Multipart) -> Response {
    let (filename, bytes) = match read_file_part(multipart).await {
        FilePart::Found { filename, bytes } => (filename, bytes),
        FilePart::Missing => {
            return reply(
                StatusCode::BAD_REQUEST,
                UploadReply::message("No file selected"),
            )
        }
        FilePart::Oversize => {
            return reply(
                StatusCode::BAD_REQUEST,
                UploadReply::message("File size exceeds the limit."),
            )
        }
    };

    if !has_extension(&filename, "json") {
        return reply(
            StatusCode::BAD_REQUEST,
            UploadReply::message("Invalid file type. Please upload a JSON file."),
        );
    }

    let file_path = state.uploads_dir.join(sanitize_filename(&filename));
    if let Err(e) = save_upload(&file_path, &bytes).await {
        error!("[http] failed to save {}: {}", file_path.display(), e);
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            UploadReply::failed("Error reading the JSON file.", e.to_string()),
        );
    }

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(content) => reply(
            StatusCode::OK,
            UploadReply::echoed("JSON file uploaded successfully.", content),
        ),
        Err(e) => {
            warn!("[http] undecodable JSON upload {}: {}", file_path.display(), e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::failed("Error decoding JSON content.", e.to_string()),
            )
        }
    }
}

// ── Readiness ────────────────────────────────────────────────────────────────

async fn check_json(State(state): State<AppState>) -> Response {
    let path = state.uploads_dir.join(OUTPUT_JSON);
    match history::load_raw_history(&path).await {
        Ok(records) => reply(
            StatusCode::OK,
            HistoryResponse::ready("JSON file found.", records),
        ),
        Err(e) if is_not_found(&e) => reply(
            StatusCode::NOT_FOUND,
            HistoryResponse::not_ready("JSON file not found yet."),
        ),
        Err(e) => {
            error!("[http] failed to read {}: {}", path.display(), e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                HistoryResponse::not_ready("Error reading JSON file."),
            )
        }
    }
}

// ── Artwork ──────────────────────────────────────────────────────────────────

async fn get_img(
    State(state): State<AppState>,
    body: Option<Json<serde_json::Value>>,
) -> Response {
    let Some(Json(value)) = body else {
        return reply(
            StatusCode::BAD_REQUEST,
            ArtworkReply::error("No data provided."),
        );
    };
    let Ok(req) = serde_json::from_value::<ArtworkRequest>(value) else {
        return reply(
            StatusCode::BAD_REQUEST,
            ArtworkReply::error("Missing required parameters."),
        );
    };
    if req.target.trim().is_empty() {
        return reply(
            StatusCode::BAD_REQUEST,
            ArtworkReply::error("Missing required parameters."),
        );
    }

    match state
        .artwork
        .lookup(&req.target, &req.artist, req.target_type)
        .await
    {
        Ok(url) => reply(StatusCode::OK, ArtworkReply::found(url)),
        Err(ArtworkError::Timeout) => reply(
            StatusCode::GATEWAY_TIMEOUT,
            ArtworkReply::error("Timeout error."),
        ),
        Err(ArtworkError::NotFound) => reply(
            StatusCode::NOT_FOUND,
            ArtworkReply::error("Image not found."),
        ),
        Err(ArtworkError::Upstream(e)) => {
            error!("[http] artwork lookup failed: {}", e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ArtworkReply::error("Error fetching image."),
            )
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

async fn save_upload(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn has_extension(filename: &str, ext: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Basename only, unusual characters flattened to underscores.
fn sanitize_filename(raw: &str) -> String {
    let base = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_check_is_case_insensitive() {
        assert!(has_extension("plays.csv", "csv"));
        assert!(has_extension("PLAYS.CSV", "csv"));
        assert!(has_extension("a.b.csv", "csv"));
        assert!(!has_extension("playscsv", "csv"));
        assert!(!has_extension("plays.txt", "csv"));
        assert!(!has_extension("csv", "csv"));
    }

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("plays.csv"), "plays.csv");
        assert_eq!(sanitize_filename("../../etc/passwd.csv"), "passwd.csv");
        assert_eq!(sanitize_filename("my plays!.csv"), "my_plays_.csv");
        assert_eq!(sanitize_filename(".."), "upload");
    }
}
