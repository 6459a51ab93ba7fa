use serde::{Deserialize, Serialize};

use crate::history::RawPlay;

/// Wire status string for successful replies.
pub const STATUS_SUCCESS: &str = "success";
/// Wire status string for error / not-ready replies.
pub const STATUS_ERROR: &str = "error";

/// Lifecycle of one fetch session as seen by consumers of the poller.
/// Terminal states are `Succeeded` and `Failed`; everything in between is
/// `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl FetchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Reply body of `GET /check-json`, the readiness endpoint.
///
/// `json_content` is present only when the daemon has a cleaned history to
/// hand out. A `success` status with an empty list still means "not ready":
/// the cleaner has produced nothing worth reporting yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_content: Option<Vec<RawPlay>>,
}

impl HistoryResponse {
    pub fn ready(message: impl Into<String>, records: Vec<RawPlay>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
            json_content: Some(records),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            json_content: None,
        }
    }

    /// The readiness predicate. Evaluated fresh on every response; a
    /// success status alone is not enough, the content must be non-empty.
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_SUCCESS
            && self
                .json_content
                .as_ref()
                .map(|records| !records.is_empty())
                .unwrap_or(false)
    }

    pub fn into_records(self) -> Vec<RawPlay> {
        self.json_content.unwrap_or_default()
    }
}

/// Reply body of the upload endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Echoed content, only for `POST /upload-json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_content: Option<serde_json::Value>,
    /// Underlying cause, only on 500 replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadReply {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file_path: None,
            json_content: None,
            error: None,
        }
    }

    pub fn saved(message: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::message(message)
        }
    }

    pub fn echoed(message: impl Into<String>, json_content: serde_json::Value) -> Self {
        Self {
            json_content: Some(json_content),
            ..Self::message(message)
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::message(message)
        }
    }
}

/// What kind of entity an artwork lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Artist,
    Album,
    Song,
}

impl ArtworkKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Song => "song",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "artist" => Some(Self::Artist),
            "album" => Some(Self::Album),
            "song" | "track" => Some(Self::Song),
            _ => None,
        }
    }
}

/// Body of `POST /get-img`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkRequest {
    pub target: String,
    /// Disambiguates album and song lookups; ignored for artists.
    #[serde(default)]
    pub artist: String,
    pub target_type: ArtworkKind,
}

/// Reply body of `POST /get-img`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkReply {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_img: Option<String>,
}

impl ArtworkReply {
    pub fn found(url: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: "Image found.".to_string(),
            get_img: Some(url.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            get_img: None,
        }
    }
}
