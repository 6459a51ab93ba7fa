//! Artwork lookup against the Deezer search API.
//!
//! One search request per (target, kind), results cached in-process for
//! the life of the daemon. Song lookups go through the track search and
//! take the cover of the first hit's album; artist and album lookups read
//! the image field straight off the first hit.

use serde::Deserialize;
use spinlog_proto::config::ArtworkConfig;
use spinlog_proto::protocol::ArtworkKind;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork request timed out")]
    Timeout,
    #[error("artwork request failed: {0}")]
    Upstream(String),
    #[error("no image in the search results")]
    NotFound,
}

#[derive(Clone)]
pub struct ArtworkClient {
    endpoint: String,
    client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl ArtworkClient {
    pub fn new(config: &ArtworkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Resolve an image URL for the target, consulting the cache first.
    pub async fn lookup(
        &self,
        target: &str,
        artist: &str,
        kind: ArtworkKind,
    ) -> Result<String, ArtworkError> {
        let cache_key = format!("{}-{}", target, kind.label());
        if let Some(url) = self.cache.read().await.get(&cache_key) {
            debug!("[artwork] cache hit for {}", cache_key);
            return Ok(url.clone());
        }

        // Artist searches use the bare name; album and song searches carry
        // the artist for disambiguation.
        let query = match kind {
            ArtworkKind::Artist => clean_query(target),
            ArtworkKind::Album | ArtworkKind::Song => {
                clean_query(&format!("{} {}", target, artist))
            }
        };

        let url = format!("{}/search/{}", self.endpoint, search_path(kind));
        info!("[artwork] searching {} for q={}", url, query);

        let reply: SearchReply = self
            .client
            .get(&url)
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;

        let image = reply
            .data
            .into_iter()
            .next()
            .and_then(|hit| hit.image_url(kind))
            .ok_or(ArtworkError::NotFound)?;

        self.cache
            .write()
            .await
            .insert(cache_key, image.clone());
        Ok(image)
    }
}

fn classify(e: reqwest::Error) -> ArtworkError {
    if e.is_timeout() {
        ArtworkError::Timeout
    } else {
        ArtworkError::Upstream(e.to_string())
    }
}

fn search_path(kind: ArtworkKind) -> &'static str {
    match kind {
        ArtworkKind::Artist => "artist",
        ArtworkKind::Album => "album",
        ArtworkKind::Song => "track",
    }
}

/// Hyphenate spaces, then drop parenthesised segments ("(Live)",
/// "(Remastered)") that hurt search relevance. An unmatched "(" is left
/// alone.
fn clean_query(raw: &str) -> String {
    let mut query = raw.trim().replace(' ', "-");
    while let Some(open) = query.find('(') {
        match query[open..].find(')') {
            Some(close) => query.replace_range(open..=open + close, ""),
            None => break,
        }
    }
    query
}

// ── Search reply shape ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SearchReply {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchHit {
    #[serde(default)]
    picture_medium: Option<String>,
    #[serde(default)]
    cover_medium: Option<String>,
    #[serde(default)]
    album: Option<HitAlbum>,
}

#[derive(Debug, Default, Deserialize)]
struct HitAlbum {
    #[serde(default)]
    cover_medium: Option<String>,
}

impl SearchHit {
    fn image_url(self, kind: ArtworkKind) -> Option<String> {
        match kind {
            ArtworkKind::Artist => self.picture_medium,
            ArtworkKind::Album => self.cover_medium,
            ArtworkKind::Song => self.album.and_then(|a| a.cover_medium),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_query_hyphenates_and_strips_parens() {
        assert_eq!(clean_query("Daft Punk"), "Daft-Punk");
        assert_eq!(clean_query("Ashes to Ashes (2014 Remaster)"), "Ashes-to-Ashes-");
        assert_eq!(clean_query("One (Live) Two (Demo)"), "One--Two-");
        // Unmatched parenthesis survives untouched.
        assert_eq!(clean_query("Broken (take"), "Broken-(take");
    }

    #[test]
    fn test_search_paths_map_song_to_track() {
        assert_eq!(search_path(ArtworkKind::Artist), "artist");
        assert_eq!(search_path(ArtworkKind::Album), "album");
        assert_eq!(search_path(ArtworkKind::Song), "track");
    }

    fn reply(v: serde_json::Value) -> SearchReply {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_artist_image_comes_from_picture_medium() {
        let r = reply(json!({
            "data": [{ "picture_medium": "https://img/artist.jpg", "nb_fan": 9000 }]
        }));
        let hit = r.data.into_iter().next().unwrap();
        assert_eq!(
            hit.image_url(ArtworkKind::Artist).as_deref(),
            Some("https://img/artist.jpg")
        );
    }

    #[test]
    fn test_song_image_digs_into_album_cover() {
        let r = reply(json!({
            "data": [{
                "title": "Atomic",
                "album": { "cover_medium": "https://img/album.jpg", "title": "Eat to the Beat" }
            }]
        }));
        let hit = r.data.into_iter().next().unwrap();
        assert_eq!(
            hit.image_url(ArtworkKind::Song).as_deref(),
            Some("https://img/album.jpg")
        );
        // The same hit has no top-level cover, so an album read misses.
        let r = reply(json!({ "data": [{ "album": { "cover_medium": "x" } }] }));
        assert_eq!(
            r.data.into_iter().next().unwrap().image_url(ArtworkKind::Album),
            None
        );
    }

    #[test]
    fn test_empty_or_missing_data_yields_no_image() {
        let r = reply(json!({ "data": [] }));
        assert!(r.data.is_empty());
        let r = reply(json!({}));
        assert!(r.data.is_empty());
    }
}
