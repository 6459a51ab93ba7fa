//! Thin reqwest client for the daemon's HTTP API.
//!
//! Replies are decoded from the body regardless of HTTP status: the
//! daemon puts the outcome in the JSON (`status` / `message`), and a 404
//! from `/check-json` is an ordinary "not ready yet", not an error.

use crate::poller::Source;
use anyhow::Context;
use spinlog_proto::config::HttpConfig;
use spinlog_proto::protocol::{ArtworkKind, ArtworkReply, ArtworkRequest, HistoryResponse, UploadReply};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct DaemonClient {
    base_url: String,
    client: reqwest::Client,
}

impl DaemonClient {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.base_url(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        })
    }

    /// One probe of the readiness endpoint.
    pub async fn check_json(&self) -> anyhow::Result<HistoryResponse> {
        let url = format!("{}/check-json", self.base_url);
        debug!("[client] GET {}", url);
        let resp = self.client.get(&url).send().await?;
        let body: HistoryResponse = resp.json().await.context("undecodable daemon reply")?;
        Ok(body)
    }

    pub async fn upload_csv(&self, path: &Path) -> anyhow::Result<UploadReply> {
        self.upload("upload-csv", path).await
    }

    pub async fn upload_json(&self, path: &Path) -> anyhow::Result<UploadReply> {
        self.upload("upload-json", path).await
    }

    async fn upload(&self, route: &str, path: &Path) -> anyhow::Result<UploadReply> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/{}", self.base_url, route);
        debug!("[client] POST {} ({})", url, path.display());
        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let reply: UploadReply = resp.json().await.context("undecodable daemon reply")?;
        if !status.is_success() {
            anyhow::bail!("upload rejected ({}): {}", status, reply.message);
        }
        Ok(reply)
    }

    /// Cover-art lookup. The reply's `status` field carries the outcome.
    pub async fn get_img(
        &self,
        target: &str,
        artist: &str,
        kind: ArtworkKind,
    ) -> anyhow::Result<ArtworkReply> {
        let req = ArtworkRequest {
            target: target.to_string(),
            artist: artist.to_string(),
            target_type: kind,
        };
        let url = format!("{}/get-img", self.base_url);
        debug!("[client] POST {} ({} {})", url, kind.label(), target);
        let resp = self.client.post(&url).json(&req).send().await?;
        let reply: ArtworkReply = resp.json().await.context("undecodable daemon reply")?;
        Ok(reply)
    }
}

/// The poller probes `/check-json` through the same client.
impl Source for DaemonClient {
    fn fetch(&self) -> impl Future<Output = anyhow::Result<HistoryResponse>> + Send {
        let client = self.clone();
        async move { client.check_json().await }
    }
}
