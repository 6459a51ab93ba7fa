use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub artwork: ArtworkConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl HttpConfig {
    /// URL the CLI uses to reach the daemon.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.bind_address, self.port)
    }
}

/// Knobs for the CLI's readiness poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Base interval between attempts; backoff doubles from here.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Retry budget after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the very first request. Unset means one base interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_delay_ms: Option<u64>,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms.unwrap_or(self.interval_ms))
    }
}

/// Upstream image search used by `POST /get-img`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkConfig {
    #[serde(default = "default_artwork_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_artwork_timeout_ms")]
    pub timeout_ms: u64,
}

impl ArtworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// User-configurable paths for uploads and cleaned history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for uploaded CSVs and the cleaned `output.json`.
    /// Defaults to `<data_dir>/uploads`.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            startup_delay_ms: None,
        }
    }
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_artwork_endpoint(),
            timeout_ms: default_artwork_timeout_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_HTTP_PORT
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_artwork_endpoint() -> String {
    "https://api.deezer.com".to_string()
}

fn default_artwork_timeout_ms() -> u64 {
    5_000
}

fn default_uploads_dir() -> PathBuf {
    platform::uploads_dir()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.http.port, platform::DAEMON_HTTP_PORT);
        assert_eq!(config.poll.interval_ms, 10_000);
        assert_eq!(config.poll.max_retries, 5);
        assert!(config.artwork.endpoint.starts_with("https://"));
        assert!(config.paths.uploads_dir.ends_with("spinlog/uploads"));
    }

    #[test]
    fn test_startup_delay_falls_back_to_interval() {
        let mut poll = PollConfig::default();
        assert_eq!(poll.startup_delay(), poll.interval());

        poll.startup_delay_ms = Some(20_000);
        assert_eq!(poll.startup_delay(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.poll.startup_delay_ms = Some(500);
        config.http.port = 9000;

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.http.port, 9000);
        assert_eq!(back.poll.startup_delay_ms, Some(500));
    }
}
