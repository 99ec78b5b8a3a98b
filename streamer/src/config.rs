//! Runtime configuration.
//!
//! Every field has a default, so an absent or partial `watchme.json` is fine. The file is
//! located through `WATCHME_CONFIG`; OAuth credentials can also come from
//! `WATCHME_CLIENT_ID` / `WATCHME_CLIENT_SECRET`, which take precedence over the file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "watchme.json";
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// How far in the future a newly created broadcast is scheduled to start.
    pub scheduled_start_offset_ms: u64,
    /// Warm-up before asking the service to take a broadcast live.
    pub go_live_delay_ms: u64,
    pub privacy_status: String,
    pub stream_resolution: String,
    pub stream_frame_rate: String,
    pub ingestion_type: String,
    pub retry: RetryConfig,
    pub preview_resolution: Resolution,
    pub output_resolution: Resolution,
    pub token_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oauth: OAuthConfig::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: 30_000,
            scheduled_start_offset_ms: 5_000,
            go_live_delay_ms: 10_000,
            privacy_status: "public".to_string(),
            stream_resolution: "720p".to_string(),
            stream_frame_rate: "30fps".to_string(),
            ingestion_type: "rtmp".to_string(),
            retry: RetryConfig::default(),
            preview_resolution: Resolution {
                width: 1280,
                height: 720,
            },
            output_resolution: Resolution {
                width: 720,
                height: 1280,
            },
            token_path: PathBuf::from("tokens.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    // Installed applications using PKCE embed the secret; it is not treated as confidential.
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for a request that fails transiently, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Config {
    /// Loads the configuration from `WATCHME_CONFIG` (or [`DEFAULT_CONFIG_PATH`]), applying
    /// environment overrides.
    pub async fn load() -> eyre::Result<Self> {
        let path = std::env::var_os("WATCHME_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_file(&path).await?;

        if let Ok(id) = std::env::var("WATCHME_CLIENT_ID") {
            config.oauth.client_id = id;
        }
        if let Ok(secret) = std::env::var("WATCHME_CLIENT_SECRET") {
            config.oauth.client_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file; a missing file yields the defaults.
    pub async fn from_file(path: &Path) -> eyre::Result<Self> {
        use eyre::Context;

        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("check for config file {}", path.display()))?
        {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read config file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduled_start_offset_ms == 0 {
            return Err(Error::Configuration(
                "scheduled_start_offset_ms must be positive so broadcasts start in the future"
                    .to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.api_base_url.is_empty() {
            return Err(Error::Configuration("api_base_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn scheduled_start_offset(&self) -> Duration {
        Duration::from_millis(self.scheduled_start_offset_ms)
    }

    pub fn go_live_delay(&self) -> Duration {
        Duration::from_millis(self.go_live_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "go_live_delay_ms": 2500, "retry": { "max_attempts": 5 } }"#)
                .unwrap();
        assert_eq!(config.go_live_delay(), Duration::from_millis(2500));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.scheduled_start_offset_ms, 5_000);
        assert_eq!(config.privacy_status, "public");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn zero_start_offset_is_rejected() {
        let config = Config {
            scheduled_start_offset_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
        assert_eq!(retry.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = Config::from_file(Path::new("/definitely/not/here/watchme.json"))
            .await
            .unwrap();
        assert_eq!(config.go_live_delay_ms, 10_000);
    }
}
