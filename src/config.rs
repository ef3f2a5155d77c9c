//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VideoError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Client and render configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key
    pub api_key: String,
    /// REST base URL, without trailing slash
    pub api_base: String,
    /// Model used for script generation
    pub text_model: String,
    /// Model used for video generation
    pub video_model: String,
    /// Delay between two status checks of one operation
    pub poll_interval: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Where downloaded clips are staged
    pub work_dir: PathBuf,
}

impl Config {
    /// Build a config around an explicit key, everything else defaulted.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(VideoError::Configuration(
                "API key is empty. Set GEMINI_API_KEY or pass --api-key".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(300),
            work_dir: PathBuf::from("./output"),
        })
    }

    /// Create config from environment variables (after loading `.env`).
    ///
    /// The key is read from `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Like [`Config::from_env`], but an explicit key wins over the environment.
    pub fn load(api_key: Option<String>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .map_err(|_| {
                    VideoError::Configuration(
                        "API key is not configured. Set GEMINI_API_KEY or API_KEY".to_string(),
                    )
                })?,
        };

        let mut config = Self::new(api_key)?;
        if let Ok(base) = std::env::var("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("GEMINI_TEXT_MODEL") {
            config.text_model = model;
        }
        if let Ok(model) = std::env::var("VEO_MODEL") {
            config.video_model = model;
        }
        config.poll_interval = std::env::var("VEO_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Ok(config)
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_is_rejected() {
        let err = Config::new("   ").unwrap_err();
        assert!(matches!(err, VideoError::Configuration(_)));
    }

    #[test]
    fn test_explicit_key_wins() {
        let config = Config::load(Some("from-flag".to_string())).unwrap();
        assert_eq!(config.api_key, "from-flag");
    }

    #[test]
    fn test_defaults() {
        let config = Config::new("key").unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.video_model, DEFAULT_VIDEO_MODEL);
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
    }

    #[test]
    fn test_api_base_trailing_slash_is_trimmed() {
        let config = Config::new("key").unwrap().with_api_base("http://localhost:9000/");
        assert_eq!(config.api_base, "http://localhost:9000");
    }
}
