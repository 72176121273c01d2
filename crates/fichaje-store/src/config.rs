//! Service configuration loaded from environment variables.
//!
//! All settings have defaults so the crates can be exercised against a
//! local service instance with zero configuration.

use fichaje_shared::constants::DEFAULT_AUDIO_BUCKET;

/// Connection settings for the backing services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the hosted service (REST, storage and realtime share it).
    /// Env: `FICHAJE_SERVICE_URL`
    /// Default: `http://localhost:54321`
    pub base_url: String,

    /// API key sent as both `apikey` and bearer token.
    /// Env: `FICHAJE_SERVICE_KEY`
    /// Default: empty (anonymous access, local development only).
    pub api_key: String,

    /// Storage bucket that holds voice-note blobs.
    /// Env: `FICHAJE_AUDIO_BUCKET`
    /// Default: `chat-audios`
    pub audio_bucket: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            audio_bucket: DEFAULT_AUDIO_BUCKET.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("FICHAJE_SERVICE_URL") {
            if !url.is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Ok(key) = std::env::var("FICHAJE_SERVICE_KEY") {
            config.api_key = key;
        }

        if let Ok(bucket) = std::env::var("FICHAJE_AUDIO_BUCKET") {
            if !bucket.is_empty() {
                config.audio_bucket = bucket;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_service() {
        let config = ServiceConfig::default();
        assert_eq!(config.base_url, "http://localhost:54321");
        assert_eq!(config.audio_bucket, "chat-audios");
        assert!(config.api_key.is_empty());
    }
}
