use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_INDEX: &str = "arxiv-papers";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Search engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL, e.g. `https://search.example.com:443`
    pub endpoint: String,
    pub index: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: DEFAULT_INDEX.to_string(),
            username: None,
            password: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            endpoint: env::var("OPENSEARCH_ENDPOINT").unwrap_or(defaults.endpoint),
            index: env::var("OPENSEARCH_INDEX").unwrap_or(defaults.index),
            username: env::var("OPENSEARCH_USERNAME").ok(),
            password: env::var("OPENSEARCH_PASSWORD").ok(),
            request_timeout_secs: match env::var("OPENSEARCH_TIMEOUT_SECS") {
                Ok(v) => v
                    .parse()
                    .map_err(|_| anyhow::anyhow!("OPENSEARCH_TIMEOUT_SECS must be an integer"))?,
                Err(_) => defaults.request_timeout_secs,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            anyhow::bail!("OPENSEARCH_ENDPOINT must be an http(s) URL, got '{}'", self.endpoint);
        }
        if self.index.is_empty() || self.index.chars().any(|c| c.is_ascii_uppercase()) {
            anyhow::bail!("OPENSEARCH_INDEX must be a non-empty lowercase name");
        }
        Ok(())
    }
}
