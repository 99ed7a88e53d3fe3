use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_KAGGLE_API_BASE: &str = "https://www.kaggle.com/api/v1";
pub const DEFAULT_DATASET: &str = "Cornell-University/arxiv";
pub const DEFAULT_SNAPSHOT_FILE_NAME: &str = "arxiv-metadata-oai-snapshot.json";

/// Upstream dataset settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub api_base: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub key: Option<String>,
    /// Dataset reference, `owner/slug`
    pub dataset: String,
    /// Archive entry holding the line-delimited snapshot
    pub snapshot_file_name: String,
    /// Where downloaded archives and extracted snapshots are kept
    pub cache_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_KAGGLE_API_BASE.to_string(),
            username: None,
            key: None,
            dataset: DEFAULT_DATASET.to_string(),
            snapshot_file_name: DEFAULT_SNAPSHOT_FILE_NAME.to_string(),
            cache_dir: env::temp_dir().join("arxiv-sync"),
        }
    }
}

impl SourceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_base: env::var("KAGGLE_API_BASE").unwrap_or(defaults.api_base),
            username: env::var("KAGGLE_USERNAME").ok(),
            key: env::var("KAGGLE_KEY").ok(),
            dataset: env::var("KAGGLE_DATASET").unwrap_or(defaults.dataset),
            snapshot_file_name: env::var("SNAPSHOT_FILE_NAME")
                .unwrap_or(defaults.snapshot_file_name),
            cache_dir: env::var("SYNC_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        })
    }

    /// Credentials are only needed when the Kaggle source is actually used
    pub fn validate_for_kaggle(&self) -> anyhow::Result<()> {
        if self.username.is_none() || self.key.is_none() {
            anyhow::bail!("KAGGLE_USERNAME and KAGGLE_KEY must be set to use the Kaggle source");
        }
        if !self.dataset.contains('/') {
            anyhow::bail!("KAGGLE_DATASET must look like owner/slug, got '{}'", self.dataset);
        }
        Ok(())
    }
}
