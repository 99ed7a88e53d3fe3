//! Kaggle dataset source
//!
//! The version token is the dataset's `lastUpdated` as listed by the public
//! API. Snapshots arrive as a zip archive which is streamed to the cache
//! directory and then unpacked to expose the line-delimited metadata file.

use arxiv_sync_common::{time::iso_to_timestamp_ms, Result, SyncError};
use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument};

use super::{DatasetSource, SnapshotReader, SourceConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DatasetListing {
    #[serde(rename = "ref")]
    dataset_ref: String,
    #[serde(rename = "lastUpdated")]
    last_updated: String,
}

pub struct KaggleSource {
    client: reqwest::Client,
    config: SourceConfig,
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> SyncError {
    SyncError::SourceUnavailable(format!("{}: {}", context, err))
}

impl KaggleSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("arxiv-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.key.as_deref()),
            None => request,
        }
    }

    fn archive_path(&self) -> PathBuf {
        let slug = self
            .config
            .dataset
            .rsplit('/')
            .next()
            .unwrap_or(self.config.dataset.as_str());
        self.config.cache_dir.join(format!("{}.zip", slug))
    }

    /// Stream the dataset archive to disk
    #[instrument(skip(self))]
    async fn download_archive(&self) -> Result<PathBuf> {
        let url = format!(
            "{}/datasets/download/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.dataset
        );

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| unavailable("Dataset download failed", e))?;

        if !response.status().is_success() {
            return Err(unavailable(
                "Dataset download failed",
                format!("{} returned {}", url, response.status()),
            ));
        }

        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let output_path = self.archive_path();

        let total_size = response.content_length().unwrap_or(0);
        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Downloading {}", self.config.dataset));

        let mut file = tokio::fs::File::create(&output_path).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| unavailable("Dataset download interrupted", e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;

        pb.finish_with_message(format!("Downloaded {}", self.config.dataset));
        info!(bytes = downloaded, path = %output_path.display(), "Dataset archive downloaded");

        Ok(output_path)
    }
}

/// Extract `entry_name` from the archive into `target_dir`
///
/// Entries nested in a directory inside the archive are matched by file name.
pub fn extract_snapshot(archive_path: &Path, entry_name: &str, target_dir: &Path) -> Result<PathBuf> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| unavailable("Dataset archive is not a valid zip", e))?;

    let nested_suffix = format!("/{}", entry_name);
    let found = archive
        .file_names()
        .find(|name| *name == entry_name || name.ends_with(&nested_suffix))
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::SourceUnavailable(format!(
                "{} not found in {}",
                entry_name,
                archive_path.display()
            ))
        })?;

    let mut entry = archive
        .by_name(&found)
        .map_err(|e| unavailable("Failed to open archive entry", e))?;

    let output_path = target_dir.join(entry_name);
    let mut output = std::fs::File::create(&output_path)?;
    let written = std::io::copy(&mut entry, &mut output)?;

    debug!(entry = %found, bytes = written, "Extracted snapshot");
    Ok(output_path)
}

#[async_trait]
impl DatasetSource for KaggleSource {
    #[instrument(skip(self), fields(dataset = %self.config.dataset))]
    async fn latest_version(&self) -> Result<i64> {
        let url = format!("{}/datasets/list", self.config.api_base.trim_end_matches('/'));

        let response = self
            .request(&url)
            .query(&[("search", self.config.dataset.as_str())])
            .send()
            .await
            .map_err(|e| unavailable("Dataset listing failed", e))?;

        if !response.status().is_success() {
            return Err(unavailable(
                "Dataset listing failed",
                format!("{} returned {}", url, response.status()),
            ));
        }

        let listings: Vec<DatasetListing> = response
            .json()
            .await
            .map_err(|e| unavailable("Dataset listing is malformed", e))?;

        let listing = listings
            .into_iter()
            .find(|d| d.dataset_ref == self.config.dataset)
            .ok_or_else(|| {
                SyncError::SourceUnavailable(format!("Dataset {} not found", self.config.dataset))
            })?;

        let version = iso_to_timestamp_ms(&listing.last_updated)
            .map_err(|e| unavailable("Dataset lastUpdated is not a timestamp", e))?;

        info!(last_updated = %listing.last_updated, version, "Resolved latest dataset version");
        Ok(version)
    }

    #[instrument(skip(self), fields(dataset = %self.config.dataset))]
    async fn fetch_snapshot(&self) -> Result<SnapshotReader> {
        let archive_path = self.download_archive().await?;

        let entry_name = self.config.snapshot_file_name.clone();
        let target_dir = self.config.cache_dir.clone();
        let snapshot_path = tokio::task::spawn_blocking(move || {
            extract_snapshot(&archive_path, &entry_name, &target_dir)
        })
        .await
        .map_err(|e| unavailable("Snapshot extraction task failed", e))??;

        let file = tokio::fs::File::open(&snapshot_path).await?;
        Ok(Box::pin(BufReader::new(file)))
    }

    fn describe(&self) -> String {
        format!("kaggle:{}", self.config.dataset)
    }
}
