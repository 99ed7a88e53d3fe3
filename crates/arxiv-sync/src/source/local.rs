use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::debug;

use super::{DatasetSource, SnapshotReader};

/// Snapshot file already on disk
///
/// The version is either given explicitly or taken from the file's
/// modification time in epoch milliseconds.
#[derive(Debug, Clone)]
pub struct LocalSnapshotSource {
    path: PathBuf,
    version: Option<i64>,
}

impl LocalSnapshotSource {
    pub fn new(path: impl Into<PathBuf>, version: Option<i64>) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }
}

#[async_trait]
impl DatasetSource for LocalSnapshotSource {
    async fn latest_version(&self) -> Result<i64> {
        if let Some(version) = self.version {
            return Ok(version);
        }

        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            SyncError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let modified = metadata.modified().map_err(|e| {
            SyncError::SourceUnavailable(format!("{}: no modification time: {}", self.path.display(), e))
        })?;
        let version = chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis();

        debug!(path = %self.path.display(), version, "Using file modification time as version");
        Ok(version)
    }

    async fn fetch_snapshot(&self) -> Result<SnapshotReader> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            SyncError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Box::pin(BufReader::new(file)))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
