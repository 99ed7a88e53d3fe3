use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{DatasetSource, SnapshotReader};

/// Fixed in-memory snapshot
///
/// Counts calls so tests can assert that a skipped run never fetched.
#[derive(Debug, Default)]
pub struct StaticSource {
    version: Mutex<i64>,
    body: Mutex<Vec<u8>>,
    unavailable: bool,
    version_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(version: i64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            version: Mutex::new(version),
            body: Mutex::new(body.into()),
            ..Self::default()
        }
    }

    pub fn from_lines<I, S>(version: i64, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = String::new();
        for line in lines {
            body.push_str(line.as_ref());
            body.push('\n');
        }
        Self::new(version, body)
    }

    /// Source whose every call fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Publish a new upstream revision
    pub fn update(&self, version: i64, body: impl Into<Vec<u8>>) {
        *self.version.lock().unwrap_or_else(|p| p.into_inner()) = version;
        *self.body.lock().unwrap_or_else(|p| p.into_inner()) = body.into();
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetSource for StaticSource {
    async fn latest_version(&self) -> Result<i64> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(SyncError::SourceUnavailable("static source is offline".into()));
        }
        Ok(*self.version.lock().unwrap_or_else(|p| p.into_inner()))
    }

    async fn fetch_snapshot(&self) -> Result<SnapshotReader> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(SyncError::SourceUnavailable("static source is offline".into()));
        }
        let body = self.body.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Ok(Box::pin(Cursor::new(body)))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
