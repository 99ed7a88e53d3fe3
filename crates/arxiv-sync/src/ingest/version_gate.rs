//! Skip-or-proceed decision
//!
//! The stored marker is the version embedded in the newest
//! `{prefix}-{version}.json` object. "Newest" is either the most recently
//! modified object or the largest numeric suffix, see [`MarkerSelection`].

use arxiv_sync_common::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::source::DatasetSource;
use crate::storage::{ObjectInfo, ObjectStore};

/// How the stored marker is picked among marker objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSelection {
    /// Most recently modified object; ties go to the larger version
    #[default]
    LastModified,
    /// Largest version parsed from the key
    NumericSuffix,
}

impl FromStr for MarkerSelection {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last_modified" | "last-modified" => Ok(MarkerSelection::LastModified),
            "numeric_suffix" | "numeric-suffix" => Ok(MarkerSelection::NumericSuffix),
            _ => Err(SyncError::Config(format!("Invalid marker selection: {}", s))),
        }
    }
}

impl fmt::Display for MarkerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerSelection::LastModified => f.write_str("last_modified"),
            MarkerSelection::NumericSuffix => f.write_str("numeric_suffix"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Source version equals the stored marker
    UpToDate,
    /// Source reports an older version than the stored marker
    SourceOlder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Skip {
        source: i64,
        stored: i64,
        reason: SkipReason,
    },
    Proceed {
        source: i64,
        stored: i64,
    },
}

impl GateDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, GateDecision::Skip { .. })
    }

    pub fn source_version(&self) -> i64 {
        match self {
            GateDecision::Skip { source, .. } | GateDecision::Proceed { source, .. } => *source,
        }
    }
}

/// Key of the marker object for `version`
pub fn marker_key(prefix: &str, version: i64) -> String {
    format!("{}-{}.json", prefix, version)
}

/// Version embedded in a marker key, `None` for keys of any other shape
pub fn parse_marker_key(prefix: &str, key: &str) -> Option<i64> {
    key.strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Stored marker from a listing; `0` when there is no marker object
pub fn select_marker(objects: &[ObjectInfo], prefix: &str, selection: MarkerSelection) -> i64 {
    let candidates = objects
        .iter()
        .filter_map(|o| parse_marker_key(prefix, &o.key).map(|version| (o, version)));

    let best = match selection {
        MarkerSelection::LastModified => candidates
            .max_by(|(a, va), (b, vb)| a.last_modified.cmp(&b.last_modified).then(va.cmp(vb))),
        MarkerSelection::NumericSuffix => candidates.max_by_key(|(_, version)| *version),
    };

    best.map(|(_, version)| version).unwrap_or(0)
}

/// Pure comparison of the two version tokens
pub fn decide(source: i64, stored: i64) -> GateDecision {
    if source == stored {
        GateDecision::Skip {
            source,
            stored,
            reason: SkipReason::UpToDate,
        }
    } else if source < stored {
        GateDecision::Skip {
            source,
            stored,
            reason: SkipReason::SourceOlder,
        }
    } else {
        GateDecision::Proceed { source, stored }
    }
}

/// Reads the stored marker and decides whether a run should do any work
pub struct VersionGate<'a> {
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    selection: MarkerSelection,
}

impl<'a> VersionGate<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &'a str, selection: MarkerSelection) -> Self {
        Self {
            store,
            prefix,
            selection,
        }
    }

    pub async fn stored_marker(&self) -> Result<i64> {
        let objects = self.store.list(self.prefix).await?;
        let marker = select_marker(&objects, self.prefix, self.selection);
        debug!(
            objects = objects.len(),
            marker,
            selection = %self.selection,
            "Resolved stored marker"
        );
        Ok(marker)
    }

    /// Look up both versions and compare them
    ///
    /// The source is asked first; if it cannot answer nothing else happens.
    #[instrument(skip_all, fields(prefix = %self.prefix))]
    pub async fn evaluate(&self, source: &dyn DatasetSource) -> Result<GateDecision> {
        let source_version = source.latest_version().await.map_err(|e| match e {
            SyncError::SourceUnavailable(_) | SyncError::Timeout { .. } => e,
            other => SyncError::SourceUnavailable(other.to_string()),
        })?;
        let stored = self.stored_marker().await?;

        let decision = decide(source_version, stored);
        match decision {
            GateDecision::Skip {
                reason: SkipReason::UpToDate,
                ..
            } => info!(version = source_version, "Source file is up to date"),
            GateDecision::Skip {
                reason: SkipReason::SourceOlder,
                ..
            } => warn!(
                source = source_version,
                stored, "Source reports an older version than the stored marker"
            ),
            GateDecision::Proceed { .. } => {
                info!(source = source_version, stored, "New source version available")
            }
        }

        Ok(decision)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::storage::InMemoryObjectStore;
    use chrono::{TimeZone, Utc};

    fn info(key: &str, secs: i64) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).single(),
            size: 0,
        }
    }

    #[test]
    fn test_parse_marker_key() {
        assert_eq!(
            parse_marker_key("arxiv-metadata", "arxiv-metadata-1719708664153.json"),
            Some(1_719_708_664_153)
        );
        assert_eq!(parse_marker_key("arxiv-metadata", "arxiv-metadata-latest.json"), None);
        assert_eq!(parse_marker_key("arxiv-metadata", "parsed_1/metadata-1000.json"), None);
        assert_eq!(parse_marker_key("arxiv-metadata", "arxiv-metadata-12.txt"), None);
    }

    #[test]
    fn test_select_marker_strategies_can_differ() {
        // An older version re-uploaded later wins under last_modified only.
        let objects = vec![
            info("arxiv-metadata-200.json", 10),
            info("arxiv-metadata-100.json", 20),
            info("arxiv-metadata-notes.json", 30),
        ];
        assert_eq!(select_marker(&objects, "arxiv-metadata", MarkerSelection::LastModified), 100);
        assert_eq!(select_marker(&objects, "arxiv-metadata", MarkerSelection::NumericSuffix), 200);
    }

    #[test]
    fn test_select_marker_empty_is_zero() {
        assert_eq!(select_marker(&[], "arxiv-metadata", MarkerSelection::LastModified), 0);
    }

    #[test]
    fn test_decide() {
        assert!(matches!(
            decide(5, 5),
            GateDecision::Skip { reason: SkipReason::UpToDate, .. }
        ));
        assert!(matches!(
            decide(4, 5),
            GateDecision::Skip { reason: SkipReason::SourceOlder, .. }
        ));
        assert_eq!(decide(6, 5), GateDecision::Proceed { source: 6, stored: 5 });
        assert_eq!(decide(6, 0).source_version(), 6);
    }

    #[test]
    fn test_marker_selection_from_str() {
        assert_eq!("numeric_suffix".parse::<MarkerSelection>().unwrap(), MarkerSelection::NumericSuffix);
        assert_eq!("Last-Modified".parse::<MarkerSelection>().unwrap(), MarkerSelection::LastModified);
        assert!("newest".parse::<MarkerSelection>().is_err());
    }

    #[tokio::test]
    async fn test_evaluate_source_failure_happens_before_listing() {
        let store = InMemoryObjectStore::new();
        let gate = VersionGate::new(&store, "arxiv-metadata", MarkerSelection::LastModified);

        let err = gate.evaluate(&StaticSource::unavailable()).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_against_store() {
        let store = InMemoryObjectStore::new();
        store.put("arxiv-metadata-100.json", b"{}".to_vec(), "application/json").await.unwrap();
        let gate = VersionGate::new(&store, "arxiv-metadata", MarkerSelection::LastModified);

        let same = gate.evaluate(&StaticSource::new(100, "")).await.unwrap();
        assert!(same.is_skip());

        let newer = gate.evaluate(&StaticSource::new(101, "")).await.unwrap();
        assert_eq!(newer, GateDecision::Proceed { source: 101, stored: 100 });
    }
}
