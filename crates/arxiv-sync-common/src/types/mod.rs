//! Record and document types shared across arxiv-sync
//!
//! [`RawMetadataRecord`] mirrors one line of the upstream snapshot. Field names
//! follow the snapshot's JSON keys (`journal-ref`, `report-no`, `abstract`), so a
//! record serializes back into the same shape it was read from. This matters for
//! chunk objects, which carry raw records between stages.
//!
//! [`CanonicalDocument`] is the sink-ready form written to the search index.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Raw Snapshot Types
// ============================================================================

/// One `versions[]` entry of a raw record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVersion {
    /// Version label, e.g. "v1"
    pub version: String,
    /// Creation time, e.g. "Mon, 2 Apr 2007 19:18:42 GMT"
    pub created: String,
}

/// One line of the metadata snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetadataRecord {
    /// Natural key, unique per publication
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    pub submitter: Option<String>,

    /// Free-text author list as submitted
    pub authors: Option<String>,

    pub title: Option<String>,

    pub comments: Option<String>,

    #[serde(rename = "journal-ref")]
    pub journal_ref: Option<String>,

    pub doi: Option<String>,

    #[serde(rename = "report-no")]
    pub report_no: Option<String>,

    /// Whitespace-delimited category codes, e.g. "cs.AI math.GT"
    pub categories: Option<String>,

    pub license: Option<String>,

    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub versions: Vec<RawVersion>,

    /// Version signal of the record (plain date or ISO-8601)
    pub update_date: Option<String>,

    /// Author tuples: `[keyname, firstname, suffix, affiliation...]`
    #[serde(default)]
    pub authors_parsed: Vec<Vec<String>>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

// ============================================================================
// Canonical Document Types
// ============================================================================

/// Structured author entry derived from one `authors_parsed` tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub fullname: String,
    pub keyname: String,
    pub firstname: String,
    /// Empty when the tuple has no suffix field
    pub suffix: String,
    pub affiliation: Vec<String>,
}

/// Expanded category code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Original token, e.g. "cs.AI"
    pub full_category: String,
    /// Archive part before the first dot, e.g. "cs"
    pub category: String,
    /// Part after the first dot; `None` for dotless codes such as "hep-th"
    pub subcategory: Option<String>,
}

/// Version entry with its parsed creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub created_str: String,
    /// Epoch milliseconds
    pub created_timestamp: i64,
}

/// Document written to the search index, keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub id: String,
    pub submitter: Option<String>,
    pub title: Option<String>,
    pub comments: Option<String>,
    #[serde(rename = "journal-ref")]
    pub journal_ref: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "report-no")]
    pub report_no: Option<String>,
    pub license: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub versions: Vec<VersionInfo>,
    /// Length of the raw `versions` list
    pub version_count: usize,
    pub categories: Vec<CategoryInfo>,
    /// Original text, stored for display only
    pub update_date: Option<String>,
    /// Epoch milliseconds parsed from `update_date`
    pub update_date_datetime: i64,
    pub authors: Option<String>,
    pub authors_parsed: Vec<Vec<String>>,
    pub authors_full_info: Vec<AuthorInfo>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE_LINE: &str = r#"{"id":"0704.0001","submitter":"Pavel Nadolsky","authors":"C. Balazs, E. L. Berger","title":"Calculation of prompt diphoton production","comments":"37 pages","journal-ref":"Phys.Rev.D76:013009,2007","doi":"10.1103/PhysRevD.76.013009","report-no":"ANL-HEP-PR-07-12","categories":"hep-ph","license":null,"abstract":"  A fully differential calculation","versions":[{"version":"v1","created":"Mon, 2 Apr 2007 19:18:42 GMT"},{"version":"v2","created":"Tue, 24 Jul 2007 20:10:27 GMT"}],"update_date":"2008-11-13","authors_parsed":[["Balázs","C.",""],["Berger","E. L.",""]]}"#;

    #[test]
    fn test_deserialize_snapshot_line() {
        let record: RawMetadataRecord = serde_json::from_str(SAMPLE_LINE).unwrap();
        assert_eq!(record.id, "0704.0001");
        assert_eq!(record.journal_ref.as_deref(), Some("Phys.Rev.D76:013009,2007"));
        assert_eq!(record.report_no.as_deref(), Some("ANL-HEP-PR-07-12"));
        assert_eq!(record.license, None);
        assert_eq!(record.versions.len(), 2);
        assert_eq!(record.authors_parsed[1], vec!["Berger", "E. L.", ""]);
    }

    #[test]
    fn test_raw_record_keeps_snapshot_keys() {
        let record: RawMetadataRecord = serde_json::from_str(SAMPLE_LINE).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("journal-ref").is_some());
        assert!(value.get("report-no").is_some());
        assert!(value.get("abstract").is_some());
        assert!(value.get("journal_ref").is_none());
    }

    #[test]
    fn test_numeric_id_is_stringified() {
        let record: RawMetadataRecord =
            serde_json::from_str(r#"{"id": 704.0001, "update_date": "2008-11-13"}"#).unwrap();
        assert_eq!(record.id, "704.0001");
        assert!(record.versions.is_empty());
        assert!(record.authors_parsed.is_empty());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let result = serde_json::from_str::<RawMetadataRecord>(r#"{"title": "no id"}"#);
        assert!(result.is_err());
    }
}
