//! Raw record to search document

use arxiv_sync_common::{
    time::{parse_gmt_timestamp, parse_update_date},
    types::{AuthorInfo, CanonicalDocument, CategoryInfo, RawMetadataRecord, RawVersion, VersionInfo},
    Result, SyncError,
};

/// Build one author entry from a `[keyname, firstname, suffix, affiliation...]` tuple
pub fn extract_author(fields: &[String]) -> Result<AuthorInfo> {
    if fields.len() < 2 {
        return Err(SyncError::Validation(format!(
            "author needs at least keyname and firstname, got {:?}",
            fields
        )));
    }

    let keyname = fields[0].clone();
    let firstname = fields[1].clone();
    let suffix = fields.get(2).cloned().unwrap_or_default();

    let fullname = [firstname.as_str(), keyname.as_str(), suffix.as_str()]
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(AuthorInfo {
        fullname,
        keyname,
        firstname,
        suffix,
        affiliation: fields.iter().skip(3).cloned().collect(),
    })
}

pub fn extract_authors(authors_parsed: &[Vec<String>]) -> Result<Vec<AuthorInfo>> {
    authors_parsed.iter().map(|a| extract_author(a)).collect()
}

pub fn extract_categories(categories: Option<&str>) -> Vec<CategoryInfo> {
    categories
        .unwrap_or_default()
        .split_whitespace()
        .map(|token| match token.split_once('.') {
            Some((category, subcategory)) => CategoryInfo {
                full_category: token.to_string(),
                category: category.to_string(),
                subcategory: Some(subcategory.to_string()),
            },
            None => CategoryInfo {
                full_category: token.to_string(),
                category: token.to_string(),
                subcategory: None,
            },
        })
        .collect()
}

/// Parse every `created` timestamp; one bad entry fails the whole list
pub fn extract_versions(versions: &[RawVersion]) -> Result<Vec<VersionInfo>> {
    versions
        .iter()
        .map(|v| {
            let created_timestamp = parse_gmt_timestamp(&v.created).map_err(|e| {
                SyncError::Validation(format!("version {} has a bad created time: {}", v.version, e))
            })?;
            Ok(VersionInfo {
                version: v.version.clone(),
                created_str: v.created.clone(),
                created_timestamp,
            })
        })
        .collect()
}

pub fn transform_record(raw: &RawMetadataRecord) -> Result<CanonicalDocument> {
    let update_date = raw
        .update_date
        .as_deref()
        .ok_or_else(|| SyncError::Validation(format!("record {} has no update_date", raw.id)))?;
    let update_date_datetime = parse_update_date(update_date)
        .map_err(|e| SyncError::Validation(format!("record {}: {}", raw.id, e)))?;

    let versions = extract_versions(&raw.versions)
        .map_err(|e| SyncError::Validation(format!("record {}: {}", raw.id, e)))?;
    let authors_full_info = extract_authors(&raw.authors_parsed)
        .map_err(|e| SyncError::Validation(format!("record {}: {}", raw.id, e)))?;

    Ok(CanonicalDocument {
        id: raw.id.clone(),
        submitter: raw.submitter.clone(),
        title: raw.title.clone(),
        comments: raw.comments.clone(),
        journal_ref: raw.journal_ref.clone(),
        doi: raw.doi.clone(),
        report_no: raw.report_no.clone(),
        license: raw.license.clone(),
        abstract_text: raw.abstract_text.clone(),
        versions,
        version_count: raw.versions.len(),
        categories: extract_categories(raw.categories.as_deref()),
        update_date: raw.update_date.clone(),
        update_date_datetime,
        authors: raw.authors.clone(),
        authors_parsed: raw.authors_parsed.clone(),
        authors_full_info,
    })
}

/// Transform a batch, splitting successes from per-record failures
pub fn transform_batch(records: &[RawMetadataRecord]) -> (Vec<CanonicalDocument>, Vec<(String, SyncError)>) {
    let mut documents = Vec::with_capacity(records.len());
    let mut failures = Vec::new();

    for raw in records {
        match transform_record(raw) {
            Ok(doc) => documents.push(doc),
            Err(err) => failures.push((raw.id.clone(), err)),
        }
    }

    (documents, failures)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_author_full() {
        let author = extract_author(&strings(&["Smith", "John", "Jr", "MIT"])).unwrap();
        assert_eq!(
            author,
            AuthorInfo {
                fullname: "John Smith Jr".into(),
                keyname: "Smith".into(),
                firstname: "John".into(),
                suffix: "Jr".into(),
                affiliation: vec!["MIT".into()],
            }
        );
    }

    #[test]
    fn test_extract_author_collapses_whitespace() {
        let author = extract_author(&strings(&["Berger", "  E.  L. ", ""])).unwrap();
        assert_eq!(author.fullname, "E. L. Berger");
        assert_eq!(author.suffix, "");
        assert!(author.affiliation.is_empty());

        let author = extract_author(&strings(&["Plato", ""])).unwrap();
        assert_eq!(author.fullname, "Plato");
    }

    #[test]
    fn test_extract_author_rejects_single_field() {
        let err = extract_author(&strings(&["OnlyOneField"])).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(extract_authors(&[strings(&["A", "B"]), strings(&["C"])]).is_err());
    }

    #[test]
    fn test_extract_categories() {
        let cats = extract_categories(Some("cs.AI math.GT"));
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].full_category, "cs.AI");
        assert_eq!(cats[0].category, "cs");
        assert_eq!(cats[0].subcategory.as_deref(), Some("AI"));
        assert_eq!(cats[1].category, "math");
        assert_eq!(cats[1].subcategory.as_deref(), Some("GT"));
    }

    #[test]
    fn test_extract_categories_dotless_and_empty() {
        let cats = extract_categories(Some("hep-th  math-ph.x.y"));
        assert_eq!(cats[0].subcategory, None);
        assert_eq!(cats[0].category, "hep-th");
        assert_eq!(cats[1].category, "math-ph");
        assert_eq!(cats[1].subcategory.as_deref(), Some("x.y"));
        assert!(extract_categories(None).is_empty());
        assert!(extract_categories(Some("   ")).is_empty());
    }

    #[test]
    fn test_extract_versions_all_or_nothing() {
        let good = RawVersion { version: "v1".into(), created: "Mon, 2 Apr 2007 19:18:42 GMT".into() };
        let bad = RawVersion { version: "v2".into(), created: "yesterday".into() };

        let parsed = extract_versions(std::slice::from_ref(&good)).unwrap();
        assert_eq!(parsed[0].created_timestamp, 1_175_541_522_000);
        assert_eq!(parsed[0].created_str, good.created);

        assert!(matches!(extract_versions(&[good, bad]), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_transform_record() {
        let raw: RawMetadataRecord = serde_json::from_str(
            r#"{"id":"0704.0001","title":"Diphoton","categories":"hep-ph cs.AI",
                "versions":[{"version":"v1","created":"Mon, 2 Apr 2007 19:18:42 GMT"}],
                "update_date":"2008-11-13","authors":"C. Balazs",
                "authors_parsed":[["Balazs","C.",""]]}"#,
        )
        .unwrap();

        let doc = transform_record(&raw).unwrap();
        assert_eq!(doc.id, "0704.0001");
        assert_eq!(doc.version_count, 1);
        assert_eq!(doc.update_date_datetime, 1_226_534_400_000);
        assert_eq!(doc.categories.len(), 2);
        assert_eq!(doc.authors_full_info[0].fullname, "C. Balazs");
        assert_eq!(doc.authors.as_deref(), Some("C. Balazs"));
        assert_eq!(doc.authors_parsed, raw.authors_parsed);
    }

    #[test]
    fn test_transform_batch_isolates_failures() {
        let good: RawMetadataRecord =
            serde_json::from_str(r#"{"id":"a","update_date":"2020-01-01"}"#).unwrap();
        let bad: RawMetadataRecord = serde_json::from_str(
            r#"{"id":"b","update_date":"2020-01-01","authors_parsed":[["Solo"]]}"#,
        )
        .unwrap();

        let (docs, failures) = transform_batch(&[good, bad]);
        assert_eq!(docs.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
    }
}
