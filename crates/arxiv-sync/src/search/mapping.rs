use serde_json::{json, Value};

/// Short fields: names, titles
const SHORT_KEYWORD_LIMIT: u32 = 256;
/// Lucene caps a keyword term at 32766 bytes; 8191 chars fit even at 4 bytes each
const LONG_KEYWORD_LIMIT: u32 = 8191;

fn text_with_keyword() -> Value {
    text_with_keyword_limit(SHORT_KEYWORD_LIMIT)
}

fn long_text_with_keyword() -> Value {
    text_with_keyword_limit(LONG_KEYWORD_LIMIT)
}

fn text_with_keyword_limit(ignore_above: u32) -> Value {
    json!({
        "type": "text",
        "fields": { "keyword": { "type": "keyword", "ignore_above": ignore_above } }
    })
}

/// Index body for paper documents
pub fn papers_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "submitter": text_with_keyword(),
                "title": text_with_keyword(),
                "authors": text_with_keyword(),
                "authors_parsed": { "type": "keyword" },
                "authors_full_info": {
                    "type": "nested",
                    "properties": {
                        "fullname": text_with_keyword(),
                        "keyname": { "type": "keyword" },
                        "firstname": { "type": "keyword" },
                        "suffix": { "type": "keyword" },
                        "affiliation": { "type": "keyword" }
                    }
                },
                "comments": long_text_with_keyword(),
                "journal-ref": long_text_with_keyword(),
                "doi": { "type": "keyword" },
                "report-no": { "type": "keyword" },
                "categories": {
                    "type": "nested",
                    "properties": {
                        "full_category": { "type": "keyword" },
                        "category": { "type": "keyword" },
                        "subcategory": { "type": "keyword" }
                    }
                },
                "license": { "type": "keyword" },
                "abstract": long_text_with_keyword(),
                "versions": {
                    "type": "nested",
                    "properties": {
                        "version": { "type": "keyword" },
                        "created_str": { "type": "keyword" },
                        "created_timestamp": { "type": "date" }
                    }
                },
                "version_count": { "type": "integer" },
                // display only
                "update_date": { "type": "keyword", "index": false },
                "update_date_datetime": { "type": "date" }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_shape() {
        let mapping = papers_mapping();
        let props = &mapping["mappings"]["properties"];

        assert_eq!(props["id"]["type"], "keyword");
        assert_eq!(props["title"]["fields"]["keyword"]["type"], "keyword");
        for long in ["abstract", "comments", "journal-ref"] {
            assert_eq!(props[long]["type"], "text");
            assert_eq!(props[long]["fields"]["keyword"]["type"], "keyword", "{} needs .keyword", long);
            assert_eq!(props[long]["fields"]["keyword"]["ignore_above"], LONG_KEYWORD_LIMIT);
        }
        for short in ["submitter", "title", "authors"] {
            assert_eq!(props[short]["fields"]["keyword"]["ignore_above"], SHORT_KEYWORD_LIMIT);
        }
        for nested in ["authors_full_info", "categories", "versions"] {
            assert_eq!(props[nested]["type"], "nested", "{} should be nested", nested);
        }
        assert_eq!(props["update_date_datetime"]["type"], "date");
        assert_eq!(props["update_date"]["index"], false);
    }
}
