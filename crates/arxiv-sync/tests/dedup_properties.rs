//! Property tests for deduplication and record normalization

use arxiv_sync::config::PipelineConfig;
use arxiv_sync::ingest::dedup::CollectingSink;
use arxiv_sync::ingest::{extract_authors, extract_categories, DedupConfig, PipelineOrchestrator, StreamingDeduplicator};
use arxiv_sync::search::InMemorySearchIndex;
use arxiv_sync::source::StaticSource;
use arxiv_sync::storage::InMemoryObjectStore;
use proptest::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

const INDEX: &str = "papers";

/// `(id, day)` pairs rendered as snapshot lines; the title records the position
fn snapshot(entries: &[(u8, u8)]) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .map(|(pos, (id, day))| {
            serde_json::json!({
                "id": format!("id-{}", id),
                "title": format!("line {}", pos),
                "update_date": format!("2023-01-{:02}", day),
            })
            .to_string()
        })
        .collect()
}

/// Newest line per id, ties going to the later line
fn expected_winners(entries: &[(u8, u8)]) -> HashMap<String, String> {
    let mut best: HashMap<u8, (u8, usize)> = HashMap::new();
    for (pos, (id, day)) in entries.iter().enumerate() {
        match best.get(id) {
            Some((best_day, _)) if day < best_day => {}
            _ => {
                best.insert(*id, (*day, pos));
            }
        }
    }
    best.into_iter()
        .map(|(id, (_, pos))| (format!("id-{}", id), format!("line {}", pos)))
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_index_converges_on_newest_record(
        entries in prop::collection::vec((0u8..8, 1u8..28), 1..60),
        chunk_size in 1usize..7,
    ) {
        let store = Arc::new(InMemoryObjectStore::new());
        let search = Arc::new(InMemorySearchIndex::new());
        let pipeline = PipelineOrchestrator::new(
            store,
            search.clone(),
            INDEX,
            PipelineConfig {
                chunk_size,
                chunk_concurrency: 1,
                ..PipelineConfig::default()
            },
        );
        let source = StaticSource::from_lines(1_000, snapshot(&entries));

        runtime().block_on(pipeline.run(&source)).unwrap();

        let expected = expected_winners(&entries);
        prop_assert_eq!(search.document_count(INDEX), expected.len());
        for (id, title) in &expected {
            let doc = search.document(INDEX, id).unwrap();
            prop_assert_eq!(doc["title"].as_str(), Some(title.as_str()));
        }
    }

    #[test]
    fn prop_chunks_hold_every_accepted_record(
        entries in prop::collection::vec((0u8..8, 1u8..28), 0..60),
        chunk_size in 1usize..7,
    ) {
        let body = snapshot(&entries).join("\n");
        let mut sink = CollectingSink::default();
        let stats = runtime()
            .block_on(
                StreamingDeduplicator::new(DedupConfig {
                    chunk_size,
                    ..DedupConfig::default()
                })
                .run(Cursor::new(body.into_bytes()), &mut sink),
            )
            .unwrap();

        let flushed: usize = sink.chunks.iter().map(|(_, records)| records.len()).sum();
        prop_assert_eq!(flushed as u64, stats.accepted);
        prop_assert_eq!(stats.accepted + stats.superseded, entries.len() as u64);

        // Every chunk but the last is full and sequences are cumulative.
        let mut total = 0u64;
        for (i, (sequence, records)) in sink.chunks.iter().enumerate() {
            if i + 1 < sink.chunks.len() {
                prop_assert_eq!(records.len(), chunk_size);
            }
            total += records.len() as u64;
            prop_assert_eq!(*sequence, total);
        }
    }

    #[test]
    fn prop_one_author_per_tuple(
        tuples in prop::collection::vec(
            prop::collection::vec("[A-Za-z]{0,8}", 2..6),
            0..10,
        ),
    ) {
        let authors = extract_authors(&tuples).unwrap();
        prop_assert_eq!(authors.len(), tuples.len());
        for (author, tuple) in authors.iter().zip(&tuples) {
            prop_assert_eq!(&author.keyname, &tuple[0]);
            prop_assert_eq!(&author.firstname, &tuple[1]);
            prop_assert_eq!(author.affiliation.len(), tuple.len().saturating_sub(3));
            prop_assert!(!author.fullname.starts_with(' '));
            prop_assert!(!author.fullname.contains("  "));
        }
    }

    #[test]
    fn prop_one_category_per_token(
        tokens in prop::collection::vec("[a-z-]{1,6}(\\.[A-Za-z]{1,4})?", 0..6),
    ) {
        let joined = tokens.join(" ");
        let categories = extract_categories(Some(&joined));
        prop_assert_eq!(categories.len(), tokens.len());
        for (category, token) in categories.iter().zip(&tokens) {
            prop_assert_eq!(&category.full_category, token);
            prop_assert_eq!(category.subcategory.is_some(), token.contains('.'));
            prop_assert!(token.starts_with(category.category.as_str()));
        }
    }
}
