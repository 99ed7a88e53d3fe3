//! Queue-driven processing: collector plus independent consumers

use anyhow::Result;
use arxiv_sync::config::PipelineConfig;
use arxiv_sync::ingest::{ChunkConsumer, FinalizeOutcome, PipelineOrchestrator, RunOutcome};
use arxiv_sync::queue::InMemoryChunkQueue;
use arxiv_sync::search::InMemorySearchIndex;
use arxiv_sync::source::StaticSource;
use arxiv_sync::storage::InMemoryObjectStore;
use arxiv_sync_common::SyncError;
use std::sync::Arc;

fn line(id: usize) -> String {
    format!(r#"{{"id":"p{}","title":"paper {}","update_date":"2023-03-0{}"}}"#, id, id, id % 9 + 1)
}

fn pipeline(
    store: Arc<InMemoryObjectStore>,
    search: Arc<InMemorySearchIndex>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        store,
        search,
        "papers",
        PipelineConfig {
            chunk_size: 2,
            chunk_concurrency: 2,
            ..PipelineConfig::default()
        },
    )
}

#[tokio::test]
async fn test_two_consumers_finish_one_run() -> Result<()> {
    let store = Arc::new(InMemoryObjectStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let collector = pipeline(store.clone(), search.clone());
    let worker_a = pipeline(store.clone(), search.clone());
    let worker_b = pipeline(store.clone(), search.clone());
    let queue = InMemoryChunkQueue::new();
    let source = StaticSource::from_lines(77, (0..11).map(line));

    let outcome = collector.collect(&source, Some(&queue)).await?;
    assert!(matches!(
        outcome,
        RunOutcome::Collected {
            finalize: FinalizeOutcome::Pending { done: 0, total: Some(6) },
            ..
        }
    ));
    assert_eq!(queue.published(), 6);

    // At-least-once delivery: the same chunk arrives twice.
    queue.push_raw("parsed_77/metadata-4.json");

    let consumer_a = ChunkConsumer::new(&worker_a, &queue).with_batch_size(1);
    let consumer_b = ChunkConsumer::new(&worker_b, &queue).with_batch_size(1);
    let (a, b) = tokio::join!(consumer_a.drain(), consumer_b.drain());
    let (a, b) = (a?, b?);

    assert_eq!(a.processed + b.processed, 7);
    assert_eq!(a.failed + b.failed, 0);
    assert!(a.finalized + b.finalized >= 1);
    assert_eq!(queue.acked(), 7);
    assert_eq!(queue.in_flight_len(), 0);
    assert_eq!(search.document_count("papers"), 11);
    assert_eq!(collector.stored_marker().await?, 77);
    Ok(())
}

#[tokio::test]
async fn test_collect_resumes_from_manifest() -> Result<()> {
    let store = Arc::new(InMemoryObjectStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let orchestrator = pipeline(store.clone(), search.clone());
    let source = StaticSource::from_lines(88, (0..6).map(line));

    let lost = InMemoryChunkQueue::new();
    orchestrator.collect(&source, Some(&lost)).await?;
    let first = ChunkConsumer::new(&orchestrator, &lost)
        .with_batch_size(1)
        .poll_once()
        .await?;
    assert_eq!(first.processed, 1);

    // The remaining messages were lost; collecting again re-announces them.
    let queue = InMemoryChunkQueue::new();
    let outcome = orchestrator.collect(&source, Some(&queue)).await?;
    assert!(matches!(outcome, RunOutcome::Collected { .. }));
    assert_eq!(queue.published(), 2);
    assert_eq!(source.fetch_calls(), 1);

    let report = ChunkConsumer::new(&orchestrator, &queue).drain().await?;
    assert_eq!(report.processed, 2);
    assert_eq!(report.finalized, 1);
    assert_eq!(orchestrator.stored_marker().await?, 88);
    Ok(())
}

#[tokio::test]
async fn test_publish_failure_aborts_collect() -> Result<()> {
    let store = Arc::new(InMemoryObjectStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let orchestrator = pipeline(store.clone(), search);
    let queue = InMemoryChunkQueue::new();
    queue.fail_publish(true);
    let source = StaticSource::from_lines(99, (0..4).map(line));

    let err = orchestrator.collect(&source, Some(&queue)).await.unwrap_err();

    assert!(matches!(err, SyncError::Queue(_)));
    assert_eq!(orchestrator.stored_marker().await?, 0);
    assert!(!store.keys().contains(&"parsed_99/manifest.json".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_chunk_replay_after_marker_is_harmless() -> Result<()> {
    let store = Arc::new(InMemoryObjectStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let orchestrator = pipeline(store.clone(), search.clone());
    let source = StaticSource::from_lines(55, (0..3).map(line));
    orchestrator.run(&source).await?;

    let queue = InMemoryChunkQueue::new();
    queue.push_raw("parsed_55/metadata-2.json");
    let report = ChunkConsumer::new(&orchestrator, &queue).drain().await?;

    assert_eq!(report.processed, 1);
    assert_eq!(report.finalized, 0);
    assert_eq!(search.document_count("papers"), 3);
    assert_eq!(orchestrator.stored_marker().await?, 55);
    Ok(())
}

#[tokio::test]
async fn test_chunk_of_superseded_run_is_acked_without_indexing() -> Result<()> {
    let store = Arc::new(InMemoryObjectStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let orchestrator = pipeline(store.clone(), search.clone());

    let old = StaticSource::from_lines(
        100,
        [r#"{"id":"a","title":"old","update_date":"2020-01-01"}"#.to_string()],
    );
    let queue = InMemoryChunkQueue::new();
    orchestrator.collect(&old, Some(&queue)).await?;

    // A newer snapshot finishes in-process while the old chunk is still queued.
    let new = StaticSource::from_lines(
        200,
        [r#"{"id":"a","title":"new","update_date":"2024-01-01"}"#.to_string()],
    );
    orchestrator.run(&new).await?;
    assert_eq!(search.document("papers", "a").unwrap()["title"], "new");

    let report = ChunkConsumer::new(&orchestrator, &queue).drain().await?;

    assert_eq!(report.stale, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(queue.in_flight_len(), 0);
    let doc = search.document("papers", "a").unwrap();
    assert_eq!(doc["title"], "new");
    assert_eq!(doc["update_date_datetime"], 1_704_067_200_000_i64);
    assert_eq!(orchestrator.stored_marker().await?, 200);
    Ok(())
}
