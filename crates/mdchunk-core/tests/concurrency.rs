#![allow(clippy::unwrap_used, clippy::expect_used)]

use mdchunk_core::{
    Chunker, ChunkerConfig, ConcurrentChunker, ErrorKind, ErrorMode, WorkerPool,
};
use std::collections::BTreeSet;

fn documents(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("# Doc {i}\n\nParagraph {i}.\n\n- a\n- b\n").into_bytes())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_matches_sequential_runs() {
    let config = ChunkerConfig {
        max_concurrency: 5,
        ..ChunkerConfig::default()
    };
    let docs = documents(50);
    let concurrent = ConcurrentChunker::new(config.clone()).unwrap();
    let (chunks, errors) = concurrent.chunk_documents(docs.clone()).await;

    assert_eq!(chunks.len(), 50);
    assert!(errors.iter().all(Option::is_none));

    let mut sequential = Chunker::new(config).unwrap();
    for (doc, batch_chunks) in docs.iter().zip(&chunks) {
        assert_eq!(&sequential.chunk_document(doc).unwrap(), batch_chunks);
    }

    let stats = concurrent.stats();
    assert_eq!(stats.documents_processed, 50);
    assert_eq!(stats.documents_failed, 0);
    let total: usize = chunks.iter().map(Vec::len).sum();
    assert_eq!(stats.total_chunks, u64::try_from(total).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn strict_failures_stay_in_their_slot() {
    let config = ChunkerConfig {
        max_chunk_size: 20,
        error_handling: ErrorMode::Strict,
        max_concurrency: 3,
        ..ChunkerConfig::default()
    };
    let docs = vec![
        b"short".to_vec(),
        b"a paragraph well beyond twenty bytes".to_vec(),
        b"# ok".to_vec(),
    ];
    let concurrent = ConcurrentChunker::new(config).unwrap();
    let batch = concurrent.process_batch(docs, 3).await;

    assert_eq!(batch.results.len(), 3);
    assert!(batch.results[0].error.is_none());
    assert_eq!(
        batch.results[1].error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::ChunkTooLarge)
    );
    assert!(batch.results[1].chunks.is_empty());
    assert!(batch.results[2].error.is_none());
    assert_eq!(batch.stats.processed_documents, 2);
    assert_eq!(batch.stats.failed_documents, 1);
    assert_eq!(concurrent.error_handler().error_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_pool_answers_every_submission() {
    let mut pool = WorkerPool::new(&ChunkerConfig::default(), 3, 4).unwrap();
    let mut submitted = BTreeSet::new();
    for doc in documents(10) {
        submitted.insert(pool.submit(doc).await.unwrap());
    }
    assert_eq!(submitted.len(), 10);

    let answered: BTreeSet<u64> = pool.shutdown().await.into_iter().map(|r| r.id).collect();
    assert_eq!(answered, submitted);
}
