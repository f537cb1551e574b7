//! Running many documents at once.
//!
//! The pipeline itself is synchronous. [`ConcurrentChunker`] fans documents
//! out over tokio's blocking pool, each one handled by a [`Chunker`] checked
//! out of an [`ObjectPool`] so no pipeline state is shared between documents
//! in flight. A semaphore bounds the number of documents in flight; the
//! submitting loop waits for a permit once the limit is reached.
//!
//! [`WorkerPool`] is the manual variant: submit documents one by one, get
//! results back by job id in completion order.

use crate::chunker::{Chunker, DocumentOutcome};
use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::events::{SharedSink, TracingSink};
use crate::handler::ErrorHandler;
use crate::pool::{ObjectPool, PoolStats};
use crate::profiling::{PerformanceAccounting, PerformanceStats, ResourceMonitor};
use crate::strategy::StrategyRegistry;
use crate::types::Chunk;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result for one document of a batch.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    /// Position of the document in the input.
    pub index: usize,
    /// Chunks produced.
    pub chunks: Vec<Chunk>,
    /// Errors recorded for this document.
    pub errors: Vec<ChunkerError>,
    /// Error that aborted the document, if any.
    pub error: Option<ChunkerError>,
}

/// Aggregate numbers of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    /// Documents that completed.
    pub processed_documents: usize,
    /// Documents that were aborted.
    pub failed_documents: usize,
    /// Chunks over all documents.
    pub total_chunks: usize,
    /// Errors recorded over all documents.
    pub total_errors: usize,
    /// Documents per second of wall time.
    pub documents_per_second: f64,
    /// Chunks per second of wall time.
    pub chunks_per_second: f64,
    /// Wall time of the batch in milliseconds.
    pub duration_ms: u64,
    /// Change of process resident memory over the batch.
    pub memory_delta_bytes: i64,
}

/// Per-document results, index-aligned with the input, plus totals.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One entry per input document, in input order.
    pub results: Vec<DocumentResult>,
    /// Totals.
    pub stats: BatchStats,
}

/// Fans the pipeline out across documents.
pub struct ConcurrentChunker {
    config: ChunkerConfig,
    chunkers: ObjectPool<Chunker>,
    handler: Arc<ErrorHandler>,
    accounting: PerformanceAccounting,
}

impl fmt::Debug for ConcurrentChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentChunker")
            .field("max_concurrency", &self.config.max_concurrency)
            .field("chunkers", &self.chunkers)
            .field("errors", &self.handler.error_count())
            .finish_non_exhaustive()
    }
}

impl ConcurrentChunker {
    /// Concurrent chunker with the built-in strategies, reporting to `tracing`.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_components(config, StrategyRegistry::with_builtins(), TracingSink::shared())
    }

    /// Concurrent chunker resolving strategies from `registry`.
    ///
    /// The configuration is checked by building one chunker up front, so a
    /// bad configuration fails here rather than per document.
    pub fn with_components(
        config: ChunkerConfig,
        registry: StrategyRegistry,
        sink: SharedSink,
    ) -> Result<Self> {
        Chunker::with_components(config.clone(), registry.clone(), Arc::clone(&sink))?;

        let accounting = PerformanceAccounting::new();
        let retention = if config.enable_object_pooling {
            config
                .performance_mode
                .pool_retention()
                .max(config.max_concurrency)
        } else {
            0
        };
        let factory = {
            let config = config.clone();
            let sink = Arc::clone(&sink);
            let accounting = accounting.clone();
            move || {
                Chunker::with_components(config.clone(), registry.clone(), Arc::clone(&sink))
                    .map(|chunker| chunker.with_accounting(accounting.clone()))
            }
        };

        Ok(Self {
            handler: Arc::new(ErrorHandler::new(config.error_handling, sink)),
            chunkers: ObjectPool::fallible(retention, factory),
            accounting,
            config,
        })
    }

    /// Errors of every document processed so far.
    pub fn error_handler(&self) -> &ErrorHandler {
        &self.handler
    }

    /// Shared throughput counters.
    pub fn stats(&self) -> PerformanceStats {
        self.accounting.snapshot()
    }

    /// Counters of the chunker pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.chunkers.stats()
    }

    /// Chunk `documents` with the configured concurrency.
    ///
    /// Both returned lists are index-aligned with the input; the error slot
    /// holds the error that aborted a document.
    pub async fn chunk_documents(
        &self,
        documents: Vec<Vec<u8>>,
    ) -> (Vec<Vec<Chunk>>, Vec<Option<ChunkerError>>) {
        let batch = self
            .process_batch(documents, self.config.max_concurrency)
            .await;
        batch
            .results
            .into_iter()
            .map(|result| (result.chunks, result.error))
            .unzip()
    }

    /// Chunk `documents` with at most `concurrency` in flight.
    pub async fn process_batch(&self, documents: Vec<Vec<u8>>, concurrency: usize) -> BatchResult {
        let concurrency = concurrency.max(1);
        let total = documents.len();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut monitor = ResourceMonitor::new();
        let started = Instant::now();
        info!(documents = total, concurrency, "Starting batch");

        let mut handles = Vec::with_capacity(total);
        for document in documents {
            // Waits here while `concurrency` documents are in flight.
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let pool = self.chunkers.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                process_pooled(&pool, &document)
            }));
        }

        let mut results = Vec::with_capacity(total);
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.unwrap_or_else(|join| {
                let err = ChunkerError::strategy_failed(format!("document task failed: {join}"))
                    .with_context("index", index);
                self.accounting.record_error();
                DocumentOutcome {
                    chunks: Vec::new(),
                    errors: vec![err.clone()],
                    aborted: Some(err),
                }
            });
            self.handler.absorb(outcome.errors.iter().cloned());
            results.push(DocumentResult {
                index,
                chunks: outcome.chunks,
                errors: outcome.errors,
                error: outcome.aborted,
            });
        }

        let elapsed = started.elapsed();
        self.accounting.update_memory(monitor.current_memory_bytes());
        let stats = batch_stats(&results, elapsed, monitor.memory_delta_bytes());
        info!(
            processed = stats.processed_documents,
            failed = stats.failed_documents,
            chunks = stats.total_chunks,
            duration_ms = stats.duration_ms,
            "Batch finished"
        );
        BatchResult { results, stats }
    }
}

fn process_pooled(pool: &ObjectPool<Chunker>, document: &[u8]) -> DocumentOutcome {
    match pool.acquire() {
        Ok(mut chunker) => chunker.process(Some(document)),
        Err(err) => {
            warn!(error = %err, "Could not build a chunker for a document");
            DocumentOutcome {
                chunks: Vec::new(),
                errors: vec![err.clone()],
                aborted: Some(err),
            }
        },
    }
}

#[allow(clippy::cast_precision_loss)] // Precision loss is acceptable for throughput figures
fn batch_stats(
    results: &[DocumentResult],
    elapsed: std::time::Duration,
    memory_delta_bytes: i64,
) -> BatchStats {
    let failed_documents = results.iter().filter(|r| r.error.is_some()).count();
    let total_chunks = results.iter().map(|r| r.chunks.len()).sum();
    let total_errors = results.iter().map(|r| r.errors.len()).sum();
    let seconds = elapsed.as_secs_f64();
    let rate = |count: usize| {
        if seconds > 0.0 {
            count as f64 / seconds
        } else {
            0.0
        }
    };
    BatchStats {
        processed_documents: results.len() - failed_documents,
        failed_documents,
        total_chunks,
        total_errors,
        documents_per_second: rate(results.len()),
        chunks_per_second: rate(total_chunks),
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        memory_delta_bytes,
    }
}

/// Outcome of one [`WorkerPool`] job.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Id returned by [`WorkerPool::submit`].
    pub id: u64,
    /// What happened to the document.
    pub outcome: DocumentOutcome,
}

struct Job {
    id: u64,
    document: Vec<u8>,
}

/// Fixed set of worker threads fed through a bounded job queue.
///
/// Every submitted id yields exactly one [`JobResult`]; results arrive in
/// completion order.
pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
    results: mpsc::UnboundedReceiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    next_id: u64,
    pending: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Start `workers` workers, each owning a chunker built from `config`,
    /// with room for `queue` waiting jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ChunkerConfig, workers: usize, queue: usize) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue.max(1));
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(workers.max(1));
        for worker in 0..workers.max(1) {
            let mut chunker = Chunker::new(config.clone())?;
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                debug!(worker, "Worker started");
                loop {
                    let job = job_rx.lock().blocking_recv();
                    let Some(job) = job else {
                        break;
                    };
                    let outcome = chunker.process(Some(&job.document));
                    chunker.clear_errors();
                    if result_tx.send(JobResult { id: job.id, outcome }).is_err() {
                        break;
                    }
                }
                debug!(worker, "Worker stopped");
            }));
        }

        Ok(Self {
            jobs: job_tx,
            results: result_rx,
            workers: handles,
            next_id: 0,
            pending: 0,
        })
    }

    /// Queue a document, waiting while the queue is full. Returns its id.
    pub async fn submit(&mut self, document: Vec<u8>) -> Result<u64> {
        let id = self.next_id;
        self.jobs
            .send(Job { id, document })
            .await
            .map_err(|_| ChunkerError::strategy_failed("worker pool has stopped"))?;
        self.next_id += 1;
        self.pending += 1;
        Ok(id)
    }

    /// Next finished job, or `None` once every submitted job was returned.
    pub async fn next_result(&mut self) -> Option<JobResult> {
        if self.pending == 0 {
            return None;
        }
        let result = self.results.recv().await?;
        self.pending -= 1;
        Some(result)
    }

    /// Jobs submitted but not yet returned.
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Collect all outstanding results, then stop the workers.
    pub async fn shutdown(mut self) -> Vec<JobResult> {
        let mut remaining = Vec::with_capacity(self.pending);
        while let Some(result) = self.next_result().await {
            remaining.push(result);
        }
        drop(self.jobs);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "Worker ended abnormally");
            }
        }
        remaining
    }
}
