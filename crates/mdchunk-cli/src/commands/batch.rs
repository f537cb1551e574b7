//! `batch`: concurrent chunking of files.

use anyhow::{Result, bail};
use mdchunk_core::{BatchStats, Chunk, ChunkerConfig, ConcurrentChunker};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use super::{ErrorView, display_path, error_views, print_stats, read_document};

#[derive(Serialize)]
struct BatchReport<'a> {
    stats: &'a BatchStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    results: Vec<FileResult<'a>>,
}

#[derive(Serialize)]
struct FileResult<'a> {
    file: String,
    chunks: &'a [Chunk],
    errors: Vec<ErrorView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<ErrorView<'a>>,
}

/// Chunk all files concurrently and print the batch report.
pub async fn batch_files(
    config: ChunkerConfig,
    files: &[PathBuf],
    concurrency: Option<usize>,
    stats_only: bool,
    show_stats: bool,
) -> Result<()> {
    let concurrency = concurrency.unwrap_or(config.max_concurrency);
    let documents = files
        .iter()
        .map(|path| read_document(path))
        .collect::<Result<Vec<_>>>()?;

    let chunker = ConcurrentChunker::new(config)?;
    let batch = chunker.process_batch(documents, concurrency).await;

    let results = if stats_only {
        Vec::new()
    } else {
        batch
            .results
            .iter()
            .zip(files)
            .map(|(result, path)| FileResult {
                file: display_path(path),
                chunks: &result.chunks,
                errors: error_views(&result.errors),
                aborted: result.error.as_ref().map(ErrorView::from),
            })
            .collect()
    };
    let report = BatchReport {
        stats: &batch.stats,
        results,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;

    if show_stats {
        print_stats(&chunker.stats());
    }

    if batch.stats.failed_documents > 0 {
        bail!(
            "{} of {} documents failed",
            batch.stats.failed_documents,
            files.len()
        );
    }
    Ok(())
}
