//! Command implementations.

mod batch;
mod chunk;
mod migrate;
mod strategies;

pub use batch::batch_files;
pub use chunk::chunk_files;
pub use migrate::migrate_config;
pub use strategies::list_strategies;

use anyhow::{Context, Result};
use mdchunk_core::profiling::format_bytes;
use mdchunk_core::{ChunkerConfig, ChunkerError, ErrorKind, PerformanceStats};
use serde::Serialize;
use std::path::Path;

use crate::cli::Cli;

/// Configuration from `--config` (or defaults) with the flag overrides applied.
pub fn resolve_config(cli: &Cli) -> Result<ChunkerConfig> {
    let mut config = match &cli.config {
        Some(path) => ChunkerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ChunkerConfig::default(),
    };
    if let Some(strategy) = &cli.strategy {
        config.chunking_strategy.name.clone_from(strategy);
    }
    if let Some(mode) = cli.mode {
        config.error_handling = mode;
    }
    if let Some(size) = cli.max_chunk_size {
        config.max_chunk_size = size;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read_document(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Serializable view of a recorded error.
#[derive(Debug, Serialize)]
struct ErrorView<'a> {
    kind: ErrorKind,
    message: &'a str,
}

impl<'a> From<&'a ChunkerError> for ErrorView<'a> {
    fn from(error: &'a ChunkerError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message(),
        }
    }
}

fn error_views(errors: &[ChunkerError]) -> Vec<ErrorView<'_>> {
    errors.iter().map(ErrorView::from).collect()
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Print accounting totals to stderr.
pub fn print_stats(stats: &PerformanceStats) {
    eprintln!("\n== Accounting ==");
    eprintln!(
        "documents: {} processed, {} failed",
        stats.documents_processed, stats.documents_failed
    );
    eprintln!(
        "chunks: {} ({} of content)",
        stats.total_chunks,
        format_bytes(stats.chunk_bytes)
    );
    eprintln!("input: {}", format_bytes(stats.total_bytes));
    eprintln!("errors: {}", stats.errors);
    eprintln!("time: {:.2}ms", stats.processing_time.as_secs_f64() * 1000.0);
    eprintln!(
        "throughput: {:.0} chunks/s, {}/s",
        stats.chunks_per_second,
        format_bytes(throughput_bytes(stats.bytes_per_second))
    );
    if stats.peak_memory > 0 {
        eprintln!("peak memory: {}", format_bytes(stats.peak_memory));
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Rates are non-negative and display-only
fn throughput_bytes(rate: f64) -> u64 {
    rate as u64
}
