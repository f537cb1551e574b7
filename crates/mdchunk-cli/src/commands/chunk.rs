//! `chunk`: sequential chunking of files.

use anyhow::{Result, bail};
use mdchunk_core::{Chunk, Chunker, ChunkerConfig};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{ErrorView, display_path, error_views, print_stats, read_document};

#[derive(Serialize)]
struct FileChunks<'a> {
    file: String,
    chunks: &'a [Chunk],
    errors: Vec<ErrorView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<ErrorView<'a>>,
}

/// Chunk every file with one chunker and print the results.
///
/// All files are processed even when some fail; the command fails afterwards
/// if any document was aborted.
pub fn chunk_files(
    config: ChunkerConfig,
    files: &[PathBuf],
    jsonl: bool,
    show_stats: bool,
) -> Result<()> {
    let mut chunker = Chunker::new(config)?;
    let mut reports = Vec::with_capacity(files.len());

    for path in files {
        let document = read_document(path)?;
        let outcome = chunker.process(Some(&document));
        chunker.clear_errors();
        info!(
            file = %path.display(),
            chunks = outcome.chunks.len(),
            errors = outcome.errors.len(),
            "Chunked file"
        );
        if let Some(err) = &outcome.aborted {
            warn!(file = %path.display(), error = %err, "Document aborted");
        }
        reports.push((path, outcome));
    }

    let views: Vec<FileChunks<'_>> = reports
        .iter()
        .map(|(path, outcome)| FileChunks {
            file: display_path(path),
            chunks: &outcome.chunks,
            errors: error_views(&outcome.errors),
            aborted: outcome.aborted.as_ref().map(ErrorView::from),
        })
        .collect();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if jsonl {
        for view in &views {
            serde_json::to_writer(&mut out, view)?;
            writeln!(out)?;
        }
    } else {
        serde_json::to_writer_pretty(&mut out, &views)?;
        writeln!(out)?;
    }

    if show_stats {
        print_stats(&chunker.stats());
    }

    let failed = views.iter().filter(|v| v.aborted.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} documents failed", views.len());
    }
    Ok(())
}
