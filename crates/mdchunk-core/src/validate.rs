//! Output validation and repair.

use crate::error::{ChunkerError, Result};
use crate::types::{Chunk, ChunkType};
use std::collections::HashSet;

/// Checks and repairs chunk lists produced by strategies.
#[derive(Debug, Clone, Copy)]
pub struct OutputValidator {
    filter_empty: bool,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OutputValidator {
    /// Create a validator; `filter_empty` drops chunks with no text and no content.
    pub const fn new(filter_empty: bool) -> Self {
        Self { filter_empty }
    }

    /// Reject negative or duplicate ids, stopping at the first offender.
    pub fn validate(&self, chunks: &[Chunk]) -> Result<()> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.id < 0 {
                return Err(ChunkerError::strategy_failed(format!(
                    "chunk id {} is negative",
                    chunk.id
                ))
                .with_context("reason", "negative_id")
                .with_context("chunk_id", chunk.id));
            }
            if !seen.insert(chunk.id) {
                return Err(ChunkerError::strategy_failed(format!(
                    "chunk id {} is used more than once",
                    chunk.id
                ))
                .with_context("reason", "duplicate_id")
                .with_context("chunk_id", chunk.id));
            }
        }
        Ok(())
    }

    /// Restore the output invariants. Never fails; idempotent.
    ///
    /// Chunks whose type or id had to be repaired carry `sanitized=true`.
    /// Ids of an otherwise valid list are renumbered densely without tagging,
    /// which closes gaps left by filtering.
    pub fn sanitize(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = if self.filter_empty {
            chunks.into_iter().filter(|c| !c.is_blank()).collect()
        } else {
            chunks
        };

        for chunk in &mut chunks {
            if !chunk.chunk_type.is_known() {
                let original = std::mem::replace(&mut chunk.chunk_type, ChunkType::FALLBACK);
                chunk
                    .metadata
                    .insert("original_type".to_string(), original.as_str().to_string());
                mark_sanitized(chunk);
            }
        }

        let colliding = self.validate(&chunks).is_err();
        for (index, chunk) in (0_i64..).zip(chunks.iter_mut()) {
            if chunk.id != index {
                chunk.id = index;
                if colliding {
                    mark_sanitized(chunk);
                }
            }
        }
        chunks
    }
}

fn mark_sanitized(chunk: &mut Chunk) {
    chunk
        .metadata
        .insert("sanitized".to_string(), "true".to_string());
}
