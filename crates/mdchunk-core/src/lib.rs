//! # mdchunk-core
//!
//! Core functionality for mdchunk - turning markdown documents into ordered,
//! semantically typed chunks for search indexing, retrieval and analytics.
//!
//! Each chunk carries its markdown source, normalized plain text, a 1-based
//! source position, embedded links and images, a content hash and free-form
//! string metadata (table structure, heading paths, code languages, ...).
//!
//! ## Architecture
//!
//! - **Parsing**: tree-sitter based markdown parser producing an owned [`Node`] tree
//! - **Extraction**: per-node text, markdown reconstruction, positions, links, hashes
//! - **Tables**: structural analysis with defect reporting
//! - **Strategies**: pluggable chunk boundary policies behind a registry
//! - **Orchestration**: the per-document pipeline with strict, permissive and silent error modes
//! - **Concurrency**: pooled chunkers fanned out across documents on tokio
//! - **Accounting**: timing, throughput and memory counters
//!
//! ## Quick Start
//!
//! ```rust
//! use mdchunk_core::{ChunkType, Chunker, ChunkerConfig};
//!
//! let mut chunker = Chunker::new(ChunkerConfig::default())?;
//! let chunks = chunker.chunk_str("# Title\n\nBody text.")?;
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].chunk_type, ChunkType::Heading);
//! assert_eq!(chunks[1].text, "Body text.");
//! # Ok::<(), mdchunk_core::ChunkerError>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with a [`ChunkerError`] carrying an
//! [`ErrorKind`], a message, a context map and an optional cause:
//!
//! ```rust
//! use mdchunk_core::{Chunker, ChunkerConfig, ErrorKind, ErrorMode};
//!
//! let config = ChunkerConfig {
//!     max_chunk_size: 10,
//!     error_handling: ErrorMode::Strict,
//!     ..ChunkerConfig::default()
//! };
//! let mut chunker = Chunker::new(config)?;
//! match chunker.chunk_str("# Very Long Heading Text") {
//!     Ok(chunks) => println!("{} chunks", chunks.len()),
//!     Err(e) if e.kind() == ErrorKind::ChunkTooLarge => eprintln!("too large: {e}"),
//!     Err(e) => eprintln!("failed: {e}"),
//! }
//! # Ok::<(), mdchunk_core::ChunkerError>(())
//! ```

/// Per-document pipeline
pub mod chunker;
/// Concurrent batch processing
pub mod concurrent;
/// Configuration of the chunker and its strategies
pub mod config;
/// Error types and result aliases
pub mod error;
/// Structured pipeline events and sinks
pub mod events;
/// Per-node content extraction and hashing
pub mod extract;
/// Error accumulation and mode policy
pub mod handler;
/// Per-document memory budget
pub mod memory;
/// Legacy configuration migration
pub mod migrate;
/// Document tree model
pub mod node;
/// Tree-sitter based markdown parser
pub mod parser;
/// Object pools
pub mod pool;
/// Performance accounting utilities
pub mod profiling;
/// Chunking strategies and their registry
pub mod strategy;
/// Table structural analysis
pub mod table;
/// Core data types and structures
pub mod types;
/// Output validation and repair
pub mod validate;

// Re-export commonly used types
pub use chunker::{
    Chunker, DocumentOutcome, MAX_DOCUMENT_BYTES, MetadataExtractor, TextStatsExtractor,
    truncate_chunk,
};
pub use concurrent::{
    BatchResult, BatchStats, ConcurrentChunker, DocumentResult, JobResult, WorkerPool,
};
pub use config::{ChunkerConfig, PerformanceMode, StrategyConfig};
pub use error::{ChunkerError, ErrorKind, Result, Severity};
pub use events::{ChunkerEvent, EventSink, MemorySink, NoopSink, SharedSink, TracingSink};
pub use extract::{ContentExtractor, content_hash};
pub use handler::{ErrorHandler, ErrorMode};
pub use memory::MemoryGuard;
pub use migrate::{Migration, SourceFormat, migrate};
pub use node::{Node, NodeKind};
pub use parser::{MarkdownParser, TreeParser};
pub use pool::{ObjectPool, PoolSet, PoolStats, Poolable, Pooled};
pub use profiling::{PerformanceAccounting, PerformanceStats, ResourceMonitor};
pub use strategy::{
    ChunkContext, ChunkingStrategy, DocumentStrategy, ElementStrategy, HierarchicalStrategy,
    StrategyRegistry,
};
pub use table::{TableAnalyzer, TableInfo};
pub use types::*;
