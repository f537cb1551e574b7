//! Per-document pipeline.
//!
//! [`Chunker::chunk_document`] drives one document through
//! validate → parse → strategize → post-process → sanitize. Every error
//! passes through the [`ErrorHandler`] exactly once, so the configured
//! [`ErrorMode`] decides what the caller sees:
//!
//! - `strict`: the first error aborts the document and is returned; no
//!   chunks are returned with it.
//! - `permissive`: errors are recorded and the best available result is
//!   returned (an empty list when the document could not be processed).
//! - `silent`: as permissive, without strategy fallback notifications.
//!
//! A strategy that fails or panics is contained at the call boundary. In
//! the non-strict modes the document is retried once with the `element`
//! strategy; the configured strategy stays in place for the next call.

use crate::config::{ChunkerConfig, PerformanceMode, StrategyConfig};
use crate::error::{ChunkerError, ErrorKind, Result};
use crate::events::{ChunkerEvent, SharedSink, TracingSink};
use crate::extract::{ContentExtractor, floor_char_boundary};
use crate::handler::{ErrorHandler, ErrorMode};
use crate::memory::MemoryGuard;
use crate::node::Node;
use crate::parser::{MarkdownParser, TreeParser};
use crate::pool::{PoolSet, Poolable};
use crate::profiling::{ComponentTimings, OperationTimer, PerformanceAccounting, PerformanceStats};
use crate::strategy::{ChunkContext, ChunkingStrategy, ElementStrategy, StrategyRegistry};
use crate::table::TableAnalyzer;
use crate::types::Chunk;
use crate::validate::OutputValidator;
use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// Largest document accepted, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 100 * 1024 * 1024;

/// Strategy used when the configured one fails.
pub const FALLBACK_STRATEGY: &str = "element";

/// Custom per-chunk metadata, run after the size limit is applied.
pub trait MetadataExtractor: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Entries to merge into the chunk's metadata.
    fn extract(&self, chunk: &Chunk) -> BTreeMap<String, String>;
}

/// Adds `word_count` and `char_count` computed from the chunk text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStatsExtractor;

impl MetadataExtractor for TextStatsExtractor {
    fn name(&self) -> &str {
        "text_stats"
    }

    fn extract(&self, chunk: &Chunk) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "word_count".to_string(),
                chunk.text.split_whitespace().count().to_string(),
            ),
            ("char_count".to_string(), chunk.text.chars().count().to_string()),
        ])
    }
}

/// Cut `chunk` down to `limit` content bytes on a char boundary.
///
/// Marks the chunk `truncated=true` with its `original_size` and recomputes
/// the hash. Returns `false`, leaving the chunk untouched, when it already
/// fits (or `limit` is 0).
pub fn truncate_chunk(chunk: &mut Chunk, limit: usize) -> bool {
    if limit == 0 || chunk.content.len() <= limit {
        return false;
    }
    let original_size = chunk.content.len();
    let cut = floor_char_boundary(&chunk.content, limit);
    chunk.content.truncate(cut);
    if chunk.text.len() > limit {
        let cut = floor_char_boundary(&chunk.text, limit);
        chunk.text.truncate(cut);
    }
    chunk
        .metadata
        .insert("truncated".to_string(), "true".to_string());
    chunk
        .metadata
        .insert("original_size".to_string(), original_size.to_string());
    chunk.rehash();
    true
}

/// What happened to one document, regardless of the error mode.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutcome {
    /// Chunks produced, empty when the document was aborted.
    pub chunks: Vec<Chunk>,
    /// Errors recorded while processing this document.
    pub errors: Vec<ChunkerError>,
    /// Error that ended processing early, if any.
    pub aborted: Option<ChunkerError>,
}

/// Single-threaded chunking pipeline.
pub struct Chunker {
    config: ChunkerConfig,
    parser: Box<dyn TreeParser>,
    registry: StrategyRegistry,
    strategy: Box<dyn ChunkingStrategy>,
    handler: ErrorHandler,
    accounting: PerformanceAccounting,
    validator: OutputValidator,
    tables: TableAnalyzer,
    extractors: Vec<Arc<dyn MetadataExtractor>>,
    pools: Option<PoolSet>,
    sink: SharedSink,
    timings: ComponentTimings,
}

impl fmt::Debug for Chunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunker")
            .field("strategy", &self.strategy.name())
            .field("mode", &self.handler.mode())
            .field("errors", &self.handler.error_count())
            .field("extractors", &self.extractors.len())
            .finish_non_exhaustive()
    }
}

impl Chunker {
    /// Chunker with the built-in strategies, reporting to `tracing`.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_components(config, StrategyRegistry::with_builtins(), TracingSink::shared())
    }

    /// Chunker resolving strategies from `registry` and reporting to `sink`.
    pub fn with_components(
        config: ChunkerConfig,
        registry: StrategyRegistry,
        sink: SharedSink,
    ) -> Result<Self> {
        config.validate()?;
        let mut strategy = registry.get(&config.chunking_strategy.name)?;
        strategy.configure(config.chunking_strategy.clone())?;

        let pools = config
            .enable_object_pooling
            .then(|| PoolSet::new(config.performance_mode.pool_retention()));

        debug!(
            strategy = strategy.name(),
            mode = %config.error_handling,
            pooled = pools.is_some(),
            "Chunker created"
        );

        Ok(Self {
            parser: Box::new(MarkdownParser::new()?),
            registry,
            strategy,
            handler: ErrorHandler::new(config.error_handling, Arc::clone(&sink)),
            accounting: PerformanceAccounting::new(),
            validator: OutputValidator::new(config.filter_empty_chunks),
            tables: TableAnalyzer::new(),
            extractors: Vec::new(),
            pools,
            sink,
            timings: ComponentTimings::new(),
            config,
        })
    }

    /// Replace the parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn TreeParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Record into `accounting` instead of a private instance.
    #[must_use]
    pub fn with_accounting(mut self, accounting: PerformanceAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    /// Active configuration.
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Name of the configured strategy.
    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Registered strategies.
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Error log of this chunker.
    pub const fn error_handler(&self) -> &ErrorHandler {
        &self.handler
    }

    /// Recorded errors in order.
    pub fn errors(&self) -> Vec<ChunkerError> {
        self.handler.errors()
    }

    /// Recorded errors of one kind.
    pub fn errors_by_kind(&self, kind: ErrorKind) -> Vec<ChunkerError> {
        self.handler.errors_by_kind(kind)
    }

    /// Forget recorded errors.
    pub fn clear_errors(&self) {
        self.handler.clear_errors();
    }

    /// Throughput counters.
    pub fn stats(&self) -> PerformanceStats {
        self.accounting.snapshot()
    }

    /// Shared accounting handle.
    pub const fn accounting(&self) -> &PerformanceAccounting {
        &self.accounting
    }

    /// Stage timings of the most recent document.
    pub const fn last_timings(&self) -> &ComponentTimings {
        &self.timings
    }

    /// Object pools, when pooling is enabled.
    pub const fn pools(&self) -> Option<&PoolSet> {
        self.pools.as_ref()
    }

    /// Run `extractor` on every emitted chunk.
    pub fn add_metadata_extractor(&mut self, extractor: Arc<dyn MetadataExtractor>) {
        self.extractors.push(extractor);
    }

    /// Switch to strategy `name` configured with `config`.
    ///
    /// The new configuration is validated first; on any error the current
    /// strategy and configuration stay active.
    pub fn set_strategy(&mut self, name: &str, mut config: StrategyConfig) -> Result<()> {
        name.clone_into(&mut config.name);
        let mut candidate = self.registry.get(name)?;
        candidate.configure(config.clone())?;
        info!(from = self.strategy.name(), to = name, "Switching chunking strategy");
        self.strategy = candidate;
        self.config.chunking_strategy = config;
        Ok(())
    }

    /// Chunk one document.
    ///
    /// In strict mode any error is returned and no chunks are. Otherwise
    /// errors are only recorded and the call succeeds.
    pub fn chunk_document(&mut self, input: &[u8]) -> Result<Vec<Chunk>> {
        let outcome = self.process(Some(input));
        self.finish(outcome)
    }

    /// Chunk a document given as text.
    pub fn chunk_str(&mut self, input: &str) -> Result<Vec<Chunk>> {
        self.chunk_document(input.as_bytes())
    }

    /// Like [`chunk_document`](Self::chunk_document); an absent document is
    /// an `InvalidInput` error.
    pub fn chunk_optional(&mut self, input: Option<&[u8]>) -> Result<Vec<Chunk>> {
        let outcome = self.process(input);
        self.finish(outcome)
    }

    fn finish(&self, outcome: DocumentOutcome) -> Result<Vec<Chunk>> {
        match outcome.aborted {
            Some(err) if self.handler.mode() == ErrorMode::Strict => Err(err),
            _ => Ok(outcome.chunks),
        }
    }

    /// Run the pipeline and report everything that happened, whatever the
    /// error mode.
    pub fn process(&mut self, input: Option<&[u8]>) -> DocumentOutcome {
        let timer = OperationTimer::with_accounting("chunk_document", self.accounting.clone());
        let errors_before = self.handler.error_count();
        let document_bytes = input.map_or(0, <[u8]>::len);
        self.timings.clear();
        self.sink.emit(&ChunkerEvent::PipelineStarted {
            document_bytes,
            strategy: self.strategy.name().to_string(),
        });

        let result = self.pipeline(input);
        let errors = self.handler.errors_since(errors_before);
        let outcome = match result {
            Ok(chunks) => {
                let chunk_bytes = chunks.iter().map(|c| c.content.len()).sum();
                let duration = timer.finish_document(document_bytes, chunks.len(), chunk_bytes);
                self.sink.emit(&ChunkerEvent::PipelineFinished {
                    chunks: chunks.len(),
                    errors: errors.len(),
                    duration,
                });
                DocumentOutcome {
                    chunks,
                    errors,
                    aborted: None,
                }
            },
            Err(err) => {
                let duration = timer.finish_failed();
                self.sink.emit(&ChunkerEvent::PipelineFinished {
                    chunks: 0,
                    errors: errors.len(),
                    duration,
                });
                DocumentOutcome {
                    chunks: Vec::new(),
                    errors,
                    aborted: Some(err),
                }
            },
        };
        self.trim_pools();
        outcome
    }

    /// The document state machine. An `Err` means the document was aborted;
    /// the error has already been through the handler.
    fn pipeline(&mut self, input: Option<&[u8]>) -> Result<Vec<Chunk>> {
        let Some(input) = input else {
            return Err(self.fail(ChunkerError::invalid_input("no document given")));
        };
        let source = self.validate_input(input)?;

        if source.trim().is_empty() {
            debug!("Blank document, nothing to chunk");
            return Ok(Vec::new());
        }

        let parser = &mut self.parser;
        let parsed = self.timings.time("parse", || parser.parse(&source));
        let root = match parsed {
            Ok(root) => root,
            Err(err) => return Err(self.fail(err)),
        };

        let chunks = self.strategize(&root, &source)?;
        let chunks = self.post_process(chunks)?;

        let validator = self.validator;
        let chunks = self
            .timings
            .time("sanitize", || validator.sanitize(chunks));
        self.emit_chunks(&chunks);
        Ok(chunks)
    }

    fn validate_input<'i>(&self, input: &'i [u8]) -> Result<Cow<'i, str>> {
        let limit = match self.config.memory_limit {
            0 => MAX_DOCUMENT_BYTES,
            limit => usize::try_from(limit).map_or(MAX_DOCUMENT_BYTES, |l| l.min(MAX_DOCUMENT_BYTES)),
        };
        if input.len() > limit {
            return Err(self.fail(
                ChunkerError::memory_exhausted(format!(
                    "document of {} bytes exceeds the {limit} byte limit",
                    input.len()
                ))
                .with_context("bytes", input.len())
                .with_context("limit", limit),
            ));
        }

        match std::str::from_utf8(input) {
            Ok(source) => Ok(Cow::Borrowed(source)),
            Err(utf8) => {
                let err = ChunkerError::invalid_input("document is not valid UTF-8")
                    .with_context("valid_up_to", utf8.valid_up_to())
                    .with_cause(utf8);
                self.report(err)?;
                Ok(String::from_utf8_lossy(input))
            },
        }
    }

    fn strategize(&mut self, root: &Node, source: &str) -> Result<Vec<Chunk>> {
        let extractor = ContentExtractor::new(source);
        let primary = {
            let mut guard = self.document_guard(source);
            let mut ctx = ChunkContext::new(&extractor, &self.tables, &mut guard)
                .with_pools(self.pools.as_ref());
            let strategy = &*self.strategy;
            self.timings
                .time("strategy", || execute(strategy, root, source, &mut ctx))
        };

        let chunks = match primary {
            Ok(chunks) => chunks,
            Err(err) if err.kind() == ErrorKind::MemoryExhausted => return Err(self.fail(err)),
            Err(err) => {
                let reason = err.message().to_string();
                let err = self.fail(err);
                if self.handler.mode() == ErrorMode::Strict
                    || self.strategy.name() == FALLBACK_STRATEGY
                {
                    return Err(err);
                }
                self.fall_back(root, source, &extractor, reason)?
            },
        };

        if self.handler.mode() == ErrorMode::Strict {
            if let Err(err) = self.validator.validate(&chunks) {
                return Err(self.fail(err));
            }
        }
        Ok(chunks)
    }

    fn fall_back(
        &mut self,
        root: &Node,
        source: &str,
        extractor: &ContentExtractor<'_>,
        reason: String,
    ) -> Result<Vec<Chunk>> {
        if !self.handler.suppresses_fallback_events() {
            self.sink.emit(&ChunkerEvent::StrategyFallback {
                from: self.strategy.name().to_string(),
                to: FALLBACK_STRATEGY.to_string(),
                reason,
            });
        }

        let fallback = ElementStrategy::new();
        let mut guard = self.document_guard(source);
        let mut ctx = ChunkContext::new(extractor, &self.tables, &mut guard)
            .with_pools(self.pools.as_ref());
        let result = self
            .timings
            .time("fallback", || execute(&fallback, root, source, &mut ctx));
        result.map_err(|err| self.fail(err))
    }

    fn post_process(&self, mut chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let mut pooled = match &self.pools {
            Some(pools) => Some(pools.chunk_buffer()?),
            None => None,
        };
        let mut local = Vec::new();
        let kept: &mut Vec<Chunk> = pooled.as_deref_mut().unwrap_or(&mut local);
        kept.reserve(chunks.len());

        for mut chunk in chunks.drain(..) {
            if chunk.chunk_type.is_known() && !self.config.type_enabled(&chunk.chunk_type) {
                continue;
            }
            if self.config.filter_empty_chunks && chunk.is_blank() {
                continue;
            }
            self.enforce_size(&mut chunk)?;
            for extractor in &self.extractors {
                chunk.metadata.extend(extractor.extract(&chunk));
            }
            kept.push(chunk);
        }
        // The pool keeps the strategy's emptied allocation in exchange.
        std::mem::swap(kept, &mut chunks);
        Ok(chunks)
    }

    fn emit_chunks(&self, chunks: &[Chunk]) {
        for chunk in chunks {
            self.sink.emit(&ChunkerEvent::ChunkEmitted {
                id: chunk.id,
                chunk_type: chunk.chunk_type.clone(),
                bytes: chunk.content.len(),
            });
        }
    }

    fn enforce_size(&self, chunk: &mut Chunk) -> Result<()> {
        let limit = self.config.max_chunk_size;
        if limit == 0 || chunk.content.len() <= limit {
            return Ok(());
        }
        self.report(
            ChunkerError::chunk_too_large(format!(
                "chunk {} has {} bytes, limit is {limit}",
                chunk.id,
                chunk.content.len()
            ))
            .with_context("chunk_id", chunk.id)
            .with_context("size", chunk.content.len())
            .with_context("limit", limit),
        )?;
        truncate_chunk(chunk, limit);
        Ok(())
    }

    fn document_guard(&self, source: &str) -> MemoryGuard {
        let mut guard = MemoryGuard::new(self.config.memory_limit, Arc::clone(&self.sink));
        guard.reserve(source.len());
        guard
    }

    /// Hand `error` to the handler; `Err` only in strict mode.
    fn report(&self, error: ChunkerError) -> Result<()> {
        self.accounting.record_error();
        self.handler.handle_error(error)
    }

    /// Hand an aborting `error` to the handler and give it back.
    fn fail(&self, error: ChunkerError) -> ChunkerError {
        self.accounting.record_error();
        match self.handler.handle_error(error.clone()) {
            Err(strict) => strict,
            Ok(()) => error,
        }
    }

    fn trim_pools(&self) {
        if let Some(pools) = &self.pools {
            if matches!(self.config.performance_mode, PerformanceMode::Memory) {
                pools.trim();
            }
        }
    }
}

impl Poolable for Chunker {
    fn reset(&mut self) {
        self.handler.clear_errors();
        self.timings.clear();
    }
}

/// Run `strategy`, converting a panic into `StrategyExecutionFailed`.
fn execute(
    strategy: &dyn ChunkingStrategy,
    root: &Node,
    source: &str,
    ctx: &mut ChunkContext<'_>,
) -> Result<Vec<Chunk>> {
    panic::catch_unwind(AssertUnwindSafe(|| strategy.chunk_document(root, source, ctx)))
        .unwrap_or_else(|payload| {
            Err(ChunkerError::strategy_failed(format!(
                "strategy '{}' panicked",
                strategy.name()
            ))
            .with_context("strategy", strategy.name())
            .with_context("panic", panic_message(payload.as_ref())))
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::types::ChunkType;

    #[derive(Debug, Clone)]
    struct Panicking(StrategyConfig);

    impl ChunkingStrategy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn describe(&self) -> &str {
            "always panics"
        }
        fn validate_config(&self, config: &StrategyConfig) -> Result<()> {
            config.validate_common()
        }
        fn config(&self) -> &StrategyConfig {
            &self.0
        }
        fn config_mut(&mut self) -> &mut StrategyConfig {
            &mut self.0
        }
        fn chunk_document(
            &self,
            _root: &Node,
            _source: &str,
            _ctx: &mut ChunkContext<'_>,
        ) -> Result<Vec<Chunk>> {
            panic!("boom");
        }
        fn clone_box(&self) -> Box<dyn ChunkingStrategy> {
            Box::new(self.clone())
        }
    }

    fn panicking_chunker(mode: ErrorMode, sink: Arc<MemorySink>) -> Chunker {
        let mut registry = StrategyRegistry::with_builtins();
        registry.register(Box::new(Panicking(StrategyConfig::named("panicking"))));
        let config = ChunkerConfig {
            error_handling: mode,
            chunking_strategy: StrategyConfig::named("panicking"),
            ..ChunkerConfig::default()
        };
        Chunker::with_components(config, registry, sink).unwrap()
    }

    #[test]
    fn test_title_and_body() {
        let mut chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let chunks = chunker.chunk_str("# Title\n\nBody text.").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_type, ChunkType::Heading);
        assert_eq!(chunks[0].level, 1);
        assert_eq!(chunks[0].text, "Title");
        assert_eq!(chunks[1].chunk_type, ChunkType::Paragraph);
        assert_eq!(chunks[1].text, "Body text.");
        assert!(chunker.last_timings().get_timing("parse").is_some());
        assert_eq!(chunker.stats().documents_processed, 1);
    }

    #[test]
    fn test_blank_document_is_empty() {
        let mut chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert!(chunker.chunk_str(" \n\t\n").unwrap().is_empty());
        assert!(!chunker.error_handler().has_errors());
    }

    #[test]
    fn test_strict_size_limit_aborts() {
        let config = ChunkerConfig {
            max_chunk_size: 10,
            error_handling: ErrorMode::Strict,
            ..ChunkerConfig::default()
        };
        let mut chunker = Chunker::new(config).unwrap();
        let err = chunker.chunk_str("# Very Long Heading Text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkTooLarge);
        assert_eq!(chunker.stats().documents_failed, 1);
    }

    #[test]
    fn test_permissive_size_limit_truncates() {
        let config = ChunkerConfig {
            max_chunk_size: 10,
            ..ChunkerConfig::default()
        };
        let mut chunker = Chunker::new(config).unwrap();
        let chunks = chunker.chunk_str("# Very Long Heading Text").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "# Very Lon");
        assert_eq!(chunks[0].metadata["truncated"], "true");
        assert_eq!(chunks[0].metadata["original_size"], "24");
        assert_eq!(chunks[0].hash, crate::content_hash("# Very Lon"));
        assert_eq!(chunker.errors_by_kind(ErrorKind::ChunkTooLarge).len(), 1);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut chunk = Chunk::new(0, ChunkType::Paragraph, "héllo".to_string(), "héllo".to_string());
        assert!(truncate_chunk(&mut chunk, 2));
        assert_eq!(chunk.content, "h");
        assert!(!truncate_chunk(&mut chunk, 2));
    }

    #[test]
    fn test_panicking_strategy_falls_back_once() {
        let sink = Arc::new(MemorySink::new());
        let mut chunker = panicking_chunker(ErrorMode::Permissive, Arc::clone(&sink));
        let chunks = chunker.chunk_str("# A\n\nb").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata["strategy"], "element");

        let failures = chunker.errors_by_kind(ErrorKind::StrategyExecutionFailed);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].context()["panic"], "boom");
        assert_eq!(sink.count("strategy_fallback"), 1);
        assert_eq!(chunker.strategy_name(), "panicking");
    }

    #[test]
    fn test_silent_mode_suppresses_fallback_event() {
        let sink = Arc::new(MemorySink::new());
        let mut chunker = panicking_chunker(ErrorMode::Silent, Arc::clone(&sink));
        assert_eq!(chunker.chunk_str("text").unwrap().len(), 1);
        assert_eq!(sink.count("strategy_fallback"), 0);
        assert_eq!(sink.count("error_recorded"), 1);
        assert_eq!(chunker.stats().errors, 1);
    }

    #[test]
    fn test_strict_mode_surfaces_panic() {
        let sink = Arc::new(MemorySink::new());
        let mut chunker = panicking_chunker(ErrorMode::Strict, sink);
        let err = chunker.chunk_str("text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StrategyExecutionFailed);
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = b"caf\xff text";
        let mut permissive = Chunker::new(ChunkerConfig::default()).unwrap();
        let chunks = permissive.chunk_document(bytes).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains('\u{fffd}'));
        assert_eq!(permissive.errors_by_kind(ErrorKind::InvalidInput).len(), 1);

        let mut strict = Chunker::new(ChunkerConfig {
            error_handling: ErrorMode::Strict,
            ..ChunkerConfig::default()
        })
        .unwrap();
        assert_eq!(
            strict.chunk_document(bytes).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_absent_document() {
        let mut chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert!(chunker.chunk_optional(None).unwrap().is_empty());
        assert_eq!(chunker.errors()[0].kind(), ErrorKind::InvalidInput);

        let outcome = chunker.process(None);
        assert_eq!(outcome.aborted.unwrap().kind(), ErrorKind::InvalidInput);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_memory_limit_rejects_large_input() {
        let config = ChunkerConfig {
            memory_limit: 8,
            error_handling: ErrorMode::Strict,
            ..ChunkerConfig::default()
        };
        let mut chunker = Chunker::new(config).unwrap();
        let err = chunker.chunk_str("more than eight bytes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryExhausted);
    }

    #[test]
    fn test_enabled_types_and_extractors() {
        let config = ChunkerConfig {
            enabled_types: vec![ChunkType::Paragraph],
            ..ChunkerConfig::default()
        };
        let mut chunker = Chunker::new(config).unwrap();
        chunker.add_metadata_extractor(Arc::new(TextStatsExtractor));
        let chunks = chunker.chunk_str("# Skip\n\nthree short words\n").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].metadata["word_count"], "3");
        assert_eq!(chunks[0].metadata["char_count"], "17");
    }

    #[test]
    fn test_failed_strategy_switch_keeps_previous() {
        let mut chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let mut bad = StrategyConfig::named("hierarchical");
        bad.max_depth = 9;
        assert!(chunker.set_strategy("hierarchical", bad).is_err());
        assert!(chunker.set_strategy("missing", StrategyConfig::default()).is_err());
        assert_eq!(chunker.strategy_name(), "element");
        assert_eq!(chunker.config().chunking_strategy.name, "element");

        chunker
            .set_strategy("document", StrategyConfig::default())
            .unwrap();
        assert_eq!(chunker.config().chunking_strategy.name, "document");
        assert_eq!(chunker.chunk_str("a\n\nb").unwrap().len(), 1);
    }

    #[test]
    fn test_pipeline_events() {
        let sink = Arc::new(MemorySink::new());
        let mut chunker = Chunker::with_components(
            ChunkerConfig::default(),
            StrategyRegistry::with_builtins(),
            sink.clone(),
        )
        .unwrap();
        chunker.chunk_str("one\n\ntwo").unwrap();
        assert_eq!(sink.count("pipeline_started"), 1);
        assert_eq!(sink.count("chunk_emitted"), 2);
        assert_eq!(sink.count("pipeline_finished"), 1);
    }

    #[derive(Debug)]
    struct BrokenParser;

    impl TreeParser for BrokenParser {
        fn parse(&mut self, _source: &str) -> Result<Node> {
            Err(ChunkerError::parsing_failed("grammar unavailable"))
        }
    }

    fn broken_chunker(mode: ErrorMode) -> Chunker {
        let config = ChunkerConfig {
            error_handling: mode,
            ..ChunkerConfig::default()
        };
        Chunker::new(config)
            .unwrap()
            .with_parser(Box::new(BrokenParser))
    }

    #[test]
    fn test_parse_failure_in_strict_mode() {
        let mut chunker = broken_chunker(ErrorMode::Strict);
        let err = chunker.chunk_str("# Title").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParsingFailed);
        assert_eq!(chunker.stats().documents_failed, 1);
    }

    #[test]
    fn test_parse_failure_in_permissive_mode() {
        let mut chunker = broken_chunker(ErrorMode::Permissive);
        assert!(chunker.chunk_str("# Title").unwrap().is_empty());
        assert_eq!(chunker.errors_by_kind(ErrorKind::ParsingFailed).len(), 1);

        let outcome = chunker.process(Some(b"# Title"));
        assert!(outcome.chunks.is_empty());
        assert_eq!(
            outcome.aborted.map(|e| e.kind()),
            Some(ErrorKind::ParsingFailed)
        );
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_memory_mode_trims_pools_after_each_document() {
        let fill = |chunker: &Chunker| {
            let pools = chunker.pools().unwrap();
            let held: Vec<_> = (0..2).map(|_| pools.string_buffer().unwrap()).collect();
            drop(held);
            assert_eq!(pools.string_stats().available, 2);
        };

        let mut memory = Chunker::new(ChunkerConfig {
            performance_mode: PerformanceMode::Memory,
            ..ChunkerConfig::default()
        })
        .unwrap();
        fill(&memory);
        memory.chunk_str("# Title\n\nBody text.").unwrap();
        let pools = memory.pools().unwrap();
        assert!(pools.string_stats().available <= 1);
        assert!(pools.chunk_stats().available <= 1);

        let mut balanced = Chunker::new(ChunkerConfig::default()).unwrap();
        fill(&balanced);
        balanced.chunk_str("# Title\n\nBody text.").unwrap();
        assert!(balanced.pools().unwrap().string_stats().available >= 2);
    }

    #[test]
    fn test_chunk_buffer_is_returned_to_pool() {
        let mut chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        chunker.chunk_str("one\n\ntwo").unwrap();
        chunker.chunk_str("three\n\nfour").unwrap();
        let stats = chunker.pools().unwrap().chunk_stats();
        assert_eq!(stats.returns, 2);
        assert!(stats.hits >= 1);
    }

    #[test]
    fn test_emitted_ids_match_final_ids() {
        let sink = Arc::new(MemorySink::new());
        let config = ChunkerConfig {
            enabled_types: vec![ChunkType::Paragraph],
            ..ChunkerConfig::default()
        };
        let mut chunker =
            Chunker::with_components(config, StrategyRegistry::with_builtins(), sink.clone())
                .unwrap();
        let chunks = chunker.chunk_str("# Skipped\n\nfirst\n\n## Skipped\n\nsecond").unwrap();
        let emitted: Vec<i64> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                ChunkerEvent::ChunkEmitted { id, .. } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(emitted, vec![0, 1]);
        assert_eq!(chunks.iter().map(|c| c.id).collect::<Vec<_>>(), emitted);
    }

    mod fallback_logging {
        use super::*;
        use crate::events::NoopSink;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tracing::{Event, Level, Subscriber};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        struct WarnCounter(Arc<AtomicUsize>);

        impl<S: Subscriber> Layer<S> for WarnCounter {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                if *event.metadata().level() == Level::WARN {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        fn warnings_while(run: impl FnOnce()) -> usize {
            let count = Arc::new(AtomicUsize::new(0));
            let subscriber =
                tracing_subscriber::registry().with(WarnCounter(Arc::clone(&count)));
            tracing::subscriber::with_default(subscriber, run);
            count.load(Ordering::SeqCst)
        }

        fn fallback_chunker(mode: ErrorMode, sink: SharedSink) -> Chunker {
            let mut registry = StrategyRegistry::with_builtins();
            registry.register(Box::new(Panicking(StrategyConfig::named("panicking"))));
            let config = ChunkerConfig {
                error_handling: mode,
                chunking_strategy: StrategyConfig::named("panicking"),
                ..ChunkerConfig::default()
            };
            Chunker::with_components(config, registry, sink).unwrap()
        }

        #[test]
        fn test_silent_fallback_logs_nothing() {
            let warnings = warnings_while(|| {
                let mut chunker = fallback_chunker(ErrorMode::Silent, Arc::new(NoopSink));
                let chunks = chunker.chunk_str("# Title\n\nBody text.").unwrap();
                assert_eq!(chunks.len(), 2);
            });
            assert_eq!(warnings, 0);
        }

        #[test]
        fn test_permissive_fallback_logs_through_sink() {
            let warnings = warnings_while(|| {
                let mut chunker = fallback_chunker(ErrorMode::Permissive, TracingSink::shared());
                chunker.chunk_str("# Title\n\nBody text.").unwrap();
            });
            assert!(warnings >= 1);
        }
    }
}
