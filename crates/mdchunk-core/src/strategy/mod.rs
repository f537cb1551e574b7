//! Chunking strategies.
//!
//! A strategy decides where chunk boundaries go. It walks the parsed tree,
//! turns nodes (or groups of nodes) into [`Chunk`]s through the
//! [`ChunkContext`], and returns them in document order with ids counting
//! from 0. Strategies hold nothing but their configuration, so a clone can
//! run on another thread without coordination.
//!
//! Built-in strategies:
//!
//! - [`ElementStrategy`] (`element`): one chunk per top-level block
//! - [`HierarchicalStrategy`] (`hierarchical`): one chunk per heading section
//! - [`DocumentStrategy`] (`document`): the whole document as one chunk
//!
//! [`StrategyRegistry`] maps names to prototypes and hands out clones.

mod document;
mod element;
mod hierarchical;
mod registry;

pub use document::DocumentStrategy;
pub use element::ElementStrategy;
pub use hierarchical::HierarchicalStrategy;
pub use registry::StrategyRegistry;

use crate::config::StrategyConfig;
use crate::error::Result;
use crate::extract::ContentExtractor;
use crate::memory::MemoryGuard;
use crate::node::{Node, NodeKind, WalkEvent, WalkStatus};
use crate::pool::PoolSet;
use crate::table::TableAnalyzer;
use crate::types::{Chunk, ChunkType, Position};
use std::fmt;

/// A policy mapping document structure to chunk boundaries.
pub trait ChunkingStrategy: Send + Sync + fmt::Debug {
    /// Registered name.
    fn name(&self) -> &str;

    /// One-line human readable description.
    fn describe(&self) -> &str;

    /// Check `config` against this strategy's limits without applying it.
    fn validate_config(&self, config: &StrategyConfig) -> Result<()>;

    /// Active configuration.
    fn config(&self) -> &StrategyConfig;

    /// Mutable access used by [`configure`](Self::configure).
    fn config_mut(&mut self) -> &mut StrategyConfig;

    /// Validate `config` and apply it. On error the current configuration
    /// stays in place.
    fn configure(&mut self, mut config: StrategyConfig) -> Result<()> {
        self.validate_config(&config)?;
        self.name().clone_into(&mut config.name);
        *self.config_mut() = config;
        Ok(())
    }

    /// Chunk one parsed document.
    fn chunk_document(
        &self,
        root: &Node,
        source: &str,
        ctx: &mut ChunkContext<'_>,
    ) -> Result<Vec<Chunk>>;

    /// Independent copy of this strategy.
    fn clone_box(&self) -> Box<dyn ChunkingStrategy>;
}

impl Clone for Box<dyn ChunkingStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Collaborators a strategy works with while chunking one document.
pub struct ChunkContext<'a> {
    /// Extraction over the document source.
    pub extractor: &'a ContentExtractor<'a>,
    /// Analyzer for table nodes.
    pub tables: &'a TableAnalyzer,
    /// Memory budget of the current document.
    pub guard: &'a mut MemoryGuard,
    /// Scratch buffers, when pooling is enabled.
    pub pools: Option<&'a PoolSet>,
}

impl fmt::Debug for ChunkContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkContext")
            .field("guard", &self.guard)
            .field("pooled", &self.pools.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> ChunkContext<'a> {
    /// Context without pools.
    pub fn new(
        extractor: &'a ContentExtractor<'a>,
        tables: &'a TableAnalyzer,
        guard: &'a mut MemoryGuard,
    ) -> Self {
        Self {
            extractor,
            tables,
            guard,
            pools: None,
        }
    }

    /// Attach object pools.
    #[must_use]
    pub fn with_pools(mut self, pools: Option<&'a PoolSet>) -> Self {
        self.pools = pools;
        self
    }

    /// Count every node of `node`'s subtree against the memory guard.
    pub fn visit(&mut self, node: &Node) -> Result<()> {
        let guard = &mut *self.guard;
        let mut outcome = Ok(());
        node.walk(&mut |_, event| {
            if event == WalkEvent::Exit {
                return WalkStatus::Continue;
            }
            match guard.tick() {
                Ok(()) => WalkStatus::Continue,
                Err(err) => {
                    outcome = Err(err);
                    WalkStatus::Stop
                },
            }
        });
        outcome
    }

    /// Plain text of `node`, built in a pooled buffer when available.
    pub fn plain_text(&self, node: &Node) -> Result<String> {
        match self.pools {
            Some(pools) => {
                let mut buf = pools.string_buffer()?;
                Ok(self.extractor.plain_text_into(node, &mut buf))
            },
            None => Ok(self.extractor.plain_text(node)),
        }
    }

    /// Chunk for a single block node, or `None` for kinds that never form
    /// chunks on their own (HTML blocks, table rows, list items, ...).
    ///
    /// The chunk carries the kind-specific metadata and `strategy`.
    pub fn node_chunk(&mut self, node: &Node, id: i64, strategy: &str) -> Result<Option<Chunk>> {
        self.visit(node)?;
        let Some(chunk_type) = node.kind.chunk_type() else {
            return Ok(None);
        };

        let content = self.extractor.raw_content(node);
        let text = self.plain_text(node)?;
        let mut chunk = Chunk::new(id, chunk_type, content, text);
        chunk.position = self.extractor.position(node);
        chunk.links = self.extractor.links(node);
        chunk.images = self.extractor.images(node);
        self.describe_node(node, &mut chunk);
        chunk
            .metadata
            .insert("strategy".to_string(), strategy.to_string());

        self.guard.reserve(chunk.estimated_size());
        Ok(Some(chunk))
    }

    /// One chunk spanning several block nodes.
    ///
    /// Contents are joined by blank lines, texts by single spaces, and the
    /// position covers every node that has one.
    pub fn compose(
        &mut self,
        nodes: &[&Node],
        id: i64,
        chunk_type: ChunkType,
        strategy: &str,
    ) -> Result<Chunk> {
        let mut content = String::new();
        let mut text = String::new();
        let mut position: Option<Position> = None;
        let mut links = Vec::new();
        let mut images = Vec::new();

        for node in nodes {
            self.visit(node)?;
            let raw = self.extractor.raw_content(node);
            if !raw.is_empty() {
                if !content.is_empty() {
                    content.push_str("\n\n");
                }
                content.push_str(&raw);
            }
            let plain = self.plain_text(node)?;
            if !plain.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&plain);
            }
            if node.outer_spans().is_some() {
                let here = self.extractor.position(node);
                position = Some(position.map_or(here, |p| p.cover(here)));
            }
            links.extend(self.extractor.links(node));
            images.extend(self.extractor.images(node));
        }

        let mut chunk = Chunk::new(id, chunk_type, content, text);
        chunk.position = position.unwrap_or_default();
        chunk.links = links;
        chunk.images = images;
        chunk
            .metadata
            .insert("strategy".to_string(), strategy.to_string());

        self.guard.reserve(chunk.estimated_size());
        Ok(chunk)
    }

    fn describe_node(&self, node: &Node, chunk: &mut Chunk) {
        match &node.kind {
            NodeKind::Heading { level } => {
                chunk.level = *level;
                chunk
                    .metadata
                    .insert("level".to_string(), level.to_string());
            },
            NodeKind::CodeBlock { fenced, info, .. } => {
                if let Some(language) = info
                    .as_deref()
                    .and_then(|info| info.split_whitespace().next())
                {
                    chunk
                        .metadata
                        .insert("language".to_string(), language.to_string());
                }
                chunk
                    .metadata
                    .insert("fenced".to_string(), fenced.to_string());
            },
            NodeKind::List { ordered, .. } => {
                let items = node
                    .children
                    .iter()
                    .filter(|child| matches!(child.kind, NodeKind::ListItem { .. }))
                    .count();
                chunk
                    .metadata
                    .insert("ordered".to_string(), ordered.to_string());
                chunk
                    .metadata
                    .insert("items".to_string(), items.to_string());
            },
            NodeKind::Table => {
                let info = self.tables.analyze(self.extractor, node);
                chunk.metadata.extend(info.into_metadata());
            },
            _ => {},
        }
    }
}

/// Heading level of `node`, if it is a heading.
pub(crate) const fn heading_level(node: &Node) -> Option<u8> {
    match node.kind {
        NodeKind::Heading { level } => Some(level),
        _ => None,
    }
}
