use super::{ChunkContext, ChunkingStrategy, heading_level};
use crate::config::{MAX_HEADING_DEPTH, StrategyConfig};
use crate::error::{ChunkerError, Result};
use crate::node::Node;
use crate::types::{Chunk, ChunkType};
use tracing::debug;

const NAME: &str = "hierarchical";
const PATH_SEPARATOR: &str = " > ";

/// One chunk per heading section.
///
/// A heading whose level lies in `min_depth..=max_depth` opens a section
/// that runs until the next such heading of equal or shallower level;
/// deeper headings stay inside. Blocks before the first boundary heading
/// form a preamble chunk. A section larger than `max_chunk_size` is split
/// at block boundaries into numbered parts.
///
/// Metadata: `heading_path`, `section_level`, `node_count`, and
/// `section_part`/`section_parts` for split sections.
#[derive(Debug, Clone)]
pub struct HierarchicalStrategy {
    config: StrategyConfig,
}

impl Default for HierarchicalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

struct Section<'n> {
    level: u8,
    path: String,
    nodes: Vec<&'n Node>,
}

impl HierarchicalStrategy {
    /// Strategy with default settings.
    pub fn new() -> Self {
        Self {
            config: StrategyConfig::named(NAME),
        }
    }

    fn is_boundary(&self, level: u8) -> bool {
        (self.config.min_depth..=self.config.max_depth).contains(&level)
    }

    fn sections<'n>(&self, root: &'n Node, ctx: &ChunkContext<'_>) -> Vec<Section<'n>> {
        let mut sections = Vec::new();
        let mut current = Section {
            level: 0,
            path: String::new(),
            nodes: Vec::new(),
        };
        // (level, title) of the enclosing boundary headings
        let mut trail: Vec<(u8, String)> = Vec::new();

        for node in &root.children {
            match heading_level(node) {
                Some(level) if self.is_boundary(level) => {
                    let finished = std::mem::replace(
                        &mut current,
                        Section {
                            level,
                            path: String::new(),
                            nodes: Vec::new(),
                        },
                    );
                    if !finished.nodes.is_empty() {
                        sections.push(finished);
                    }
                    while trail.last().is_some_and(|(open, _)| *open >= level) {
                        trail.pop();
                    }
                    trail.push((level, ctx.extractor.plain_text(node)));
                    current.path = trail
                        .iter()
                        .map(|(_, title)| title.as_str())
                        .collect::<Vec<_>>()
                        .join(PATH_SEPARATOR);
                    current.nodes.push(node);
                },
                _ => {
                    let admitted = node
                        .kind
                        .chunk_type()
                        .is_none_or(|chunk_type| self.config.admits(&chunk_type));
                    if admitted {
                        current.nodes.push(node);
                    }
                },
            }
        }
        if !current.nodes.is_empty() {
            sections.push(current);
        }
        sections
    }

    /// Split `nodes` into runs whose joined content stays under the limit.
    fn parts<'s, 'n>(&self, nodes: &'s [&'n Node], ctx: &ChunkContext<'_>) -> Vec<&'s [&'n Node]> {
        let limit = self.config.max_chunk_size;
        if limit == 0 {
            return vec![nodes];
        }
        let mut parts = Vec::new();
        let mut start = 0;
        let mut size = 0;
        for (i, node) in nodes.iter().enumerate() {
            let bytes = ctx.extractor.raw_content(node).len();
            let joined = if i == start { bytes } else { size + 2 + bytes };
            if i > start && joined > limit {
                parts.push(&nodes[start..i]);
                start = i;
                size = bytes;
            } else {
                size = joined;
            }
        }
        parts.push(&nodes[start..]);
        parts
    }
}

impl ChunkingStrategy for HierarchicalStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> &str {
        "One chunk per heading section, nested headings folded into their parent"
    }

    fn validate_config(&self, config: &StrategyConfig) -> Result<()> {
        config.validate_common()?;
        for (field, depth) in [("min_depth", config.min_depth), ("max_depth", config.max_depth)] {
            if !(1..=MAX_HEADING_DEPTH).contains(&depth) {
                return Err(ChunkerError::strategy_config_invalid(format!(
                    "{field} must be between 1 and {MAX_HEADING_DEPTH}, got {depth}"
                ))
                .with_context("strategy", NAME)
                .with_context("field", field));
            }
        }
        Ok(())
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StrategyConfig {
        &mut self.config
    }

    fn chunk_document(
        &self,
        root: &Node,
        _source: &str,
        ctx: &mut ChunkContext<'_>,
    ) -> Result<Vec<Chunk>> {
        let sections = self.sections(root, ctx);
        let mut chunks = Vec::with_capacity(sections.len());

        for section in &sections {
            let parts = self.parts(&section.nodes, ctx);
            let total = parts.len();
            for (index, part) in parts.into_iter().enumerate() {
                let id = i64::try_from(chunks.len()).unwrap_or(i64::MAX);
                let chunk_type = if section.level == 0 {
                    ChunkType::Paragraph
                } else {
                    ChunkType::Heading
                };
                let mut chunk = ctx.compose(part, id, chunk_type, NAME)?;
                chunk.level = section.level;

                let node_count: usize = part.iter().map(|node| node.count()).sum();
                let meta = &mut chunk.metadata;
                meta.insert("section_level".to_string(), section.level.to_string());
                meta.insert("node_count".to_string(), node_count.to_string());
                if section.level == 0 {
                    meta.insert("section".to_string(), "preamble".to_string());
                } else {
                    meta.insert("heading_path".to_string(), section.path.clone());
                }
                if total > 1 {
                    meta.insert("section_part".to_string(), (index + 1).to_string());
                    meta.insert("section_parts".to_string(), total.to_string());
                }

                if chunk.content.len() < self.config.min_chunk_size {
                    continue;
                }
                chunks.push(chunk);
            }
        }

        debug!(
            sections = sections.len(),
            chunks = chunks.len(),
            "Hierarchical chunking finished"
        );
        Ok(chunks)
    }

    fn clone_box(&self) -> Box<dyn ChunkingStrategy> {
        Box::new(self.clone())
    }
}
