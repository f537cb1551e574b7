use super::{ChunkContext, ChunkingStrategy, heading_level};
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::node::Node;
use crate::types::{Chunk, ChunkType};

const NAME: &str = "document";

/// The whole document as a single `paragraph` chunk.
#[derive(Debug, Clone)]
pub struct DocumentStrategy {
    config: StrategyConfig,
}

impl Default for DocumentStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStrategy {
    /// Strategy with default settings.
    pub fn new() -> Self {
        Self {
            config: StrategyConfig::named(NAME),
        }
    }
}

impl ChunkingStrategy for DocumentStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> &str {
        "The entire document as exactly one chunk"
    }

    fn validate_config(&self, config: &StrategyConfig) -> Result<()> {
        config.validate_common()
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
        if root.children.is_empty() {
            return Ok(Vec::new());
        }
        let nodes: Vec<&Node> = root.children.iter().collect();
        let mut chunk = ctx.compose(&nodes, 0, ChunkType::Paragraph, NAME)?;

        let headings = root
            .children
            .iter()
            .filter(|node| heading_level(node).is_some())
            .count();
        chunk
            .metadata
            .insert("node_count".to_string(), root.count().to_string());
        chunk
            .metadata
            .insert("heading_count".to_string(), headings.to_string());
        Ok(vec![chunk])
    }

    fn clone_box(&self) -> Box<dyn ChunkingStrategy> {
        Box::new(self.clone())
    }
}
