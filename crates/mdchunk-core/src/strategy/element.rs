use super::{ChunkContext, ChunkingStrategy};
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::node::Node;
use crate::types::Chunk;
use tracing::trace;

const NAME: &str = "element";

/// One chunk per top-level block.
///
/// Blocks are filtered by the include/exclude lists and `min_chunk_size`.
/// With `merge_empty`, blocks without text (thematic breaks, empty code
/// blocks) are appended to the previous chunk instead of standing alone.
/// HTML blocks never form chunks.
#[derive(Debug, Clone)]
pub struct ElementStrategy {
    config: StrategyConfig,
}

impl Default for ElementStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementStrategy {
    /// Strategy with default settings.
    pub fn new() -> Self {
        Self {
            config: StrategyConfig::named(NAME),
        }
    }
}

impl ChunkingStrategy for ElementStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> &str {
        "One chunk per top-level block (heading, paragraph, code, table, list, quote, rule)"
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
        let mut chunks: Vec<Chunk> = Vec::with_capacity(root.children.len());
        let mut next_id = 0_i64;

        for node in &root.children {
            let Some(chunk) = ctx.node_chunk(node, next_id, NAME)? else {
                continue;
            };
            if !self.config.admits(&chunk.chunk_type) {
                continue;
            }

            if self.config.merge_empty && chunk.text.trim().is_empty() {
                if let Some(previous) = chunks.last_mut() {
                    merge_into(previous, chunk);
                    continue;
                }
            }

            if chunk.content.len() < self.config.min_chunk_size {
                trace!(
                    id = next_id,
                    bytes = chunk.content.len(),
                    "Dropping chunk below min_chunk_size"
                );
                continue;
            }

            chunks.push(chunk);
            next_id += 1;
        }

        Ok(chunks)
    }

    fn clone_box(&self) -> Box<dyn ChunkingStrategy> {
        Box::new(self.clone())
    }
}

fn merge_into(previous: &mut Chunk, blank: Chunk) {
    if !blank.content.is_empty() {
        previous.content.push_str("\n\n");
        previous.content.push_str(&blank.content);
    }
    previous.position = previous.position.cover(blank.position);
    previous.links.extend(blank.links);
    previous.images.extend(blank.images);
    previous
        .metadata
        .insert("merged_empty".to_string(), "true".to_string());
    previous.rehash();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::strategy::test_support::run;
    use crate::types::ChunkType;

    #[test]
    fn test_one_chunk_per_block() {
        let chunks = run(&ElementStrategy::new(), "# Title\n\nBody text.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_type, ChunkType::Heading);
        assert_eq!(chunks[0].level, 1);
        assert_eq!(chunks[0].text, "Title");
        assert_eq!(chunks[1].chunk_type, ChunkType::Paragraph);
        assert_eq!(chunks[1].text, "Body text.");
        assert_eq!(chunks[1].id, 1);
        assert_eq!(chunks[1].metadata["strategy"], "element");
    }

    #[test]
    fn test_include_and_exclude_filters() {
        let source = "# H\n\ntext\n\n```\ncode\n```\n\n---\n";
        let mut strategy = ElementStrategy::new();
        let mut config = StrategyConfig::named("element");
        config.exclude_types = vec![ChunkType::Paragraph];
        strategy.configure(config).unwrap();
        let types: Vec<_> = run(&strategy, source)
            .into_iter()
            .map(|c| c.chunk_type)
            .collect();
        assert_eq!(
            types,
            vec![ChunkType::Heading, ChunkType::Code, ChunkType::ThematicBreak]
        );

        let mut config = StrategyConfig::named("element");
        config.include_types = vec![ChunkType::Code];
        strategy.configure(config).unwrap();
        let chunks = run(&strategy, source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
    }

    #[test]
    fn test_min_chunk_size_drops_small_blocks() {
        let mut strategy = ElementStrategy::new();
        let mut config = StrategyConfig::named("element");
        config.min_chunk_size = 5;
        strategy.configure(config).unwrap();
        let chunks = run(&strategy, "ok\n\nlonger paragraph\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "longer paragraph");
        assert_eq!(chunks[0].id, 0);
    }

    #[test]
    fn test_merge_empty_folds_rules_into_previous() {
        let mut strategy = ElementStrategy::new();
        let mut config = StrategyConfig::named("element");
        config.merge_empty = true;
        strategy.configure(config).unwrap();
        let chunks = run(&strategy, "para\n\n---\n\nnext\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "para\n\n---");
        assert_eq!(chunks[0].metadata["merged_empty"], "true");
        assert_eq!(chunks[0].hash, crate::content_hash(&chunks[0].content));
        assert_eq!(chunks[0].position.end_line, 3);
    }

    #[test]
    fn test_html_blocks_are_skipped() {
        let chunks = run(&ElementStrategy::new(), "<div>\nhi\n</div>\n\ntext\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Paragraph);
    }

    #[test]
    fn test_invalid_config_is_not_applied() {
        let mut strategy = ElementStrategy::new();
        let mut config = StrategyConfig::named("element");
        config.min_depth = 4;
        config.max_depth = 2;
        let err = strategy.configure(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StrategyConfigInvalid);
        assert_eq!(strategy.config().max_depth, 6);
    }
}
