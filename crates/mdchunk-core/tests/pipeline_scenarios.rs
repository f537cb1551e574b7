#![allow(clippy::unwrap_used, clippy::expect_used)]

use mdchunk_core::{
    ChunkType, Chunker, ChunkerConfig, ErrorKind, ErrorMode, MemorySink, StrategyConfig,
    StrategyRegistry,
};
use std::sync::Arc;

fn chunker(config: ChunkerConfig) -> Chunker {
    Chunker::new(config).expect("valid config")
}

#[test]
fn heading_and_paragraph() {
    let chunks = chunker(ChunkerConfig::default())
        .chunk_str("# Title\n\nBody text.")
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_type, ChunkType::Heading);
    assert_eq!(chunks[0].level, 1);
    assert_eq!(chunks[0].text, "Title");
    assert_eq!(chunks[0].position.start_line, 1);
    assert_eq!(chunks[1].chunk_type, ChunkType::Paragraph);
    assert_eq!(chunks[1].text, "Body text.");
    assert_eq!(chunks[1].position.start_line, 3);
}

#[test]
fn inline_markup_does_not_add_spaces() {
    let mut chunker = chunker(ChunkerConfig::default());
    for (source, expected) in [
        ("foo**bar**baz", "foobarbaz"),
        ("see [docs](https://x.io).", "see docs."),
        ("it's `code`!", "it's code!"),
    ] {
        let chunks = chunker.chunk_str(source).unwrap();
        assert_eq!(chunks[0].text, expected, "{source}");
    }
}

#[test]
fn well_formed_table() {
    let source = "| Name | Age |\n| :--- | ---: |\n| Ann | 31 |\n| Bob | 42 |\n| Cy | 27 |\n";
    let chunks = chunker(ChunkerConfig::default()).chunk_str(source).unwrap();

    assert_eq!(chunks.len(), 1);
    let table = &chunks[0];
    assert_eq!(table.chunk_type, ChunkType::Table);
    assert_eq!(table.metadata["rows"], "4");
    assert_eq!(table.metadata["columns"], "2");
    assert_eq!(table.metadata["has_header"], "true");
    assert_eq!(table.metadata["is_well_formed"], "true");
    assert_eq!(table.metadata["alignments"], "left,right");
    assert_eq!(table.metadata["error_count"], "0");
}

#[test]
fn table_with_extra_cell_is_kept_and_flagged() {
    let source = "| a | b |\n| --- | --- |\n| 1 | 2 | 3 |\n| 4 | 5 |\n";
    let chunks = chunker(ChunkerConfig::default()).chunk_str(source).unwrap();

    let table = chunks
        .iter()
        .find(|c| c.chunk_type == ChunkType::Table)
        .expect("table chunk is emitted");
    assert_eq!(table.metadata["is_well_formed"], "false");
    assert!(!table.metadata["errors"].is_empty());
    assert_ne!(table.metadata["error_count"], "0");
}

#[test]
fn strict_size_limit_returns_error_and_no_chunks() {
    let mut strict = chunker(ChunkerConfig {
        max_chunk_size: 10,
        error_handling: ErrorMode::Strict,
        ..ChunkerConfig::default()
    });
    let err = strict.chunk_str("# Very Long Heading Text").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChunkTooLarge);
}

#[test]
fn mode_contract_for_oversized_chunk() {
    let source = "# Very Long Heading Text";
    for mode in [ErrorMode::Permissive, ErrorMode::Silent] {
        let mut chunker = chunker(ChunkerConfig {
            max_chunk_size: 10,
            error_handling: mode,
            ..ChunkerConfig::default()
        });
        let chunks = chunker.chunk_str(source).unwrap();
        assert!(!chunks.is_empty(), "{mode} returns a result");
        assert_eq!(
            chunker.errors_by_kind(ErrorKind::ChunkTooLarge).len(),
            1,
            "{mode} records the error"
        );
    }
}

#[test]
fn mixed_document_produces_every_block_type() {
    let source = "\
# Guide

Some *emphasis* and a [link](https://example.com).

```python
print('hi')
```

- one
- two

> quoted

---

| k | v |
| - | - |
| a | 1 |
";
    let chunks = chunker(ChunkerConfig::default()).chunk_str(source).unwrap();
    let types: Vec<_> = chunks.iter().map(|c| c.chunk_type.clone()).collect();
    assert_eq!(
        types,
        vec![
            ChunkType::Heading,
            ChunkType::Paragraph,
            ChunkType::Code,
            ChunkType::List,
            ChunkType::Blockquote,
            ChunkType::ThematicBreak,
            ChunkType::Table,
        ]
    );
    assert_eq!(chunks[1].links[0].url, "https://example.com");
    assert_eq!(chunks[2].metadata["language"], "python");
    assert_eq!(chunks[3].metadata["items"], "2");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, i64::try_from(i).unwrap());
        assert_eq!(chunk.hash, mdchunk_core::content_hash(&chunk.content));
    }
}

#[test]
fn hierarchical_strategy_through_config() {
    let config = ChunkerConfig {
        chunking_strategy: StrategyConfig {
            max_depth: 2,
            ..StrategyConfig::named("hierarchical")
        },
        ..ChunkerConfig::default()
    };
    let chunks = chunker(config)
        .chunk_str("# A\n\ntext\n\n## B\n\nmore\n\n### C\n\ndeep\n")
        .unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].metadata["heading_path"], "A > B");
    assert!(chunks[1].text.contains("deep"));
}

#[test]
fn unknown_strategy_is_rejected_at_construction() {
    let config = ChunkerConfig {
        chunking_strategy: StrategyConfig::named("semantic"),
        ..ChunkerConfig::default()
    };
    let err = Chunker::new(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StrategyNotFound);
}

#[test]
fn events_reach_the_injected_sink() {
    let sink = Arc::new(MemorySink::new());
    let mut chunker = Chunker::with_components(
        ChunkerConfig {
            max_chunk_size: 5,
            ..ChunkerConfig::default()
        },
        StrategyRegistry::with_builtins(),
        sink.clone(),
    )
    .unwrap();
    chunker.chunk_str("first paragraph\n\nx").unwrap();

    assert_eq!(sink.count("pipeline_started"), 1);
    assert_eq!(sink.count("chunk_emitted"), 2);
    assert_eq!(sink.count("error_recorded"), 1);
    assert_eq!(sink.count("pipeline_finished"), 1);
}

#[test]
fn repeated_runs_are_identical() {
    let source = "# T\n\nalpha [b](#c)\n\n![img](pic.png?w=4 \"t\")\n";
    let mut chunker = chunker(ChunkerConfig::default());
    let first = chunker.chunk_str(source).unwrap();
    let second = chunker.chunk_str(source).unwrap();
    assert_eq!(first, second);
}
