//! Owned document tree handed over by the markdown parser.
//!
//! The tree is a closed tagged union: every construct the pipeline knows
//! about is one [`NodeKind`] variant, and everything downstream dispatches
//! with a single `match`. Block nodes carry byte spans into the source text;
//! inline nodes carry spans when the grammar reported them.

use crate::types::ChunkType;
use std::ops::Range;

/// Kind of a document node, with the data specific to that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of a parsed document.
    Document,
    /// ATX or setext heading of depth 1 to 6.
    Heading {
        /// Heading depth.
        level: u8,
    },
    /// Paragraph.
    Paragraph,
    /// Code block; `code` holds the literal lines without fences.
    CodeBlock {
        /// Whether the block used fences (as opposed to indentation).
        fenced: bool,
        /// Info string after the opening fence.
        info: Option<String>,
        /// Opening fence characters, e.g. "```" or "~~~~".
        fence: Option<String>,
        /// Literal code.
        code: String,
    },
    /// GFM pipe table.
    Table,
    /// Header row of a table.
    TableHeader,
    /// Data row of a table.
    TableRow,
    /// Table cell.
    TableCell,
    /// Bullet or ordered list.
    List {
        /// Whether items are numbered.
        ordered: bool,
        /// First ordinal of an ordered list.
        start: u64,
        /// Bullet character or ordinal delimiter (`.` or `)`).
        marker: char,
    },
    /// List item; `task` is `Some(checked)` for task list items.
    ListItem {
        /// Task checkbox state.
        task: Option<bool>,
    },
    /// Block quote.
    BlockQuote,
    /// Thematic break.
    ThematicBreak,
    /// Raw HTML block.
    HtmlBlock,
    /// Literal text.
    Text(String),
    /// Emphasis wrapper.
    Emphasis,
    /// Strong emphasis wrapper.
    Strong,
    /// Strikethrough wrapper.
    Strikethrough,
    /// Inline code literal.
    CodeSpan(String),
    /// Inline link; children form the link text.
    Link {
        /// Link destination.
        destination: String,
        /// Optional title.
        title: Option<String>,
    },
    /// Inline image; children form the alt text.
    Image {
        /// Image source.
        destination: String,
        /// Optional title.
        title: Option<String>,
    },
    /// `<scheme:...>` or `<user@host>` autolink.
    AutoLink {
        /// Target as written.
        url: String,
        /// Whether this is an email autolink.
        email: bool,
    },
    /// Line ending inside a paragraph.
    SoftBreak,
    /// Hard line break.
    HardBreak,
    /// Inline raw HTML.
    HtmlInline(String),
}

impl NodeKind {
    /// Chunk type for nodes that can become chunks on their own.
    pub fn chunk_type(&self) -> Option<ChunkType> {
        match self {
            Self::Heading { .. } => Some(ChunkType::Heading),
            Self::Paragraph => Some(ChunkType::Paragraph),
            Self::CodeBlock { .. } => Some(ChunkType::Code),
            Self::Table => Some(ChunkType::Table),
            Self::List { .. } => Some(ChunkType::List),
            Self::BlockQuote => Some(ChunkType::Blockquote),
            Self::ThematicBreak => Some(ChunkType::ThematicBreak),
            _ => None,
        }
    }

    /// Whether this is a block-level kind.
    pub const fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Document
                | Self::Heading { .. }
                | Self::Paragraph
                | Self::CodeBlock { .. }
                | Self::Table
                | Self::TableHeader
                | Self::TableRow
                | Self::TableCell
                | Self::List { .. }
                | Self::ListItem { .. }
                | Self::BlockQuote
                | Self::ThematicBreak
                | Self::HtmlBlock
        )
    }

    /// Short stable name, used in logs and metadata.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Heading { .. } => "heading",
            Self::Paragraph => "paragraph",
            Self::CodeBlock { .. } => "code_block",
            Self::Table => "table",
            Self::TableHeader => "table_header",
            Self::TableRow => "table_row",
            Self::TableCell => "table_cell",
            Self::List { .. } => "list",
            Self::ListItem { .. } => "list_item",
            Self::BlockQuote => "blockquote",
            Self::ThematicBreak => "thematic_break",
            Self::HtmlBlock => "html_block",
            Self::Text(_) => "text",
            Self::Emphasis => "emphasis",
            Self::Strong => "strong",
            Self::Strikethrough => "strikethrough",
            Self::CodeSpan(_) => "code_span",
            Self::Link { .. } => "link",
            Self::Image { .. } => "image",
            Self::AutoLink { .. } => "autolink",
            Self::SoftBreak => "soft_break",
            Self::HardBreak => "hard_break",
            Self::HtmlInline(_) => "html_inline",
        }
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// What the node is.
    pub kind: NodeKind,
    /// Byte range in the source, trimmed of trailing line endings.
    pub span: Option<Range<usize>>,
    /// Child nodes in source order.
    pub children: Vec<Self>,
}

/// Traversal event passed to [`Node::walk`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEvent {
    /// Before the node's children are visited.
    Enter,
    /// After the node's children were visited.
    Exit,
}

/// Traversal control returned from [`Node::walk`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// Keep walking.
    Continue,
    /// Do not descend into this node (only meaningful on `Enter`).
    SkipChildren,
    /// Abort the whole traversal.
    Stop,
}

impl Node {
    /// Create a node without a span.
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            span: None,
            children: Vec::new(),
        }
    }

    /// Create a node covering `span`.
    pub const fn with_span(kind: NodeKind, span: Range<usize>) -> Self {
        Self {
            kind,
            span: Some(span),
            children: Vec::new(),
        }
    }

    /// Builder-style child attachment.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Convenience constructor for a text leaf.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(text.into()))
    }

    /// Depth-first traversal with enter/exit events.
    ///
    /// Returns `false` when the callback stopped the walk early.
    pub fn walk<F>(&self, visit: &mut F) -> bool
    where
        F: FnMut(&Self, WalkEvent) -> WalkStatus,
    {
        match visit(self, WalkEvent::Enter) {
            WalkStatus::Stop => return false,
            WalkStatus::SkipChildren => {},
            WalkStatus::Continue => {
                for child in &self.children {
                    if !child.walk(visit) {
                        return false;
                    }
                }
            },
        }
        visit(self, WalkEvent::Exit) != WalkStatus::Stop
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    /// Whether the node has no children, or its text content is empty.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::CodeSpan(text) => text.trim().is_empty(),
            NodeKind::CodeBlock { code, .. } => code.trim().is_empty(),
            NodeKind::ThematicBreak | NodeKind::Image { .. } | NodeKind::AutoLink { .. } => false,
            _ => self.children.iter().all(Self::is_empty),
        }
    }

    /// First and last spans found in this subtree, in document order.
    pub fn outer_spans(&self) -> Option<(Range<usize>, Range<usize>)> {
        if let Some(span) = &self.span {
            return Some((span.clone(), span.clone()));
        }
        let first = self.children.iter().find_map(Self::outer_spans)?;
        let last = self.children.iter().rev().find_map(Self::outer_spans)?;
        Some((first.0, last.1))
    }
}
