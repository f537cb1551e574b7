//! Core data types produced by the chunking pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic type of a chunk.
///
/// The seven named variants form the closed set every sanitized chunk
/// belongs to. [`ChunkType::Unrecognized`] exists only so that faulty or
/// custom strategies can hand over an arbitrary tag; the sanitizer coerces
/// it back into the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChunkType {
    /// ATX or setext heading.
    Heading,
    /// Paragraph of inline content.
    Paragraph,
    /// Fenced or indented code block.
    Code,
    /// GFM pipe table.
    Table,
    /// Ordered or bullet list.
    List,
    /// Block quote.
    Blockquote,
    /// Thematic break (`---`).
    ThematicBreak,
    /// A tag outside the closed set.
    Unrecognized(String),
}

impl ChunkType {
    /// The closed set of chunk types, in canonical order.
    pub const KNOWN: [Self; 7] = [
        Self::Heading,
        Self::Paragraph,
        Self::Code,
        Self::Table,
        Self::List,
        Self::Blockquote,
        Self::ThematicBreak,
    ];

    /// Type substituted for unrecognized tags during sanitization.
    pub const FALLBACK: Self = Self::Paragraph;

    /// Parse a tag. Unknown tags are kept as [`ChunkType::Unrecognized`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "heading" => Self::Heading,
            "paragraph" => Self::Paragraph,
            "code" => Self::Code,
            "table" => Self::Table,
            "list" => Self::List,
            "blockquote" => Self::Blockquote,
            "thematic_break" => Self::ThematicBreak,
            _ => Self::Unrecognized(tag.to_string()),
        }
    }

    /// The wire tag of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Code => "code",
            Self::Table => "table",
            Self::List => "list",
            Self::Blockquote => "blockquote",
            Self::ThematicBreak => "thematic_break",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Whether this type is part of the closed set.
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for ChunkType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<ChunkType> for String {
    fn from(chunk_type: ChunkType) -> Self {
        chunk_type.as_str().to_string()
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based source location of a chunk.
///
/// Columns count characters, and `end_col` is the column of the last
/// character covered by the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// First line of the chunk.
    pub start_line: usize,
    /// Last line of the chunk.
    pub end_line: usize,
    /// Column of the first character.
    pub start_col: usize,
    /// Column of the last character.
    pub end_col: usize,
}

impl Position {
    /// Position reported when a node carries no source span.
    pub const UNKNOWN: Self = Self {
        start_line: 1,
        end_line: 1,
        start_col: 1,
        end_col: 1,
    };

    /// Smallest position covering both `self` and `other`.
    #[must_use]
    pub fn cover(self, other: Self) -> Self {
        let (start_line, start_col) =
            (self.start_line, self.start_col).min((other.start_line, other.start_col));
        let (end_line, end_col) =
            (self.end_line, self.end_col).max((other.end_line, other.end_col));
        Self {
            start_line,
            end_line,
            start_col,
            end_col,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Classification of a link target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Relative or site-local target.
    Internal,
    /// `http(s)://` or `mailto:` target.
    External,
    /// In-page `#fragment`.
    Anchor,
}

impl LinkType {
    /// Classify a URL by its shape.
    pub fn classify(url: &str) -> Self {
        let lower = url.trim().to_ascii_lowercase();
        if lower.starts_with('#') {
            Self::Anchor
        } else if lower.starts_with("http://")
            || lower.starts_with("https://")
            || lower.starts_with("mailto:")
        {
            Self::External
        } else {
            Self::Internal
        }
    }
}

/// A hyperlink embedded in a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Visible link text.
    pub text: String,
    /// Link destination.
    pub url: String,
    /// Target classification.
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

/// An image embedded in a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Alternative text.
    pub alt: String,
    /// Image source.
    pub url: String,
    /// Optional title attribute (empty when absent).
    pub title: String,
    /// Width hint from the image URL, if any.
    pub width: Option<u32>,
    /// Height hint from the image URL, if any.
    pub height: Option<u32>,
}

/// One semantically typed segment of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier, dense from 0 within one document after sanitization.
    pub id: i64,
    /// Semantic type.
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Markdown syntax of the chunk.
    pub content: String,
    /// Normalized plain text.
    pub text: String,
    /// Heading depth, 0 for non-heading chunks.
    pub level: u8,
    /// String metadata attached by strategies, extractors and sanitization.
    pub metadata: BTreeMap<String, String>,
    /// Source location.
    pub position: Position,
    /// Links in source order.
    pub links: Vec<Link>,
    /// Images in source order.
    pub images: Vec<Image>,
    /// Content digest of `content`.
    pub hash: String,
}

impl Chunk {
    /// Create a chunk with the hash computed from `content`.
    pub fn new(id: i64, chunk_type: ChunkType, content: String, text: String) -> Self {
        let hash = crate::extract::content_hash(&content);
        Self {
            id,
            chunk_type,
            content,
            text,
            level: 0,
            metadata: BTreeMap::new(),
            position: Position::UNKNOWN,
            links: Vec::new(),
            images: Vec::new(),
            hash,
        }
    }

    /// Recompute the hash after `content` changed.
    pub fn rehash(&mut self) {
        self.hash = crate::extract::content_hash(&self.content);
    }

    /// Whether both the text and the raw content are blank.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Rough heap footprint used for memory accounting.
    pub fn estimated_size(&self) -> usize {
        let metadata: usize = self
            .metadata
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum();
        let links: usize = self.links.iter().map(|l| l.text.len() + l.url.len()).sum();
        let images: usize = self
            .images
            .iter()
            .map(|i| i.alt.len() + i.url.len() + i.title.len())
            .sum();
        self.content.len() + self.text.len() + self.hash.len() + metadata + links + images
    }
}
