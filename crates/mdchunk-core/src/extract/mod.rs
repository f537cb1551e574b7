//! Per-node content extraction.
//!
//! [`ContentExtractor`] turns document nodes into the pieces a chunk is
//! made of: reconstructed markdown, normalized plain text, a 1-based source
//! position, embedded links and images. Extraction never fails; nodes that
//! carry no usable data produce empty strings, empty lists or
//! [`Position::UNKNOWN`].

mod raw;

use crate::node::{Node, NodeKind};
use crate::types::{Image, Link, LinkType, Position};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Content digest: SHA-256 over the NFC-normalized UTF-8 bytes, lowercase hex.
///
/// Canonically equivalent strings hash identically:
///
/// ```rust
/// use mdchunk_core::content_hash;
///
/// assert_eq!(content_hash("caf\u{e9}"), content_hash("cafe\u{301}"));
/// assert_eq!(content_hash("a").len(), 64);
/// ```
#[must_use]
pub fn content_hash(content: &str) -> String {
    let normalized: String = content.nfc().collect();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        // write! to String is infallible
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Collapse whitespace runs to one space and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offset to line/column lookup table.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of `source`.
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    /// Number of lines in the indexed source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based line and character column of the byte at `offset`.
    pub fn locate(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = floor_char_boundary(source, offset.min(source.len()));
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let col = source
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        (line + 1, col + 1)
    }
}

/// Largest char boundary of `source` at or below `offset`.
pub(crate) fn floor_char_boundary(source: &str, mut offset: usize) -> usize {
    while offset > 0 && !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Extraction over one source document.
#[derive(Debug, Clone)]
pub struct ContentExtractor<'a> {
    source: &'a str,
    lines: LineIndex,
}

impl<'a> ContentExtractor<'a> {
    /// Create an extractor for `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
        }
    }

    /// The source text this extractor reads from.
    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// Source slice covered by `node`, if it has a span.
    pub fn slice(&self, node: &Node) -> Option<&'a str> {
        node.span.clone().and_then(|span| self.source.get(span))
    }

    /// Minimal markdown syntax of `node`.
    pub fn raw_content(&self, node: &Node) -> String {
        raw::handler(&node.kind)(self, node)
    }

    /// Normalized plain text of `node`.
    pub fn plain_text(&self, node: &Node) -> String {
        let mut buf = String::new();
        self.plain_text_into(node, &mut buf)
    }

    /// Like [`plain_text`](Self::plain_text), using `buf` as scratch space.
    ///
    /// `buf` is cleared first; its capacity is kept for the caller.
    pub fn plain_text_into(&self, node: &Node, buf: &mut String) -> String {
        buf.clear();
        push_text(node, buf);
        collapse_whitespace(buf)
    }

    /// Source position of `node`.
    pub fn position(&self, node: &Node) -> Position {
        node.outer_spans()
            .map_or(Position::UNKNOWN, |(first, last)| {
                self.position_of(first.start, last.end)
            })
    }

    /// Source position of the byte range `start..end`.
    pub fn position_of(&self, start: usize, end: usize) -> Position {
        let (start_line, start_col) = self.lines.locate(self.source, start);
        let last = if end > start { end - 1 } else { start };
        let (end_line, end_col) = self.lines.locate(self.source, last);
        Position {
            start_line,
            end_line: end_line.max(start_line),
            start_col,
            end_col,
        }
    }

    /// Links inside `node` in source order.
    pub fn links(&self, node: &Node) -> Vec<Link> {
        let mut links = Vec::new();
        collect_links(node, &mut links);
        links
    }

    /// Images inside `node` in source order.
    pub fn images(&self, node: &Node) -> Vec<Image> {
        let mut images = Vec::new();
        collect_images(node, &mut images);
        images
    }
}

fn push_text(node: &Node, buf: &mut String) {
    match &node.kind {
        NodeKind::Text(text) | NodeKind::CodeSpan(text) => buf.push_str(text),
        NodeKind::AutoLink { url, .. } => buf.push_str(url),
        NodeKind::SoftBreak | NodeKind::HardBreak => buf.push(' '),
        NodeKind::Image { title, .. } => {
            if let Some(title) = title {
                buf.push_str(title);
            }
        },
        NodeKind::CodeBlock { code, .. } => buf.push_str(code),
        NodeKind::HtmlInline(_) | NodeKind::HtmlBlock | NodeKind::ThematicBreak => {},
        kind if kind.is_block() => {
            for child in &node.children {
                push_text(child, buf);
                if child.kind.is_block() {
                    buf.push(' ');
                }
            }
        },
        _ => {
            for child in &node.children {
                push_text(child, buf);
            }
        },
    }
}

/// Concatenated literal text of inline children, images contributing alt.
fn label_text(node: &Node) -> String {
    fn walk(node: &Node, buf: &mut String) {
        match &node.kind {
            NodeKind::Text(text) | NodeKind::CodeSpan(text) => buf.push_str(text),
            NodeKind::AutoLink { url, .. } => buf.push_str(url),
            NodeKind::SoftBreak | NodeKind::HardBreak => buf.push(' '),
            _ => node.children.iter().for_each(|child| walk(child, buf)),
        }
    }
    let mut buf = String::new();
    node.children.iter().for_each(|child| walk(child, &mut buf));
    collapse_whitespace(&buf)
}

fn collect_links(node: &Node, out: &mut Vec<Link>) {
    match &node.kind {
        NodeKind::Link { destination, .. } => out.push(Link {
            text: label_text(node),
            url: destination.clone(),
            link_type: LinkType::classify(destination),
        }),
        NodeKind::AutoLink { url, email } => {
            let target = if *email && !url.to_ascii_lowercase().starts_with("mailto:") {
                format!("mailto:{url}")
            } else {
                url.clone()
            };
            out.push(Link {
                text: url.clone(),
                link_type: LinkType::classify(&target),
                url: target,
            });
        },
        _ => {},
    }
    for child in &node.children {
        collect_links(child, out);
    }
}

fn collect_images(node: &Node, out: &mut Vec<Image>) {
    if let NodeKind::Image { destination, title } = &node.kind {
        let (width, height) = dimension_hints(destination);
        out.push(Image {
            alt: label_text(node),
            url: destination.clone(),
            title: title.clone().unwrap_or_default(),
            width,
            height,
        });
    }
    for child in &node.children {
        collect_images(child, out);
    }
}

/// `w`/`width` and `h`/`height` query parameters of an absolute image URL.
fn dimension_hints(url: &str) -> (Option<u32>, Option<u32>) {
    let Ok(parsed) = Url::parse(url) else {
        return (None, None);
    };
    let mut width = None;
    let mut height = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "w" | "width" => width = width.or_else(|| value.parse().ok()),
            "h" | "height" => height = height.or_else(|| value.parse().ok()),
            _ => {},
        }
    }
    (width, height)
}
