//! Tree-sitter based markdown parser.
//!
//! The block grammar produces the document structure; every `inline` node
//! and table cell is then re-parsed with the inline grammar, restricted to
//! included ranges that skip block continuation markers (`> ` prefixes,
//! list indentation). The result is converted into the owned [`Node`] tree
//! the rest of the pipeline works on.

use crate::error::{ChunkerError, Result};
use crate::node::{Node, NodeKind};
use html_escape::decode_html_entities;
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;
use tree_sitter::{Node as TsNode, Parser, Range as TsRange};

/// The seam between the pipeline and the markdown grammar.
pub trait TreeParser: Send {
    /// Parse `source` into a document tree rooted at [`NodeKind::Document`].
    fn parse(&mut self, source: &str) -> Result<Node>;
}

/// Markdown parser backed by `tree-sitter-md`.
pub struct MarkdownParser {
    block: Parser,
    inline: Parser,
}

impl MarkdownParser {
    /// Create a parser with both grammars loaded.
    pub fn new() -> Result<Self> {
        let mut block = Parser::new();
        block
            .set_language(&tree_sitter_md::LANGUAGE.into())
            .map_err(|e| {
                ChunkerError::parsing_failed(format!("Failed to set block language: {e}"))
            })?;

        let mut inline = Parser::new();
        inline
            .set_language(&tree_sitter_md::INLINE_LANGUAGE.into())
            .map_err(|e| {
                ChunkerError::parsing_failed(format!("Failed to set inline language: {e}"))
            })?;

        Ok(Self { block, inline })
    }
}

impl TreeParser for MarkdownParser {
    fn parse(&mut self, source: &str) -> Result<Node> {
        let tree = self
            .block
            .parse(source, None)
            .ok_or_else(|| ChunkerError::parsing_failed("Failed to parse markdown"))?;

        let root = tree.root_node();
        if root.has_error() {
            debug!("Parse tree contains errors, keeping recovered nodes");
        }

        let mut references = HashMap::new();
        collect_references(root, source, &mut references);

        let mut converter = Converter {
            source,
            inline: &mut self.inline,
            references,
        };
        let children = converter.convert_children(root);

        Ok(Node {
            kind: NodeKind::Document,
            span: Some(trim_span(source, 0..source.len())),
            children,
        })
    }
}

type Reference = (String, Option<String>);

struct Converter<'s, 'p> {
    source: &'s str,
    inline: &'p mut Parser,
    references: HashMap<String, Reference>,
}

impl Converter<'_, '_> {
    fn convert_children(&mut self, node: TsNode<'_>) -> Vec<Node> {
        let mut out = Vec::new();
        for child in named_children(node) {
            if child.kind() == "section" {
                out.extend(self.convert_children(child));
            } else if let Some(converted) = self.convert_block(child) {
                out.push(converted);
            }
        }
        out
    }

    fn convert_block(&mut self, node: TsNode<'_>) -> Option<Node> {
        let span = trim_span(self.source, node.byte_range());
        let converted = match node.kind() {
            "atx_heading" => {
                let level = heading_level(node);
                let children = node
                    .child_by_field_name("heading_content")
                    .or_else(|| find_child(node, "inline"))
                    .map(|inline| self.convert_inline(inline))
                    .unwrap_or_default();
                Node {
                    kind: NodeKind::Heading { level },
                    span: Some(span),
                    children,
                }
            },
            "setext_heading" => {
                let level = if find_child(node, "setext_h2_underline").is_some() {
                    2
                } else {
                    1
                };
                let children = find_child(node, "paragraph")
                    .and_then(|p| find_child(p, "inline"))
                    .map(|inline| self.convert_inline(inline))
                    .unwrap_or_default();
                Node {
                    kind: NodeKind::Heading { level },
                    span: Some(span),
                    children,
                }
            },
            "paragraph" => Node {
                kind: NodeKind::Paragraph,
                span: Some(span),
                children: find_child(node, "inline")
                    .map(|inline| self.convert_inline(inline))
                    .unwrap_or_default(),
            },
            "fenced_code_block" => self.convert_fenced_code(node, span),
            "indented_code_block" => {
                let raw = self.text_without_continuations(node);
                let code = raw
                    .lines()
                    .map(|line| strip_indent(line, 4))
                    .collect::<Vec<_>>()
                    .join("\n");
                Node::with_span(
                    NodeKind::CodeBlock {
                        fenced: false,
                        info: None,
                        fence: None,
                        code: code.trim_end_matches(['\n', '\r']).to_string(),
                    },
                    span,
                )
            },
            "block_quote" => Node {
                kind: NodeKind::BlockQuote,
                span: Some(span),
                children: self.convert_children(node),
            },
            "list" => self.convert_list(node, span),
            "thematic_break" => Node::with_span(NodeKind::ThematicBreak, span),
            "html_block" => Node::with_span(NodeKind::HtmlBlock, span),
            "pipe_table" => self.convert_table(node, span),
            _ => return None,
        };
        Some(converted)
    }

    fn convert_fenced_code(&mut self, node: TsNode<'_>, span: Range<usize>) -> Node {
        let fence = find_child(node, "fenced_code_block_delimiter")
            .map(|d| self.slice(d.byte_range()).trim().to_string());
        let info = find_child(node, "info_string")
            .map(|i| self.slice(i.byte_range()).trim().to_string())
            .filter(|i| !i.is_empty());
        let code = find_child(node, "code_fence_content")
            .map(|content| self.text_without_continuations(content))
            .unwrap_or_default();

        Node::with_span(
            NodeKind::CodeBlock {
                fenced: true,
                info,
                fence,
                code: code.trim_end_matches(['\n', '\r']).to_string(),
            },
            span,
        )
    }

    fn convert_list(&mut self, node: TsNode<'_>, span: Range<usize>) -> Node {
        let items: Vec<TsNode<'_>> = named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "list_item")
            .collect();

        let marker_node = items.first().and_then(|item| {
            named_children(*item)
                .into_iter()
                .find(|c| c.kind().starts_with("list_marker"))
        });
        let (ordered, marker, start) = marker_node.map_or((false, '-', 1), |m| {
            let text = self.slice(m.byte_range()).trim();
            match m.kind() {
                "list_marker_dot" | "list_marker_parenthesis" => {
                    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
                    let delimiter = if m.kind() == "list_marker_dot" { '.' } else { ')' };
                    (true, delimiter, digits.parse().unwrap_or(1))
                },
                "list_marker_plus" => (false, '+', 1),
                "list_marker_star" => (false, '*', 1),
                _ => (false, '-', 1),
            }
        });

        let children = items
            .into_iter()
            .map(|item| {
                let task = task_state(item);
                Node {
                    kind: NodeKind::ListItem { task },
                    span: Some(trim_span(self.source, item.byte_range())),
                    children: self.convert_children(item),
                }
            })
            .collect();

        Node {
            kind: NodeKind::List {
                ordered,
                start,
                marker,
            },
            span: Some(span),
            children,
        }
    }

    fn convert_table(&mut self, node: TsNode<'_>, span: Range<usize>) -> Node {
        let mut children = Vec::new();
        for row in named_children(node) {
            let kind = match row.kind() {
                "pipe_table_header" => NodeKind::TableHeader,
                "pipe_table_row" => NodeKind::TableRow,
                _ => continue,
            };
            let cells = named_children(row)
                .into_iter()
                .filter(|c| c.kind() == "pipe_table_cell")
                .map(|cell| Node {
                    kind: NodeKind::TableCell,
                    span: Some(cell.byte_range()),
                    children: self.convert_inline(cell),
                })
                .collect();
            children.push(Node {
                kind,
                span: Some(trim_span(self.source, row.byte_range())),
                children: cells,
            });
        }
        Node {
            kind: NodeKind::Table,
            span: Some(span),
            children,
        }
    }

    fn convert_inline(&mut self, node: TsNode<'_>) -> Vec<Node> {
        let ranges = content_ranges(node);
        let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
            return Vec::new();
        };
        let (start, end) = (first.start_byte, last.end_byte);

        if self.inline.set_included_ranges(&ranges).is_err() {
            return self.text_nodes(start, end, &ranges);
        }
        let Some(tree) = self.inline.parse(self.source, None) else {
            return self.text_nodes(start, end, &ranges);
        };
        self.inline_children(tree.root_node(), start, end, &ranges)
    }

    fn inline_children(
        &self,
        parent: TsNode<'_>,
        start: usize,
        end: usize,
        ranges: &[TsRange],
    ) -> Vec<Node> {
        let mut out = Vec::new();
        let mut pos = start;
        let mut cursor = parent.walk();
        for child in parent.children(&mut cursor) {
            if child.end_byte() <= start || child.start_byte() >= end {
                continue;
            }
            if child.start_byte() > pos {
                out.extend(self.text_nodes(pos, child.start_byte(), ranges));
            }
            if let Some(node) = self.inline_node(child, ranges) {
                out.push(node);
            }
            pos = pos.max(child.end_byte());
        }
        if end > pos {
            out.extend(self.text_nodes(pos, end, ranges));
        }
        out
    }

    fn inline_node(&self, node: TsNode<'_>, ranges: &[TsRange]) -> Option<Node> {
        let span = node.byte_range();
        let wrap = |kind: NodeKind| Node {
            kind,
            span: Some(span.clone()),
            children: self.inline_children(node, node.start_byte(), node.end_byte(), ranges),
        };

        let converted = match node.kind() {
            "emphasis_delimiter" | "code_span_delimiter" | "block_continuation" => return None,
            "emphasis" => wrap(NodeKind::Emphasis),
            "strong_emphasis" => wrap(NodeKind::Strong),
            "strikethrough" => wrap(NodeKind::Strikethrough),
            "code_span" => {
                let mut cursor = node.walk();
                let delimiters: Vec<TsNode<'_>> = node
                    .children(&mut cursor)
                    .filter(|c| c.kind() == "code_span_delimiter")
                    .collect();
                let (from, to) = match (delimiters.first(), delimiters.last()) {
                    (Some(open), Some(close)) if delimiters.len() >= 2 => {
                        (open.end_byte(), close.start_byte())
                    },
                    _ => (node.start_byte(), node.end_byte()),
                };
                let literal = slice_in_ranges(self.source, from, to, ranges).replace('\n', " ");
                Node::with_span(NodeKind::CodeSpan(strip_code_span_padding(&literal)), span)
            },
            "inline_link" => {
                let destination = find_child(node, "link_destination")
                    .map(|d| clean_destination(self.slice(d.byte_range())))
                    .unwrap_or_default();
                let title =
                    find_child(node, "link_title").map(|t| clean_title(self.slice(t.byte_range())));
                Node {
                    kind: NodeKind::Link { destination, title },
                    span: Some(span),
                    children: self.label_children(node, "link_text", ranges),
                }
            },
            "full_reference_link" | "collapsed_reference_link" | "shortcut_link" => {
                let label = find_child(node, "link_label")
                    .or_else(|| find_child(node, "link_text"))
                    .map(|l| self.slice(l.byte_range()).to_string())
                    .unwrap_or_default();
                match self.references.get(&normalize_label(&label)) {
                    Some((destination, title)) => Node {
                        kind: NodeKind::Link {
                            destination: destination.clone(),
                            title: title.clone(),
                        },
                        span: Some(span),
                        children: self.label_children(node, "link_text", ranges),
                    },
                    None => Node::with_span(
                        NodeKind::Text(slice_in_ranges(self.source, span.start, span.end, ranges)),
                        span,
                    ),
                }
            },
            "image" => {
                let (destination, title) = if let Some(d) = find_child(node, "link_destination") {
                    (
                        clean_destination(self.slice(d.byte_range())),
                        find_child(node, "link_title")
                            .map(|t| clean_title(self.slice(t.byte_range()))),
                    )
                } else {
                    find_child(node, "link_label")
                        .and_then(|l| {
                            self.references
                                .get(&normalize_label(self.slice(l.byte_range())))
                        })
                        .cloned()
                        .unwrap_or_default()
                };
                Node {
                    kind: NodeKind::Image { destination, title },
                    span: Some(span),
                    children: self.label_children(node, "image_description", ranges),
                }
            },
            "uri_autolink" | "email_autolink" => {
                let url = self
                    .slice(span.clone())
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string();
                Node::with_span(
                    NodeKind::AutoLink {
                        url,
                        email: node.kind() == "email_autolink",
                    },
                    span,
                )
            },
            "hard_line_break" => Node::with_span(NodeKind::HardBreak, span),
            "backslash_escape" => {
                let escaped = self.slice(span.clone()).chars().skip(1).collect::<String>();
                Node::with_span(NodeKind::Text(escaped), span)
            },
            "entity_reference" | "numeric_character_reference" => {
                let decoded = decode_html_entities(self.slice(span.clone())).into_owned();
                Node::with_span(NodeKind::Text(decoded), span)
            },
            "html_tag" => {
                Node::with_span(NodeKind::HtmlInline(self.slice(span.clone()).to_string()), span)
            },
            _ => Node::with_span(
                NodeKind::Text(slice_in_ranges(self.source, span.start, span.end, ranges)),
                span,
            ),
        };
        Some(converted)
    }

    fn label_children(&self, node: TsNode<'_>, label_kind: &str, ranges: &[TsRange]) -> Vec<Node> {
        find_child(node, label_kind)
            .map(|label| self.inline_children(label, label.start_byte(), label.end_byte(), ranges))
            .unwrap_or_default()
    }

    fn text_nodes(&self, start: usize, end: usize, ranges: &[TsRange]) -> Vec<Node> {
        let text = slice_in_ranges(self.source, start, end, ranges);
        let mut out = Vec::new();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                out.push(Node::new(NodeKind::SoftBreak));
            }
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                out.push(Node::with_span(NodeKind::Text(line.to_string()), start..end));
            }
        }
        out
    }

    fn text_without_continuations(&self, node: TsNode<'_>) -> String {
        let ranges = content_ranges(node);
        slice_in_ranges(self.source, node.start_byte(), node.end_byte(), &ranges)
    }

    fn slice(&self, range: Range<usize>) -> &str {
        self.source.get(range).unwrap_or_default()
    }
}

fn named_children(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn find_child<'t>(node: TsNode<'t>, kind: &str) -> Option<TsNode<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn heading_level(node: TsNode<'_>) -> u8 {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "atx_h1_marker" => return 1,
            "atx_h2_marker" => return 2,
            "atx_h3_marker" => return 3,
            "atx_h4_marker" => return 4,
            "atx_h5_marker" => return 5,
            "atx_h6_marker" => return 6,
            _ => {},
        }
    }
    1
}

fn task_state(item: TsNode<'_>) -> Option<bool> {
    let mut candidates = named_children(item);
    if let Some(paragraph) = candidates.iter().find(|c| c.kind() == "paragraph").copied() {
        candidates.extend(named_children(paragraph));
    }
    candidates.iter().find_map(|c| match c.kind() {
        "task_list_marker_checked" => Some(true),
        "task_list_marker_unchecked" => Some(false),
        _ => None,
    })
}

/// Ranges covering `node` minus its block continuation children.
fn content_ranges(node: TsNode<'_>) -> Vec<TsRange> {
    let mut ranges = Vec::new();
    let mut start_byte = node.start_byte();
    let mut start_point = node.start_position();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "block_continuation" {
            continue;
        }
        if child.start_byte() > start_byte {
            ranges.push(TsRange {
                start_byte,
                end_byte: child.start_byte(),
                start_point,
                end_point: child.start_position(),
            });
        }
        start_byte = child.end_byte();
        start_point = child.end_position();
    }
    if node.end_byte() > start_byte {
        ranges.push(TsRange {
            start_byte,
            end_byte: node.end_byte(),
            start_point,
            end_point: node.end_position(),
        });
    }
    ranges
}

fn slice_in_ranges(source: &str, start: usize, end: usize, ranges: &[TsRange]) -> String {
    let mut out = String::new();
    for range in ranges {
        let lo = start.max(range.start_byte);
        let hi = end.min(range.end_byte);
        if lo < hi {
            out.push_str(source.get(lo..hi).unwrap_or_default());
        }
    }
    out
}

fn collect_references(node: TsNode<'_>, source: &str, refs: &mut HashMap<String, Reference>) {
    for child in named_children(node) {
        if child.kind() == "link_reference_definition" {
            let text = |kind: &str| {
                find_child(child, kind).and_then(|n| source.get(n.byte_range()))
            };
            if let (Some(label), Some(destination)) = (text("link_label"), text("link_destination"))
            {
                refs.entry(normalize_label(label)).or_insert_with(|| {
                    (clean_destination(destination), text("link_title").map(clean_title))
                });
            }
        } else {
            collect_references(child, source, refs);
        }
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn clean_destination(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|d| d.strip_suffix('>'))
        .unwrap_or(trimmed)
        .to_string()
}

fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some('"'), Some('"')) | (Some('\''), Some('\'')) | (Some('('), Some(')')) => {
            chars.as_str().to_string()
        },
        _ => trimmed.to_string(),
    }
}

fn strip_code_span_padding(literal: &str) -> String {
    if literal.len() >= 2
        && literal.starts_with(' ')
        && literal.ends_with(' ')
        && !literal.trim().is_empty()
    {
        literal[1..literal.len() - 1].to_string()
    } else {
        literal.to_string()
    }
}

fn strip_indent(line: &str, width: usize) -> &str {
    let mut removed = 0;
    let mut idx = 0;
    for (i, ch) in line.char_indices() {
        if removed >= width {
            break;
        }
        match ch {
            ' ' => removed += 1,
            '\t' => removed = width,
            _ => break,
        }
        idx = i + ch.len_utf8();
    }
    &line[idx..]
}

/// Trim trailing line endings from a span.
fn trim_span(source: &str, span: Range<usize>) -> Range<usize> {
    let bytes = source.as_bytes();
    let mut end = span.end.min(bytes.len());
    while end > span.start && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    span.start..end
}
