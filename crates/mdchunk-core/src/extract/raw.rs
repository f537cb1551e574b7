//! Markdown reconstruction, one handler per node kind.

use super::ContentExtractor;
use crate::node::{Node, NodeKind};

pub(super) type RawHandler = fn(&ContentExtractor<'_>, &Node) -> String;

/// Handler table. New kinds register here.
pub(super) fn handler(kind: &NodeKind) -> RawHandler {
    match kind {
        NodeKind::Document => document,
        NodeKind::Heading { .. } => heading,
        NodeKind::CodeBlock { .. } => code_block,
        NodeKind::List { .. } => list,
        NodeKind::ListItem { .. } => list_item,
        NodeKind::BlockQuote => blockquote,
        NodeKind::Table => table,
        NodeKind::TableHeader | NodeKind::TableRow => table_row,
        NodeKind::ThematicBreak => thematic_break,
        NodeKind::HtmlBlock => html_block,
        _ => inline_block,
    }
}

fn document(ex: &ContentExtractor<'_>, node: &Node) -> String {
    blocks(ex, &node.children, "\n\n")
}

fn heading(_: &ContentExtractor<'_>, node: &Node) -> String {
    let level = match node.kind {
        NodeKind::Heading { level } => level.clamp(1, 6),
        _ => 1,
    };
    let text = inline_markdown(&node.children);
    format!("{} {}", "#".repeat(usize::from(level)), text.trim())
}

fn code_block(_: &ContentExtractor<'_>, node: &Node) -> String {
    let NodeKind::CodeBlock {
        info, fence, code, ..
    } = &node.kind
    else {
        return String::new();
    };
    let fence = fence.clone().unwrap_or_else(|| fence_for(code));
    format!(
        "{fence}{}\n{code}\n{fence}",
        info.as_deref().unwrap_or_default()
    )
}

/// Backtick fence longer than any backtick run inside `code`.
fn fence_for(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn list(ex: &ContentExtractor<'_>, node: &Node) -> String {
    let NodeKind::List {
        ordered,
        start,
        marker,
    } = node.kind
    else {
        return String::new();
    };
    let mut lines = Vec::with_capacity(node.children.len());
    for (ordinal, item) in (start..).zip(&node.children) {
        let bullet = if ordered {
            format!("{ordinal}{marker} ")
        } else {
            format!("{marker} ")
        };
        lines.push(prefix_lines(&list_item(ex, item), &bullet));
    }
    lines.join("\n")
}

fn list_item(ex: &ContentExtractor<'_>, node: &Node) -> String {
    let body = blocks(ex, &node.children, "\n");
    match node.kind {
        NodeKind::ListItem { task: Some(true) } => format!("[x] {body}"),
        NodeKind::ListItem { task: Some(false) } => format!("[ ] {body}"),
        _ => body,
    }
}

/// Put `first` before the first line and matching indentation before the rest.
fn prefix_lines(body: &str, first: &str) -> String {
    let indent = " ".repeat(first.chars().count());
    let mut out = String::with_capacity(body.len() + first.len());
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out.push_str(first);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&indent);
            }
        }
        out.push_str(line);
    }
    if out.is_empty() {
        out.push_str(first.trim_end());
    }
    out
}

fn blockquote(ex: &ContentExtractor<'_>, node: &Node) -> String {
    blocks(ex, &node.children, "\n\n")
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table(ex: &ContentExtractor<'_>, node: &Node) -> String {
    if let Some(slice) = ex.slice(node) {
        return slice.trim_end().to_string();
    }
    let mut rows: Vec<String> = node.children.iter().map(|row| table_row(ex, row)).collect();
    let columns = node.children.iter().map(|row| row.children.len()).max().unwrap_or(0);
    if columns > 0 && !rows.is_empty() {
        let delimiter = format!("|{}", " --- |".repeat(columns));
        rows.insert(1, delimiter);
    }
    rows.join("\n")
}

fn table_row(_: &ContentExtractor<'_>, node: &Node) -> String {
    let cells: Vec<String> = node
        .children
        .iter()
        .map(|cell| inline_markdown(&cell.children).trim().replace('|', "\\|"))
        .collect();
    format!("| {} |", cells.join(" | "))
}

fn thematic_break(ex: &ContentExtractor<'_>, node: &Node) -> String {
    ex.slice(node)
        .map_or_else(|| "---".to_string(), |s| s.trim().to_string())
}

fn html_block(ex: &ContentExtractor<'_>, node: &Node) -> String {
    ex.slice(node).unwrap_or_default().trim_end().to_string()
}

fn inline_block(ex: &ContentExtractor<'_>, node: &Node) -> String {
    if node.kind.is_block() {
        if node.children.is_empty() {
            return ex.slice(node).unwrap_or_default().to_string();
        }
        return inline_markdown(&node.children).trim().to_string();
    }
    inline_markdown(std::slice::from_ref(node))
}

fn blocks(ex: &ContentExtractor<'_>, nodes: &[Node], separator: &str) -> String {
    nodes
        .iter()
        .map(|child| ex.raw_content(child))
        .filter(|raw| !raw.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Markdown for a run of inline nodes.
fn inline_markdown(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        push_inline(node, &mut out);
    }
    out
}

fn push_inline(node: &Node, out: &mut String) {
    let wrap = |out: &mut String, delimiter: &str| {
        out.push_str(delimiter);
        out.push_str(&inline_markdown(&node.children));
        out.push_str(delimiter);
    };
    match &node.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Emphasis => wrap(out, "*"),
        NodeKind::Strong => wrap(out, "**"),
        NodeKind::Strikethrough => wrap(out, "~~"),
        NodeKind::CodeSpan(code) => {
            let ticks = if code.contains('`') { "``" } else { "`" };
            out.push_str(ticks);
            out.push_str(code);
            out.push_str(ticks);
        },
        NodeKind::Link { destination, title } => {
            out.push('[');
            out.push_str(&inline_markdown(&node.children));
            out.push_str("](");
            push_target(out, destination, title.as_deref());
        },
        NodeKind::Image { destination, title } => {
            out.push_str("![");
            out.push_str(&inline_markdown(&node.children));
            out.push_str("](");
            push_target(out, destination, title.as_deref());
        },
        NodeKind::AutoLink { url, .. } => {
            out.push('<');
            out.push_str(url);
            out.push('>');
        },
        NodeKind::SoftBreak => out.push('\n'),
        NodeKind::HardBreak => out.push_str("\\\n"),
        NodeKind::HtmlInline(html) => out.push_str(html),
        _ => out.push_str(&inline_markdown(&node.children)),
    }
}

fn push_target(out: &mut String, destination: &str, title: Option<&str>) {
    out.push_str(destination);
    if let Some(title) = title {
        out.push_str(" \"");
        out.push_str(title);
        out.push('"');
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_gets_atx_marker() {
        let node = Node::new(NodeKind::Heading { level: 3 })
            .child(Node::text("Setup "))
            .child(Node::new(NodeKind::CodeSpan("cargo".into())));
        assert_eq!(ContentExtractor::new("").raw_content(&node), "### Setup `cargo`");
    }

    #[test]
    fn test_code_block_fences() {
        let ex = ContentExtractor::new("");
        let fenced = Node::new(NodeKind::CodeBlock {
            fenced: true,
            info: Some("rust".into()),
            fence: Some("~~~".into()),
            code: "let x = 1;".into(),
        });
        assert_eq!(ex.raw_content(&fenced), "~~~rust\nlet x = 1;\n~~~");

        let indented = Node::new(NodeKind::CodeBlock {
            fenced: false,
            info: None,
            fence: None,
            code: "a ``` b".into(),
        });
        assert_eq!(ex.raw_content(&indented), "````\na ``` b\n````");
    }

    #[test]
    fn test_list_markers_and_tasks() {
        let item = |task, text: &str| {
            Node::new(NodeKind::ListItem { task })
                .child(Node::new(NodeKind::Paragraph).child(Node::text(text)))
        };
        let list = Node::new(NodeKind::List {
            ordered: true,
            start: 7,
            marker: ')',
        })
        .child(item(None, "seven"))
        .child(item(Some(true), "done"));
        assert_eq!(
            ContentExtractor::new("").raw_content(&list),
            "7) seven\n8) [x] done"
        );
    }

    #[test]
    fn test_blockquote_prefixes_every_line() {
        let quote = Node::new(NodeKind::BlockQuote)
            .child(Node::new(NodeKind::Paragraph).child(Node::text("one")))
            .child(Node::new(NodeKind::Paragraph).child(Node::text("two")));
        assert_eq!(ContentExtractor::new("").raw_content(&quote), "> one\n>\n> two");
    }

    #[test]
    fn test_table_rebuilt_without_span() {
        let row = |kind: NodeKind, cells: &[&str]| {
            cells.iter().fold(Node::new(kind), |row, cell| {
                row.child(Node::new(NodeKind::TableCell).child(Node::text(*cell)))
            })
        };
        let table = Node::new(NodeKind::Table)
            .child(row(NodeKind::TableHeader, &["a", "b"]))
            .child(row(NodeKind::TableRow, &["1", "x|y"]));
        assert_eq!(
            ContentExtractor::new("").raw_content(&table),
            "| a | b |\n| --- | --- |\n| 1 | x\\|y |"
        );
    }

    #[test]
    fn test_table_uses_source_slice() {
        let source = "|a|b|\n|-|-|\n|1|2|\n";
        let table = Node::with_span(NodeKind::Table, 0..source.len());
        assert_eq!(
            ContentExtractor::new(source).raw_content(&table),
            "|a|b|\n|-|-|\n|1|2|"
        );
    }

    #[test]
    fn test_inline_link_reconstruction() {
        let paragraph = Node::new(NodeKind::Paragraph)
            .child(Node::text("See "))
            .child(
                Node::new(NodeKind::Link {
                    destination: "/docs".into(),
                    title: Some("Docs".into()),
                })
                .child(Node::new(NodeKind::Strong).child(Node::text("docs"))),
            );
        assert_eq!(
            ContentExtractor::new("").raw_content(&paragraph),
            "See [**docs**](/docs \"Docs\")"
        );
    }
}
