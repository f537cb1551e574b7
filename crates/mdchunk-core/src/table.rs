//! Structural analysis of GFM tables.
//!
//! The analyzer reads a table twice: once from the parsed tree (header and
//! data cells, column count) and once from the raw source lines (alignment
//! markers, per-row cell counts). The tree is authoritative for the column
//! count; any raw row that disagrees is reported as a defect. Analysis never
//! stops at the first defect, so the error list covers the whole table.

use crate::extract::ContentExtractor;
use crate::node::{Node, NodeKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Delimiter row cell: `---`, `:---`, `---:` or `:---:`.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static DELIMITER_CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:?-+:?$").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Column alignment from the delimiter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// `:---`
    Left,
    /// `:---:`
    Center,
    /// `---:`
    Right,
    /// `---`
    None,
}

impl Alignment {
    fn from_delimiter(cell: &str) -> Self {
        match (cell.starts_with(':'), cell.ends_with(':')) {
            (true, true) => Self::Center,
            (true, false) => Self::Left,
            (false, true) => Self::Right,
            (false, false) => Self::None,
        }
    }

    /// Metadata name of the alignment.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::None => "none",
        }
    }
}

/// Inferred type of a cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CellType {
    /// Blank cell.
    Empty,
    /// Digits only.
    Integer,
    /// Digits with one decimal point.
    Decimal,
    /// `YYYY-MM-DD`.
    Date,
    /// `http://` or `https://` URL.
    Url,
    /// Email address.
    Email,
    /// `true`/`false`/`yes`/`no`, any case.
    Boolean,
    /// Anything else.
    Text,
}

impl CellType {
    /// Classify a cell. Matchers are tried in priority order.
    pub fn classify(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            Self::Empty
        } else if value.bytes().all(|b| b.is_ascii_digit()) {
            Self::Integer
        } else if is_decimal(value) {
            Self::Decimal
        } else if DATE_RE.is_match(value) {
            Self::Date
        } else if URL_RE.is_match(value) {
            Self::Url
        } else if EMAIL_RE.is_match(value) {
            Self::Email
        } else if matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "false" | "yes" | "no"
        ) {
            Self::Boolean
        } else {
            Self::Text
        }
    }

    /// Metadata name of the type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Url => "url",
            Self::Email => "email",
            Self::Boolean => "boolean",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_decimal(value: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for b in value.bytes() {
        match b {
            b'.' => dots += 1,
            b'0'..=b'9' => digits += 1,
            _ => return false,
        }
    }
    dots == 1 && digits > 0
}

/// Result of analyzing one table. Consumed by [`TableInfo::into_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Header row plus data rows.
    pub rows: usize,
    /// Authoritative column count.
    pub columns: usize,
    /// Whether the table has a header row.
    pub has_header: bool,
    /// Header cell texts.
    pub header_cells: Vec<String>,
    /// Data cell texts, row by row.
    pub data_rows: Vec<Vec<String>>,
    /// Per-column alignment, empty when no delimiter row was found.
    pub alignments: Vec<Alignment>,
    /// Inferred types of the header cells followed by every data row.
    pub cell_types: Vec<Vec<CellType>>,
    /// Whether no defect was found.
    pub is_well_formed: bool,
    /// Structural defects in discovery order.
    pub errors: Vec<String>,
}

impl TableInfo {
    /// Count of each cell type over all cells.
    pub fn type_histogram(&self) -> BTreeMap<CellType, usize> {
        let mut histogram = BTreeMap::new();
        for cell in self.cell_types.iter().flatten() {
            *histogram.entry(*cell).or_insert(0) += 1;
        }
        histogram
    }

    /// Stringified chunk metadata.
    pub fn into_metadata(self) -> BTreeMap<String, String> {
        let cell_types = {
            let mut entries: Vec<String> = self
                .type_histogram()
                .into_iter()
                .map(|(cell_type, count)| format!("{cell_type}:{count}"))
                .collect();
            entries.sort();
            entries.join(",")
        };
        let alignments = self
            .alignments
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut metadata = BTreeMap::new();
        metadata.insert("rows".to_string(), self.rows.to_string());
        metadata.insert("columns".to_string(), self.columns.to_string());
        metadata.insert("has_header".to_string(), self.has_header.to_string());
        metadata.insert("is_well_formed".to_string(), self.is_well_formed.to_string());
        metadata.insert("alignments".to_string(), alignments);
        metadata.insert("cell_types".to_string(), cell_types);
        metadata.insert("error_count".to_string(), self.errors.len().to_string());
        metadata.insert("errors".to_string(), self.errors.join("; "));
        metadata
    }
}

/// Table structural analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableAnalyzer;

impl TableAnalyzer {
    /// Create an analyzer.
    pub const fn new() -> Self {
        Self
    }

    /// Analyze a [`NodeKind::Table`] node.
    pub fn analyze(&self, extractor: &ContentExtractor<'_>, table: &Node) -> TableInfo {
        let mut header_cells = None;
        let mut data_rows = Vec::new();
        for row in &table.children {
            let cells: Vec<String> = row
                .children
                .iter()
                .map(|cell| extractor.plain_text(cell))
                .collect();
            match row.kind {
                NodeKind::TableHeader if header_cells.is_none() => header_cells = Some(cells),
                NodeKind::TableHeader | NodeKind::TableRow => data_rows.push(cells),
                _ => {},
            }
        }

        let has_header = header_cells.is_some();
        let header_cells = header_cells.unwrap_or_default();
        let columns = std::iter::once(header_cells.len())
            .chain(data_rows.iter().map(Vec::len))
            .max()
            .unwrap_or(0);

        let mut errors = Vec::new();
        let raw = extractor.slice(table).map(scan_raw).unwrap_or_default();

        for (index, count) in raw.row_cells.iter().enumerate() {
            if *count != columns {
                errors.push(format!(
                    "row {} has {count} cells, expected {columns}",
                    index + 1
                ));
            }
        }
        if let Some(raw_columns) = raw.row_cells.iter().max().filter(|max| **max != columns) {
            errors.push(format!(
                "source rows have up to {raw_columns} cells but the parsed table has {columns} columns"
            ));
        }

        if !has_header {
            errors.push("missing header row".to_string());
        }
        if data_rows.is_empty() {
            errors.push("table has no data rows".to_string());
        }
        if has_header && header_cells.len() != columns {
            errors.push(format!(
                "header has {} cells, expected {columns}",
                header_cells.len()
            ));
        }
        if !raw.alignments.is_empty() && raw.alignments.len() != columns {
            errors.push(format!(
                "delimiter row has {} entries, expected {columns}",
                raw.alignments.len()
            ));
        }

        let cell_types: Vec<Vec<CellType>> = std::iter::once(&header_cells)
            .filter(|_| has_header)
            .chain(&data_rows)
            .map(|row| row.iter().map(|cell| CellType::classify(cell)).collect())
            .collect();

        TableInfo {
            rows: usize::from(has_header) + data_rows.len(),
            columns,
            has_header,
            header_cells,
            data_rows,
            alignments: raw.alignments,
            cell_types,
            is_well_formed: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Default)]
struct RawScan {
    alignments: Vec<Alignment>,
    /// Cell counts of the non-delimiter rows.
    row_cells: Vec<usize>,
}

fn scan_raw(source: &str) -> RawScan {
    let mut scan = RawScan::default();
    for line in source.lines() {
        let line = strip_quote_prefix(line);
        if line.is_empty() {
            continue;
        }
        let cells = split_row(line);
        let is_delimiter =
            !cells.is_empty() && cells.iter().all(|cell| DELIMITER_CELL_RE.is_match(cell));
        if is_delimiter {
            if scan.alignments.is_empty() {
                scan.alignments = cells.iter().map(|c| Alignment::from_delimiter(c)).collect();
            }
        } else {
            scan.row_cells.push(cells.len());
        }
    }
    scan
}

/// Drop `>` markers of tables nested in block quotes.
fn strip_quote_prefix(line: &str) -> &str {
    let mut rest = line.trim();
    while let Some(stripped) = rest.strip_prefix('>') {
        rest = stripped.trim_start();
    }
    rest
}

/// Split a pipe row into trimmed cells, honoring `\|` escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut body = line.trim();
    body = body.strip_prefix('|').unwrap_or(body);
    if body.ends_with('|') && !body.ends_with("\\|") {
        body = &body[..body.len() - 1];
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            },
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn table_node(source: &str, header: &[&str], rows: &[&[&str]]) -> Node {
        let row = |kind: NodeKind, cells: &[&str]| {
            cells.iter().fold(Node::new(kind), |row, cell| {
                row.child(Node::new(NodeKind::TableCell).child(Node::text(*cell)))
            })
        };
        let mut table = Node::with_span(NodeKind::Table, 0..source.len())
            .child(row(NodeKind::TableHeader, header));
        for cells in rows {
            table = table.child(row(NodeKind::TableRow, cells));
        }
        table
    }

    #[test]
    fn test_well_formed_table() {
        let source = "| Name | Age |\n|:-----|----:|\n| Ann | 31 |\n| Bob | 42 |\n| Cy | 7 |";
        let node = table_node(
            source,
            &["Name", "Age"],
            &[&["Ann", "31"], &["Bob", "42"], &["Cy", "7"]],
        );
        let info = TableAnalyzer::new().analyze(&ContentExtractor::new(source), &node);

        assert!(info.is_well_formed, "unexpected errors: {:?}", info.errors);
        assert_eq!(info.rows, 4);
        assert_eq!(info.columns, 2);
        assert_eq!(info.alignments, vec![Alignment::Left, Alignment::Right]);

        let metadata = info.into_metadata();
        assert_eq!(metadata["rows"], "4");
        assert_eq!(metadata["has_header"], "true");
        assert_eq!(metadata["alignments"], "left,right");
        assert_eq!(metadata["cell_types"], "integer:3,text:5");
        assert_eq!(metadata["error_count"], "0");
        assert_eq!(metadata["errors"], "");
    }

    #[test]
    fn test_extra_cell_is_a_defect_and_analysis_continues() {
        let source = "| a | b |\n|---|---|\n| 1 | 2 | 3 |\n| 4 |\n";
        let node = table_node(source, &["a", "b"], &[&["1", "2"], &["4"]]);
        let info = TableAnalyzer::new().analyze(&ContentExtractor::new(source), &node);

        assert!(!info.is_well_formed);
        assert!(info.errors.iter().any(|e| e.starts_with("row 2 has 3 cells")));
        assert!(info.errors.iter().any(|e| e.starts_with("row 3 has 1 cells")));
        assert_eq!(info.columns, 2);
    }

    #[test]
    fn test_header_only_table_has_no_data_rows() {
        let source = "| a |\n|---|\n";
        let node = table_node(source, &["a"], &[]);
        let info = TableAnalyzer::new().analyze(&ContentExtractor::new(source), &node);
        assert!(!info.is_well_formed);
        assert!(info.errors.contains(&"table has no data rows".to_string()));
        assert_eq!(info.rows, 1);
    }

    #[test]
    fn test_cell_classification_priority() {
        let cases = [
            ("", CellType::Empty),
            ("  ", CellType::Empty),
            ("0042", CellType::Integer),
            ("3.14", CellType::Decimal),
            (".5", CellType::Decimal),
            ("1.2.3", CellType::Text),
            ("2024-02-29", CellType::Date),
            ("HTTPS://example.com/x", CellType::Url),
            ("ops@example.com", CellType::Email),
            ("Yes", CellType::Boolean),
            ("FALSE", CellType::Boolean),
            ("maybe", CellType::Text),
        ];
        for (value, expected) in cases {
            assert_eq!(CellType::classify(value), expected, "value {value:?}");
        }
    }

    #[test]
    fn test_split_row_escapes() {
        assert_eq!(split_row("| a \\| b | c |"), vec!["a | b", "c"]);
        assert_eq!(split_row("a|b"), vec!["a", "b"]);
        assert_eq!(split_row("|:--:|"), vec![":--:"]);
    }

    #[test]
    fn test_table_without_span_skips_raw_scan() {
        let node = Node::new(NodeKind::Table)
            .child(Node::new(NodeKind::TableHeader).child(Node::new(NodeKind::TableCell)))
            .child(Node::new(NodeKind::TableRow).child(Node::new(NodeKind::TableCell)));
        let info = TableAnalyzer::new().analyze(&ContentExtractor::new(""), &node);
        assert!(info.is_well_formed);
        assert!(info.alignments.is_empty());
        assert_eq!(info.cell_types, vec![vec![CellType::Empty], vec![CellType::Empty]]);
    }
}
