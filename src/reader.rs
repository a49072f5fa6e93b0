// 📄 Raw Table Reader - page grids → one header + ordered raw rows
//
// The geometry work (finding table cells on a PDF page) belongs to an
// external extractor. This module only sees its output: per page, either no
// table or a grid of optional text cells.

use crate::config::DEFAULT_HEADER;
use crate::error::LedgerError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Columns per statement row
pub const COLUMNS: usize = 6;

/// One grid cell as produced by the extractor (`None` = empty cell)
pub type Cell = Option<String>;

/// One page: no table, or rows of cells
pub type PageTable = Option<Vec<Vec<Cell>>>;

/// Six cells in the order Date, Type, Description, Paid in, Paid out, Balance
pub type RawRow = [Cell; COLUMNS];

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

// ============================================================================
// EXTRACTOR SEAM
// ============================================================================

/// TableExtractor - the only contact point with the document-table tool
///
/// Implement this to plug in a different extractor; the rest of the
/// pipeline never touches document bytes.
pub trait TableExtractor: Send + Sync {
    /// Page grids in page order. `Err` means the document could not be read.
    fn extract_tables(&self, document: &Path) -> Result<Vec<PageTable>>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Reads the grids an external extractor dumped next to each document.
///
/// For `statement.pdf` the grid file is `statement.tables.json`: a JSON array
/// with one entry per page, either `null` or an array of rows of nullable
/// strings.
#[derive(Debug, Clone, Default)]
pub struct JsonGridExtractor;

impl JsonGridExtractor {
    pub fn new() -> Self {
        JsonGridExtractor
    }

    pub fn grid_path(document: &Path) -> PathBuf {
        document.with_extension("tables.json")
    }
}

impl TableExtractor for JsonGridExtractor {
    fn extract_tables(&self, document: &Path) -> Result<Vec<PageTable>> {
        let grid_path = Self::grid_path(document);
        let text = fs::read_to_string(&grid_path)
            .with_context(|| format!("Failed to open table grid: {}", grid_path.display()))?;
        let pages: Vec<PageTable> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse table grid: {}", grid_path.display()))?;
        Ok(pages)
    }

    fn name(&self) -> &str {
        "json-grid"
    }
}

// ============================================================================
// READER
// ============================================================================

pub struct RawTableReader<'a> {
    extractor: &'a dyn TableExtractor,
    header_label: String,
}

impl<'a> RawTableReader<'a> {
    pub fn new(extractor: &'a dyn TableExtractor, header_label: &str) -> Self {
        RawTableReader {
            extractor,
            header_label: header_label.to_string(),
        }
    }

    /// Read every page of a document.
    ///
    /// A first row whose first cell equals the header label is dropped on
    /// every page, not just the first one. Extractor failures and documents
    /// without rows both come back as `EmptyDocument`.
    pub fn read(&self, document: &Path) -> Result<RawDocument, LedgerError> {
        let name = document_name(document);

        let pages = match self.extractor.extract_tables(document) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(
                    document = %name,
                    extractor = self.extractor.name(),
                    "failed to extract tables: {:#}",
                    e
                );
                return Err(LedgerError::empty_because(name, format!("{:#}", e)));
            }
        };

        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut reshaped = 0usize;

        for (page_index, table) in pages.into_iter().enumerate() {
            let Some(table) = table else {
                tracing::debug!(document = %name, page = page_index + 1, "no table on page");
                continue;
            };

            let mut page_rows = table.into_iter();
            let starts_with_header = page_rows
                .as_slice()
                .first()
                .map(|first| self.is_header_row(first))
                .unwrap_or(false);

            if starts_with_header {
                if let Some(first) = page_rows.next() {
                    let labels: Vec<String> = first
                        .iter()
                        .map(|c| c.as_deref().unwrap_or("").trim().to_string())
                        .collect();
                    header.get_or_insert(labels);
                }
            }

            for cells in page_rows {
                if cells.len() != COLUMNS {
                    reshaped += 1;
                }
                rows.push(to_raw_row(cells));
            }
        }

        if reshaped > 0 {
            tracing::debug!(document = %name, reshaped, "rows padded or truncated to 6 cells");
        }

        if rows.is_empty() {
            return Err(LedgerError::empty(name));
        }

        tracing::info!(document = %name, rows = rows.len(), "extracted rows");

        Ok(RawDocument {
            header: header.unwrap_or_else(default_header),
            rows,
        })
    }

    fn is_header_row(&self, row: &[Cell]) -> bool {
        row.first()
            .and_then(|c| c.as_deref())
            .map(|c| c.trim() == self.header_label)
            .unwrap_or(false)
    }
}

pub fn default_header() -> Vec<String> {
    DEFAULT_HEADER.iter().map(|s| s.to_string()).collect()
}

/// File name for logs and provenance
pub fn document_name(document: &Path) -> String {
    document
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.pdf")
        .to_string()
}

fn to_raw_row(cells: Vec<Cell>) -> RawRow {
    let mut row: RawRow = Default::default();
    for (slot, cell) in row.iter_mut().zip(cells) {
        *slot = cell;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory extractor keyed by file name
    struct FakeExtractor {
        documents: HashMap<String, Vec<PageTable>>,
    }

    impl TableExtractor for FakeExtractor {
        fn extract_tables(&self, document: &Path) -> Result<Vec<PageTable>> {
            self.documents
                .get(&document_name(document))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("corrupt document"))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Some(c.to_string())).collect()
    }

    fn header() -> Vec<Cell> {
        row(&["Date", "Type", "Description", "Paid in", "Paid out", "Balance"])
    }

    fn extractor(name: &str, pages: Vec<PageTable>) -> FakeExtractor {
        let mut documents = HashMap::new();
        documents.insert(name.to_string(), pages);
        FakeExtractor { documents }
    }

    #[test]
    fn test_header_dropped_on_every_page() {
        let fake = extractor(
            "a.pdf",
            vec![
                Some(vec![header(), row(&["05 Jan 2024", "DPC", "x", "", "10.00", "90.00"])]),
                Some(vec![header(), row(&["06 Jan 2024", "POS", "y", "", "5.00", "85.00"])]),
                Some(vec![row(&["07 Jan 2024", "BGC", "z", "15.00", "", "100.00"])]),
            ],
        );
        let reader = RawTableReader::new(&fake, "Date");

        let doc = reader.read(Path::new("/in/a.pdf")).unwrap();

        assert_eq!(doc.rows.len(), 3);
        assert_eq!(doc.rows[0][0].as_deref(), Some("05 Jan 2024"));
        assert_eq!(doc.rows[1][0].as_deref(), Some("06 Jan 2024"));
        assert_eq!(doc.rows[2][0].as_deref(), Some("07 Jan 2024"));
        assert_eq!(doc.header, default_header());
    }

    #[test]
    fn test_pages_without_tables_are_skipped() {
        let fake = extractor(
            "a.pdf",
            vec![None, Some(vec![row(&["05 Jan 2024", "DPC", "x", "", "10.00", "90.00"])]), None],
        );
        let reader = RawTableReader::new(&fake, "Date");

        let doc = reader.read(Path::new("a.pdf")).unwrap();
        assert_eq!(doc.rows.len(), 1);
    }

    #[test]
    fn test_header_only_document_is_empty() {
        let fake = extractor("a.pdf", vec![Some(vec![header()]), Some(vec![header()])]);
        let reader = RawTableReader::new(&fake, "Date");

        let err = reader.read(Path::new("a.pdf")).unwrap_err();
        assert!(matches!(err, LedgerError::EmptyDocument { cause: None, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_extractor_failure_is_empty_document() {
        let fake = extractor("a.pdf", vec![]);
        let reader = RawTableReader::new(&fake, "Date");

        match reader.read(Path::new("broken.pdf")) {
            Err(LedgerError::EmptyDocument { document, cause }) => {
                assert_eq!(document, "broken.pdf");
                assert!(cause.unwrap().contains("corrupt"));
            }
            other => panic!("expected EmptyDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_short_and_long_rows_are_reshaped() {
        let fake = extractor(
            "a.pdf",
            vec![Some(vec![
                row(&["05 Jan 2024", "DPC"]),
                row(&["06 Jan 2024", "POS", "y", "", "5.00", "85.00", "stray"]),
            ])],
        );
        let reader = RawTableReader::new(&fake, "Date");

        let doc = reader.read(Path::new("a.pdf")).unwrap();
        assert_eq!(doc.rows[0][1].as_deref(), Some("DPC"));
        assert_eq!(doc.rows[0][5], None);
        assert_eq!(doc.rows[1][5].as_deref(), Some("85.00"));
    }

    #[test]
    fn test_detected_header_is_kept() {
        let custom = row(&["Date", "Code", "Details", "In", "Out", "Bal"]);
        let fake = extractor(
            "a.pdf",
            vec![Some(vec![custom, row(&["05 Jan 2024", "DPC", "x", "", "10.00", "90.00"])])],
        );
        let reader = RawTableReader::new(&fake, "Date");

        let doc = reader.read(Path::new("a.pdf")).unwrap();
        assert_eq!(doc.header[1], "Code");
    }

    #[test]
    fn test_json_grid_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("statement.pdf");
        fs::write(&document, b"%PDF-1.4").unwrap();
        fs::write(
            dir.path().join("statement.tables.json"),
            r#"[
                [["Date","Type","Description","Paid in","Paid out","Balance"],
                 ["05 Jan 2024","DPC","x",null,"10.00","90.00"]],
                null
            ]"#,
        )
        .unwrap();

        let extractor = JsonGridExtractor::new();
        let pages = extractor.extract_tables(&document).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].is_none());

        let doc = RawTableReader::new(&extractor, "Date").read(&document).unwrap();
        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.rows[0][3], None);
    }

    #[test]
    fn test_json_grid_missing_file_is_error() {
        let extractor = JsonGridExtractor::new();
        assert!(extractor.extract_tables(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
