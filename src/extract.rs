use std::path::Path;

use pdfplumber::{Pdf, TableSettings};
use tracing::{debug, trace};

use crate::errors::{AppError, AppResult};
use crate::ingestion::{NormalizedRow, RawRow, RowNormalizer};

pub type Table = Vec<RawRow>;

/// Source of tabular cell data for one input file.
pub trait TableExtractor {
    fn extract(&self, path: &Path) -> AppResult<Vec<Table>>;
}

/// Ruled-table extraction from PDF pages.
#[derive(Default)]
pub struct PdfTableExtractor {
    settings: TableSettings,
}

impl PdfTableExtractor {
    pub fn new(settings: TableSettings) -> Self {
        Self { settings }
    }
}

impl TableExtractor for PdfTableExtractor {
    fn extract(&self, path: &Path) -> AppResult<Vec<Table>> {
        let pdf = Pdf::open_file(path, None).map_err(|err| pdf_error(path, err))?;
        let mut tables = Vec::new();
        for page in pdf.pages_iter() {
            let page = page.map_err(|err| pdf_error(path, err))?;
            let found = page.extract_tables(&self.settings);
            trace!(page = page.page_number(), tables = found.len(), "extracted page tables");
            tables.extend(found.into_iter().map(|table| {
                table
                    .into_iter()
                    .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
                    .collect()
            }));
        }
        Ok(tables)
    }
}

fn pdf_error(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::Pdf(format!("{}: {err}", path.display()))
}

/// Extract every table of every file, in order, keeping the rows the normalizer accepts.
pub fn parse_files<P: AsRef<Path>>(
    extractor: &dyn TableExtractor,
    normalizer: &dyn RowNormalizer,
    paths: &[P],
) -> AppResult<Vec<NormalizedRow>> {
    let mut rows = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let tables = extractor.extract(path)?;
        let mut seen = 0_usize;
        let before = rows.len();
        for raw in tables.iter().flatten() {
            seen += 1;
            match normalizer.normalize(raw) {
                Some(row) => rows.push(row),
                None => trace!(?raw, "skipping incomplete row"),
            }
        }
        debug!(
            path = %path.display(),
            tables = tables.len(),
            rows = seen,
            kept = rows.len() - before,
            "parsed input file"
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::ingestion::{GttAbbNormalizer, PassThroughNormalizer};

    struct FixedTables(HashMap<PathBuf, Vec<Table>>);

    impl TableExtractor for FixedTables {
        fn extract(&self, path: &Path) -> AppResult<Vec<Table>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| AppError::Pdf(format!("{}: not found", path.display())))
        }
    }

    fn cells(values: &[&str]) -> RawRow {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn keeps_file_and_row_order() {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("a.pdf"),
            vec![
                vec![cells(&["first", "Bar"]), cells(&["", "skipped"])],
                vec![cells(&["second", "Edicola"])],
            ],
        );
        files.insert(PathBuf::from("b.pdf"), vec![vec![cells(&["third"])]]);
        let extractor = FixedTables(files);

        let rows = parse_files(&extractor, &PassThroughNormalizer, &["a.pdf", "b.pdf"]).unwrap();
        let addresses: Vec<_> = rows.iter().map(|row| row.address.as_str()).collect();
        assert_eq!(addresses, ["first", "second", "third"]);
    }

    #[test]
    fn header_rows_and_fragments_are_skipped() {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("gtt.pdf"),
            vec![vec![
                cells(&["VIA", "INDIRIZZO", "N° CIVICO", "INTERNO", "CAP"]),
                cells(&["", "", "", "", "", "", "BAR", ""]),
                cells(&["CORSO", "FRANCIA", "10", "", "10143", "TORINO", "BAR", "SI"]),
            ]],
        );
        let extractor = FixedTables(files);

        let rows = parse_files(&extractor, &GttAbbNormalizer, &["gtt.pdf"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "CORSO FRANCIA 10 , 10143, TORINO");
    }

    #[test]
    fn extraction_failure_propagates() {
        let extractor = FixedTables(HashMap::new());
        let err = parse_files(&extractor, &PassThroughNormalizer, &["missing.pdf"]).unwrap_err();
        assert!(matches!(err, AppError::Pdf(_)));
    }

    #[test]
    fn unreadable_pdf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = PdfTableExtractor::default().extract(&path).unwrap_err();
        assert!(matches!(err, AppError::Pdf(message) if message.contains("broken.pdf")));
    }
}
