mod classify;
mod csv_out;
mod error;
mod merge;
mod model;
mod options;
mod page_text;
mod pdf_reader;
mod reconstruct;
mod segment;
mod shape;
mod warning;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::csv_out::write_records;
use crate::merge::merge_records;
use crate::page_text::{read_lines, render_chunk, render_page_text, write_lines, write_page_list};
use crate::reconstruct::reconstruct_chunk;
use crate::segment::segment;

pub use classify::PageClassifier;
pub use csv_out::{CsvRecords, read_records};
pub use error::PipelineError;
pub use merge::{MergeStats, MergedTable, SourceCounts, merge_csv_files};
pub use model::{ClassifiedPage, CompoundRecord, HeaderMarker, Page, TableChunk};
pub use options::{
    ClassifierMode, ClassifierOptions, ExtractorBackend, PageSelection, PairingPolicy,
    PipelineOptions, SegmenterStrategy,
};
pub use page_text::{parse_page_marker, read_page_list};
pub use pdf_reader::{PageSource, open_pdf};
pub use reconstruct::{ChunkRecords, ChunkRejection};
pub use shape::{LineShape, ShapeRules};
pub use warning::{PipelineWarning, UnitFailure, WarningCode};

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn success_ratio(ok: usize, total: usize) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        ok as f64 * 100.0 / total as f64
    };
    format!("{ok}/{total} ({pct:.1}%)")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageScan {
    pub backend: String,
    pub page_count: u32,
    pub table_pages: Vec<u32>,
    pub scores: BTreeMap<u32, i32>,
    pub warnings: Vec<PipelineWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractReport {
    pub backend: String,
    pub pages_written: Vec<u32>,
    pub line_count: usize,
    pub warnings: Vec<PipelineWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseReport {
    pub chunk_count: usize,
    pub parsed_chunks: usize,
    pub record_count: usize,
    pub duplicate_count: usize,
    pub dropped_incomplete: usize,
    pub unavailable_count: usize,
    pub skipped: Vec<UnitFailure>,
    pub warnings: Vec<PipelineWarning>,
}

impl ParseReport {
    #[must_use]
    pub fn chunk_ratio(&self) -> String {
        success_ratio(self.parsed_chunks, self.chunk_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub scan: PageScan,
    pub parse: ParseReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTables {
    pub chunks: Vec<TableChunk>,
    pub tables: Vec<(String, Vec<CompoundRecord>)>,
    pub records: Vec<CompoundRecord>,
    pub report: ParseReport,
}

fn scan_pages(
    source: &dyn PageSource,
    options: &PipelineOptions,
) -> Result<(PageScan, Vec<Page>), PipelineError> {
    let classifier = PageClassifier::new(&options.classifier)?;
    let mut scan = PageScan {
        backend: source.backend_name().to_string(),
        page_count: source.page_count(),
        ..PageScan::default()
    };
    let mut table_pages = Vec::new();

    for page in source.pages() {
        if page.lines.is_empty() {
            debug!(page = page.page_number, "page has no text");
            scan.warnings.push(
                PipelineWarning::new(WarningCode::PageExtractionFailed, "page produced no text")
                    .with_page(page.page_number),
            );
        }
        let classified = classifier.classify(page);
        scan.scores.insert(classified.page.page_number, classified.score);
        if classified.is_table_page {
            scan.table_pages.push(classified.page.page_number);
            table_pages.push(classified.page);
        }
    }

    if scan.table_pages.is_empty() {
        scan.warnings.push(PipelineWarning::new(
            WarningCode::NoTablesDetected,
            "no page was classified as a table page",
        ));
    }
    info!(
        backend = %scan.backend,
        pages = scan.page_count,
        table_pages = scan.table_pages.len(),
        "classified pages"
    );
    Ok((scan, table_pages))
}

fn delimiter_for(options: &PipelineOptions) -> Option<&str> {
    options.delimit_lines.then_some(options.delimiter.as_str())
}

/// Classifies every page of `input_pdf`. When `page_list` is given, the
/// table page numbers are written there one per line.
pub fn find_table_pages(
    input_pdf: &Path,
    page_list: Option<&Path>,
    options: &PipelineOptions,
) -> Result<PageScan, PipelineError> {
    options.validate()?;
    let source = open_pdf(input_pdf, options.backend)?;
    let (scan, _) = scan_pages(source.as_ref(), options)?;
    if let Some(path) = page_list {
        write_page_list(path, &scan.table_pages)?;
    }
    Ok(scan)
}

/// Writes the selected pages of `input_pdf` as a page-text file. Page
/// numbers outside the document are reported and skipped.
pub fn extract_page_text(
    input_pdf: &Path,
    selection: &PageSelection,
    output_text: &Path,
    options: &PipelineOptions,
) -> Result<ExtractReport, PipelineError> {
    options.validate()?;
    if selection.is_empty() {
        return Err(PipelineError::NoPagesSelected);
    }
    let source = open_pdf(input_pdf, options.backend)?;
    let page_count = source.page_count();

    let mut report = ExtractReport {
        backend: source.backend_name().to_string(),
        ..ExtractReport::default()
    };
    let mut pages = Vec::with_capacity(selection.len());
    for page_number in selection.iter() {
        if page_number == 0 || page_number > page_count {
            warn!(page = page_number, page_count, "selected page is not in the document");
            report.warnings.push(
                PipelineWarning::new(
                    WarningCode::PageNotInDocument,
                    format!("document has {page_count} page(s)"),
                )
                .with_page(page_number),
            );
            continue;
        }
        let page = source.page(page_number);
        if page.lines.is_empty() {
            report.warnings.push(
                PipelineWarning::new(WarningCode::PageExtractionFailed, "page produced no text")
                    .with_page(page_number),
            );
        }
        report.pages_written.push(page_number);
        pages.push(page);
    }

    let lines = render_page_text(&pages, delimiter_for(options));
    report.line_count = lines.len();
    write_lines(output_text, &lines)?;
    Ok(report)
}

/// Segments a page-text line stream and reconstructs every chunk. Malformed
/// or excluded chunks are skipped and listed in the report.
pub fn parse_lines(
    lines: &[String],
    options: &PipelineOptions,
) -> Result<ParsedTables, PipelineError> {
    options.validate()?;
    let mut report = ParseReport::default();
    let chunks = segment(lines, options, &mut report.warnings)?;
    let rules = ShapeRules::new(options)?;
    report.chunk_count = chunks.len();

    let mut tables = Vec::new();
    for chunk in &chunks {
        let id = &chunk.source_table_id;
        if chunk.lines.is_empty() {
            report.warnings.push(
                PipelineWarning::new(WarningCode::EmptyChunk, "table has a header but no rows")
                    .with_table(id.clone()),
            );
        }
        match reconstruct_chunk(chunk, options, &rules) {
            Ok(parsed) => {
                debug!(table = %id, records = parsed.records.len(), "reconstructed table");
                report.parsed_chunks += 1;
                report.dropped_incomplete += parsed.dropped_incomplete;
                tables.push((id.clone(), parsed.records));
            }
            Err(rejection) => {
                warn!(table = %id, %rejection, "skipping table");
                report.skipped.push(UnitFailure::new(id.clone(), rejection.to_string()));
            }
        }
    }

    if chunks.is_empty() {
        report.warnings.push(PipelineWarning::new(
            WarningCode::NoTablesDetected,
            "no table header was found in the page text",
        ));
    }

    let merged = merge_records(tables.clone());
    report.duplicate_count = merged.stats.duplicate_count;
    let (records, unavailable): (Vec<_>, Vec<_>) = merged
        .records
        .into_iter()
        .partition(|record| record.available_in_p11 || !options.available_only);
    report.unavailable_count = unavailable.len();
    report.record_count = records.len();

    info!(
        tables = %report.chunk_ratio(),
        records = report.record_count,
        duplicates = report.duplicate_count,
        "parsed page text"
    );
    Ok(ParsedTables {
        chunks,
        tables,
        records,
        report,
    })
}

fn write_table_files(
    dir: &Path,
    parsed: &ParsedTables,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir)?;
    for chunk in &parsed.chunks {
        let path = dir.join(format!("{}.txt", chunk.source_table_id));
        write_lines(&path, &render_chunk(chunk, &options.delimiter))?;
    }
    for (id, records) in &parsed.tables {
        let kept = records
            .iter()
            .filter(|record| record.available_in_p11 || !options.available_only)
            .cloned()
            .collect::<Vec<_>>();
        write_records(
            &dir.join(format!("{id}.csv")),
            &kept,
            options.csv_delimiter_byte(),
            options.extended_columns,
        )?;
    }
    Ok(())
}

/// Parses a page-text file into `output_csv`. The CSV is written even when
/// no record survives. With `tables_dir`, every chunk is also written there
/// as `table_NN.txt`, and every reconstructed chunk as `table_NN.csv`.
pub fn parse_page_text_to_csv(
    page_text: &Path,
    output_csv: &Path,
    tables_dir: Option<&Path>,
    options: &PipelineOptions,
) -> Result<ParseReport, PipelineError> {
    let lines = read_lines(page_text)?;
    let parsed = parse_lines(&lines, options)?;
    if let Some(dir) = tables_dir {
        write_table_files(dir, &parsed, options)?;
    }
    write_records(
        output_csv,
        &parsed.records,
        options.csv_delimiter_byte(),
        options.extended_columns,
    )?;
    Ok(parsed.report)
}

#[must_use]
pub fn page_text_path(output_csv: &Path) -> PathBuf {
    output_csv.with_extension("pages_text.txt")
}

/// Classifies, extracts and parses in one pass over a single open document.
pub fn run_all(
    input_pdf: &Path,
    output_csv: &Path,
    options: &PipelineOptions,
) -> Result<RunReport, PipelineError> {
    options.validate()?;
    let source = open_pdf(input_pdf, options.backend)?;
    let (scan, pages) = scan_pages(source.as_ref(), options)?;

    let lines = render_page_text(&pages, delimiter_for(options));
    write_lines(&page_text_path(output_csv), &lines)?;

    let parsed = parse_lines(&lines, options)?;
    write_records(
        output_csv,
        &parsed.records,
        options.csv_delimiter_byte(),
        options.extended_columns,
    )?;
    Ok(RunReport {
        scan,
        parse: parsed.report,
    })
}

fn csv_inputs(dir: &Path, exclude: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let exclude = exclude.canonicalize().ok();
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        if exclude.is_some() && path.canonicalize().ok() == exclude {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Merges every CSV in `dir` into `output_csv`. Unreadable inputs are
/// listed in `stats.failed`; the output is always written.
pub fn merge_csv_dir(
    dir: &Path,
    output_csv: &Path,
    options: &PipelineOptions,
) -> Result<MergeStats, PipelineError> {
    options.validate()?;
    let paths = csv_inputs(dir, output_csv)?;
    let delimiter = options.csv_delimiter_byte();
    let merged = merge_csv_files(&paths, delimiter);
    write_records(
        output_csv,
        &merged.records,
        delimiter,
        options.extended_columns,
    )?;
    info!(
        sources = %success_ratio(paths.len() - merged.stats.failed.len(), paths.len()),
        unique = merged.stats.unique_count,
        duplicate_rate = merged.stats.duplicate_rate,
        "merged tables"
    );
    Ok(merged.stats)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{PairingPolicy, PipelineOptions, SegmenterStrategy, parse_lines, success_ratio};

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn formats_success_ratio() {
        assert_eq!(success_ratio(3, 4), "3/4 (75.0%)");
        assert_eq!(success_ratio(0, 0), "0/0 (0.0%)");
    }

    #[test]
    fn odd_chunk_is_skipped_and_others_survive() {
        let stream = lines(&[
            "---", "Alias", "---", "Name", "---", "P11 P10", "---", "H2O", "---", "WATER", "---",
            "CH4", "---", "Databanks", "---", "---", "Alias", "---", "Name", "---", "P11 P10",
            "---", "N2", "---", "NITROGEN", "---", "Databanks", "---",
        ]);
        let parsed = parse_lines(&stream, &PipelineOptions::default()).expect("parse should run");

        assert_eq!(parsed.report.chunk_count, 2);
        assert_eq!(parsed.report.parsed_chunks, 1);
        assert_eq!(parsed.report.skipped.len(), 1);
        assert_eq!(parsed.report.skipped[0].unit, "table_01");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].key(), ("N2", "NITROGEN"));
    }

    #[test]
    fn availability_filter_drops_unflagged_rows() {
        let stream = lines(&[
            "Alias", "Name", "H2O", "---", "WATER", "X", "CH4", "---", "METHANE", "---",
            "Databanks",
        ]);
        let options = PipelineOptions {
            segmenter: SegmenterStrategy::PairedMarker,
            ..PipelineOptions::default()
        };
        let parsed = parse_lines(&stream, &options).expect("parse should run");
        assert_eq!(parsed.report.unavailable_count, 1);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].key(), ("H2O", "WATER"));

        let all = PipelineOptions {
            available_only: false,
            ..options
        };
        let parsed = parse_lines(&stream, &all).expect("parse should run");
        assert_eq!(parsed.records.len(), 2);
    }

    #[test]
    fn one_line_rows_after_inline_header() {
        let stream = lines(&[
            "===== [PAGE 7] =====",
            "ALIAS NAME P11 P10 P93",
            "H2O WATER X X",
            "C2H6O -2 ETHANOL X",
            "CO CARBON MONOXIDE",
            "",
            "===== [PAGE 8] =====",
            "Alias Name P11",
            "CH3COOH ACETIC ACID X",
            "PURE COMPONENT DATABANK PARAMETERS",
        ]);
        let options = PipelineOptions {
            segmenter: SegmenterStrategy::InlineHeader,
            pairing: PairingPolicy::SingleLine,
            delimit_lines: false,
            ..PipelineOptions::default()
        };
        let parsed = parse_lines(&stream, &options).expect("parse should run");

        assert_eq!(parsed.report.chunk_count, 2);
        assert_eq!(parsed.report.unavailable_count, 1);
        let keys = parsed
            .records
            .iter()
            .map(|record| record.key())
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![("C2H6O-2", "ETHANOL"), ("CH3COOH", "ACETIC-ACID"), ("H2O", "WATER")]
        );
    }
}
