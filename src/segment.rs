//! Header-sentinel mode needs one delimiter line between every extracted
//! line. Paired-marker mode needs availability flags after every row.
//! Inline-header mode reads one row per line.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::debug;

use crate::error::PipelineError;
use crate::model::{HeaderMarker, TableChunk};
use crate::options::{PipelineOptions, SegmenterStrategy};
use crate::page_text::parse_page_marker;
use crate::warning::{PipelineWarning, WarningCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Delimiter,
    Flag,
    SectionEnd,
    Header(HeaderMarker),
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MarkerKind {
    Delimiter,
    Flag,
}

struct LineRules<'a> {
    options: &'a PipelineOptions,
    databank_header: Regex,
    inline_header: Regex,
}

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern).map_err(|source| PipelineError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl<'a> LineRules<'a> {
    fn new(options: &'a PipelineOptions) -> Result<Self, PipelineError> {
        Ok(Self {
            options,
            databank_header: compile(&options.databank_header_pattern)?,
            inline_header: compile(&options.inline_header_pattern)?,
        })
    }

    fn ends_inline_table(&self, line: &str) -> bool {
        let upper = line.to_uppercase();
        parse_page_marker(line).is_some()
            || line.starts_with('\u{2022}')
            || self
                .options
                .section_end_markers
                .iter()
                .any(|marker| upper.contains(&marker.to_uppercase()))
    }

    fn kind(&self, line: &str) -> LineKind {
        let line = line.trim();
        if line.is_empty() {
            LineKind::Blank
        } else if line == self.options.delimiter {
            LineKind::Delimiter
        } else if line == self.options.flag_token {
            LineKind::Flag
        } else if parse_page_marker(line).is_some()
            || self
                .options
                .section_end_markers
                .iter()
                .any(|marker| line.contains(marker.as_str()))
        {
            LineKind::SectionEnd
        } else if line == "Alias" {
            LineKind::Header(HeaderMarker::Alias)
        } else if line == "Name" {
            LineKind::Header(HeaderMarker::Name)
        } else if self.databank_header.is_match(line) {
            LineKind::Header(HeaderMarker::DatabankHeader)
        } else {
            LineKind::Content
        }
    }
}

fn table_id(index: usize) -> String {
    format!("table_{:02}", index + 1)
}

/// Start offsets of every `[delimiter, "Alias", delimiter, "Name", delimiter]`
/// run in `lines`.
#[must_use]
pub fn find_header_sentinels(lines: &[String], delimiter: &str) -> Vec<usize> {
    if lines.len() < 5 {
        return Vec::new();
    }

    (0..=lines.len() - 5)
        .filter(|&start| {
            let window = &lines[start..start + 5];
            window[0].trim() == delimiter
                && window[1].trim() == "Alias"
                && window[2].trim() == delimiter
                && window[3].trim() == "Name"
                && window[4].trim() == delimiter
        })
        .collect()
}

fn segment_by_header_sentinel(lines: &[String], rules: &LineRules<'_>) -> Vec<TableChunk> {
    let starts = find_header_sentinels(lines, &rules.options.delimiter);
    let mut chunks = Vec::with_capacity(starts.len());

    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(lines.len());
        let mut chunk = TableChunk {
            source_table_id: table_id(index),
            lines: Vec::new(),
            header_markers_found: BTreeSet::from([HeaderMarker::Alias, HeaderMarker::Name]),
        };

        for line in &lines[start + 5..end] {
            match rules.kind(line) {
                LineKind::Blank | LineKind::Delimiter => {}
                LineKind::SectionEnd => break,
                LineKind::Header(marker) => {
                    chunk.header_markers_found.insert(marker);
                }
                LineKind::Flag | LineKind::Content => chunk.lines.push(line.trim().to_string()),
            }
        }

        chunks.push(chunk);
    }

    chunks
}

#[derive(Default)]
struct PendingChunk {
    lines: Vec<String>,
    has_content: bool,
    header_markers_found: BTreeSet<HeaderMarker>,
}

/// Emits the pending chunk if it holds a row; header markers seen before the
/// first row carry over to the next chunk.
fn close(pending: &mut PendingChunk, chunks: &mut Vec<TableChunk>) {
    let taken = std::mem::take(pending);
    if taken.has_content {
        chunks.push(TableChunk {
            source_table_id: table_id(chunks.len()),
            lines: taken.lines,
            header_markers_found: taken.header_markers_found,
        });
    } else {
        pending.header_markers_found = taken.header_markers_found;
    }
}

fn segment_by_paired_markers(
    lines: &[String],
    rules: &LineRules<'_>,
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<TableChunk> {
    let mut chunks = Vec::new();
    let mut pending = PendingChunk::default();
    let mut seen = BTreeSet::new();
    let mut orphan_flags = 0_usize;

    for line in lines {
        match rules.kind(line) {
            LineKind::Blank => {}
            LineKind::Delimiter => {
                seen.insert(MarkerKind::Delimiter);
            }
            LineKind::Flag => {
                seen.insert(MarkerKind::Flag);
                if pending.has_content {
                    pending.lines.push(line.trim().to_string());
                } else {
                    orphan_flags += 1;
                }
            }
            LineKind::SectionEnd => {
                close(&mut pending, &mut chunks);
                pending.header_markers_found.clear();
                seen.clear();
            }
            LineKind::Header(marker) => {
                if pending.has_content {
                    close(&mut pending, &mut chunks);
                }
                pending.header_markers_found.insert(marker);
                seen.clear();
            }
            LineKind::Content => {
                if seen.contains(&MarkerKind::Delimiter) && seen.contains(&MarkerKind::Flag) {
                    close(&mut pending, &mut chunks);
                }
                seen.clear();
                pending.lines.push(line.trim().to_string());
                pending.has_content = true;
            }
        }
    }
    close(&mut pending, &mut chunks);

    if orphan_flags > 0 {
        warnings.push(PipelineWarning::new(
            WarningCode::OrphanFlag,
            format!("{orphan_flags} availability flag(s) appeared before any row and were ignored"),
        ));
    }

    chunks
}

/// One-line headers such as `Alias Name P11 P10 ...` open a chunk; a blank
/// line, a page marker, a bullet or a section-end phrase closes it. Rows stay
/// whole, one per line.
fn segment_by_inline_header(lines: &[String], rules: &LineRules<'_>) -> Vec<TableChunk> {
    let mut chunks = Vec::new();
    let mut open: Option<TableChunk> = None;

    for line in lines {
        let line = line.trim();
        if rules.inline_header.is_match(line) {
            chunks.extend(open.take());
            open = Some(TableChunk {
                source_table_id: table_id(chunks.len()),
                lines: Vec::new(),
                header_markers_found: BTreeSet::from([
                    HeaderMarker::Alias,
                    HeaderMarker::Name,
                    HeaderMarker::DatabankHeader,
                ]),
            });
            continue;
        }

        let Some(chunk) = open.as_mut() else {
            continue;
        };
        if line.is_empty() || rules.ends_inline_table(line) {
            chunks.extend(open.take());
        } else if line != rules.options.delimiter {
            chunk.lines.push(line.to_string());
        }
    }
    chunks.extend(open);

    chunks
}

/// Splits `lines` into table chunks with the configured strategy.
pub fn segment(
    lines: &[String],
    options: &PipelineOptions,
    warnings: &mut Vec<PipelineWarning>,
) -> Result<Vec<TableChunk>, PipelineError> {
    let rules = LineRules::new(options)?;
    let chunks = match options.segmenter {
        SegmenterStrategy::HeaderSentinel => segment_by_header_sentinel(lines, &rules),
        SegmenterStrategy::PairedMarker => segment_by_paired_markers(lines, &rules, warnings),
        SegmenterStrategy::InlineHeader => segment_by_inline_header(lines, &rules),
    };

    for chunk in &chunks {
        if !chunk
            .header_markers_found
            .contains(&HeaderMarker::DatabankHeader)
            && options.segmenter == SegmenterStrategy::HeaderSentinel
        {
            warnings.push(
                PipelineWarning::new(
                    WarningCode::MissingDatabankHeader,
                    "table has no databank column header line",
                )
                .with_table(chunk.source_table_id.clone()),
            );
        }
    }

    debug!(
        strategy = ?options.segmenter,
        chunks = chunks.len(),
        "segmented line stream"
    );
    Ok(chunks)
}
