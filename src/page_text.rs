use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::PipelineError;
use crate::model::{Page, TableChunk};
use crate::options::PageSelection;

/// Parses `===== PAGE 12 =====` or `===== [PAGE 12] =====`.
#[must_use]
pub fn parse_page_marker(line: &str) -> Option<u32> {
    let inner = line.trim().strip_prefix("=====")?.strip_suffix("=====")?.trim();
    let inner = inner
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(inner)
        .trim();
    inner.strip_prefix("PAGE")?.trim().parse().ok()
}

#[must_use]
pub fn page_marker(page_number: u32) -> String {
    format!("===== PAGE {page_number} =====")
}

/// Lays pages out as page-text lines. With `delimiter`, every line (and the
/// page marker) is followed by the delimiter line, which is what the
/// header-sentinel segmenter matches on.
#[must_use]
pub fn render_page_text(pages: &[Page], delimiter: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    for page in pages {
        out.push(page_marker(page.page_number));
        if let Some(delimiter) = delimiter {
            out.push(delimiter.to_string());
        }
        for line in &page.lines {
            out.push(line.clone());
            if let Some(delimiter) = delimiter {
                out.push(delimiter.to_string());
            }
        }
        out.push(String::new());
    }
    out
}

#[must_use]
pub fn render_chunk(chunk: &TableChunk, delimiter: &str) -> Vec<String> {
    let mut out = vec![
        delimiter.to_string(),
        "Alias".to_string(),
        delimiter.to_string(),
        "Name".to_string(),
        delimiter.to_string(),
    ];
    for line in &chunk.lines {
        out.push(line.clone());
        out.push(delimiter.to_string());
    }
    out
}

pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), PipelineError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            writer.write_all(b"\n")?;
        }
        writer.write_all(line.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a text artifact as lines. Invalid UTF-8 is replaced rather than
/// rejected.
pub fn read_lines(path: &Path) -> Result<Vec<String>, PipelineError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

pub fn write_page_list(path: &Path, pages: &[u32]) -> Result<(), PipelineError> {
    let lines = pages.iter().map(u32::to_string).collect::<Vec<_>>();
    write_lines(path, &lines)
}

pub fn read_page_list(path: &Path) -> Result<PageSelection, PipelineError> {
    let body = std::fs::read_to_string(path)?;
    Ok(PageSelection::from_page_list(&body))
}

#[cfg(test)]
mod tests {
    use super::{parse_page_marker, read_lines, render_page_text, write_lines};
    use crate::model::Page;

    #[test]
    fn parses_both_marker_styles() {
        assert_eq!(parse_page_marker("===== PAGE 7 ====="), Some(7));
        assert_eq!(parse_page_marker("  ===== [PAGE 12] =====  "), Some(12));
        assert_eq!(parse_page_marker("===== PAGE x ====="), None);
        assert_eq!(parse_page_marker("PAGE 3"), None);
    }

    #[test]
    fn delimited_layout_interleaves_sentinel() {
        let pages = vec![Page::from_lines(2, vec!["Alias".to_string(), "Name".to_string()])];
        let lines = render_page_text(&pages, Some("---"));
        assert_eq!(
            lines,
            vec!["===== PAGE 2 =====", "---", "Alias", "---", "Name", "---", ""]
        );
    }

    #[test]
    fn plain_layout_has_no_sentinels() {
        let pages = vec![Page::from_lines(1, vec!["H2O".to_string()])];
        assert_eq!(render_page_text(&pages, None), vec!["===== PAGE 1 =====", "H2O", ""]);
    }

    #[test]
    fn lines_survive_a_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("pages_text.txt");
        let lines = vec!["===== PAGE 1 =====".to_string(), "H2O".to_string()];
        write_lines(&path, &lines).expect("lines should be written");
        assert_eq!(read_lines(&path).expect("lines should be read"), lines);
    }
}
