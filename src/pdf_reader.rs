use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::UTF_16BE;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::model::Page;
use crate::options::ExtractorBackend;

/// Random access to the pages of one opened PDF.
pub trait PageSource {
    fn backend_name(&self) -> &'static str;

    fn page_count(&self) -> u32;

    fn page(&self, page_number: u32) -> Page;
}

impl dyn PageSource + '_ {
    #[must_use]
    pub fn pages(&self) -> Pages<'_> {
        Pages {
            source: self,
            next: 1,
        }
    }
}

pub struct Pages<'a> {
    source: &'a dyn PageSource,
    next: u32,
}

impl Iterator for Pages<'_> {
    type Item = Page;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.source.page_count() {
            return None;
        }
        let page = self.source.page(self.next);
        self.next += 1;
        Some(page)
    }
}

fn clean_line(line: &str) -> Option<String> {
    let line = line.replace('\u{00A0}', " ");
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();

    replacement * 8 > total || control * 5 > total
}

fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    let utf16_hint = bytes.starts_with(&[0xFE, 0xFF])
        || encoding.is_some_and(|name| {
            let lower = name.to_ascii_lowercase();
            lower.contains("utf16") || lower.contains("ucs2") || lower.contains("identity-h")
        });
    if utf16_hint {
        let body = bytes.strip_prefix(&[0xFE, 0xFF]).unwrap_or(bytes);
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(body);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

fn extract_lines_from_page_content(document: &Document, page_id: ObjectId) -> Option<Vec<String>> {
    fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => {
                    text.push_str(&decode_pdf_bytes(encoding, bytes));
                }
                Object::Array(items) => {
                    collect_text(text, encoding, items);
                }
                Object::Integer(value) => {
                    if *value < -100 {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    let raw_content = document.get_page_content(page_id).ok()?;
    let content = Content::decode(&raw_content).ok()?;
    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "Tm" | "ET" => {
                if let Some(line) = clean_line(&std::mem::take(&mut current)) {
                    lines.push(line);
                }
            }
            _ => {}
        }
    }

    if let Some(line) = clean_line(&current) {
        lines.push(line);
    }

    (!lines.is_empty()).then_some(lines)
}

pub struct ContentStreamPdf {
    document: Document,
    page_ids: BTreeMap<u32, ObjectId>,
}

impl ContentStreamPdf {
    pub fn open(input_pdf: &Path) -> Result<Self, PipelineError> {
        let document = Document::load(input_pdf)?;
        let page_ids = document.get_pages();
        debug!(pages = page_ids.len(), "loaded PDF content streams");
        Ok(Self { document, page_ids })
    }
}

impl PageSource for ContentStreamPdf {
    fn backend_name(&self) -> &'static str {
        "content-stream"
    }

    fn page_count(&self) -> u32 {
        self.page_ids.keys().next_back().copied().unwrap_or(0)
    }

    fn page(&self, page_number: u32) -> Page {
        let Some(page_id) = self.page_ids.get(&page_number) else {
            warn!(page = page_number, "page is missing from the page tree");
            return Page::empty(page_number);
        };

        if let Some(lines) = extract_lines_from_page_content(&self.document, *page_id) {
            return Page::from_lines(page_number, lines);
        }

        match self.document.extract_text(&[page_number]) {
            Ok(text) => Page::from_lines(page_number, text.lines().filter_map(clean_line).collect()),
            Err(error) => {
                warn!(page = page_number, %error, "page text extraction failed; treating page as empty");
                Page::empty(page_number)
            }
        }
    }
}

/// Text laid out by pdf-extract, one entry per page. Lines carry no
/// content-stream structure.
pub struct PlainTextPdf {
    pages: Vec<String>,
}

impl PlainTextPdf {
    pub fn open(input_pdf: &Path) -> Result<Self, PipelineError> {
        let pages = pdf_extract::extract_text_by_pages(input_pdf)
            .map_err(|error| PipelineError::PdfExtract(error.to_string()))?;
        if !pages.is_empty() {
            debug!(pages = pages.len(), "extracted plain text by page");
            return Ok(Self { pages });
        }

        let text = pdf_extract::extract_text(input_pdf)
            .map_err(|error| PipelineError::PdfExtract(error.to_string()))?;
        Ok(Self::from_text(&text))
    }

    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            pages: split_text_into_pages(text),
        }
    }
}

impl PageSource for PlainTextPdf {
    fn backend_name(&self) -> &'static str {
        "plain-text"
    }

    fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    fn page(&self, page_number: u32) -> Page {
        let index = usize::try_from(page_number.saturating_sub(1)).unwrap_or(usize::MAX);
        match self.pages.get(index) {
            Some(text) if page_number > 0 => {
                Page::from_lines(page_number, text.lines().filter_map(clean_line).collect())
            }
            _ => Page::empty(page_number),
        }
    }
}

/// Opens `input_pdf` with the requested backend. `Auto` falls back to the
/// plain-text backend when the content streams cannot be loaded; the error is
/// fatal only when every backend fails.
pub fn open_pdf(
    input_pdf: &Path,
    backend: ExtractorBackend,
) -> Result<Box<dyn PageSource>, PipelineError> {
    std::fs::metadata(input_pdf)?;

    match backend {
        ExtractorBackend::ContentStream => Ok(Box::new(ContentStreamPdf::open(input_pdf)?)),
        ExtractorBackend::PlainText => Ok(Box::new(PlainTextPdf::open(input_pdf)?)),
        ExtractorBackend::Auto => match ContentStreamPdf::open(input_pdf) {
            Ok(pdf) => Ok(Box::new(pdf)),
            Err(content_error) => {
                warn!(%content_error, "content-stream backend failed; retrying with plain-text extraction");
                PlainTextPdf::open(input_pdf)
                    .map(|pdf| Box::new(pdf) as Box<dyn PageSource>)
                    .map_err(|plain_error| PipelineError::PdfUnreadable {
                        path: input_pdf.to_path_buf(),
                        reason: format!("{content_error}; {plain_error}"),
                    })
            }
        },
    }
}
