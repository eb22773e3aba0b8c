use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorBackend {
    Auto,
    ContentStream,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierMode {
    Weighted,
    StrictHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmenterStrategy {
    HeaderSentinel,
    PairedMarker,
    InlineHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingPolicy {
    Strict,
    ShapeDriven,
    SingleLine,
}

fn parse_choice<T: Copy>(value: &str, kind: &str, choices: &[(&str, T)]) -> Result<T, String> {
    let wanted = value.trim().to_ascii_lowercase().replace('_', "-");
    choices
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, choice)| *choice)
        .ok_or_else(|| {
            let names = choices.iter().map(|(name, _)| *name).collect::<Vec<_>>();
            format!("unknown {kind} '{value}', expected one of: {}", names.join(", "))
        })
}

impl FromStr for ExtractorBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_choice(
            value,
            "backend",
            &[
                ("auto", Self::Auto),
                ("content-stream", Self::ContentStream),
                ("plain-text", Self::PlainText),
            ],
        )
    }
}

impl FromStr for ClassifierMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_choice(
            value,
            "classifier",
            &[("weighted", Self::Weighted), ("strict-header", Self::StrictHeader)],
        )
    }
}

impl FromStr for SegmenterStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_choice(
            value,
            "segmenter",
            &[
                ("header-sentinel", Self::HeaderSentinel),
                ("paired-marker", Self::PairedMarker),
                ("inline-header", Self::InlineHeader),
            ],
        )
    }
}

impl FromStr for PairingPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_choice(
            value,
            "pairing policy",
            &[
                ("strict", Self::Strict),
                ("shape-driven", Self::ShapeDriven),
                ("single-line", Self::SingleLine),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    /// Reads a page-list file body: one page number per line. Lines that are
    /// not plain positive integers are ignored.
    #[must_use]
    pub fn from_page_list(body: &str) -> Self {
        let pages = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.bytes().all(|byte| byte.is_ascii_digit()))
            .filter_map(|line| line.parse::<u32>().ok())
            .filter(|&page| page > 0)
            .collect();
        Self { pages }
    }
}

impl FromIterator<u32> for PageSelection {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            pages: iter.into_iter().filter(|&page| page > 0).collect(),
        }
    }
}

const MAX_PAGE_NUMBER: u32 = 100_000;

fn parse_page_number(token: &str) -> Result<u32, String> {
    match token.trim().parse::<u32>() {
        Ok(0) => Err("pages are 1-based".to_string()),
        Ok(page) if page > MAX_PAGE_NUMBER => Err(format!(
            "page {page} is beyond the supported maximum of {MAX_PAGE_NUMBER}"
        )),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("invalid page number: '{}'", token.trim())),
    }
}

impl FromStr for PageSelection {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start = parse_page_number(start).map_err(PipelineError::InvalidPageSelection)?;
                let end = parse_page_number(end).map_err(PipelineError::InvalidPageSelection)?;
                if end < start {
                    return Err(PipelineError::InvalidPageSelection(format!(
                        "range '{token}' ends before it starts"
                    )));
                }
                pages.extend(start..=end);
            } else {
                pages.insert(parse_page_number(token).map_err(PipelineError::InvalidPageSelection)?);
            }
        }

        if pages.is_empty() {
            return Err(PipelineError::InvalidPageSelection(
                "selection is empty".to_string(),
            ));
        }

        Ok(Self { pages })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierOptions {
    pub mode: ClassifierMode,
    pub title_phrase: String,
    pub title_weight: i32,
    pub column_marker: String,
    pub header_weight: i32,
    pub token_threshold: usize,
    pub token_weight: i32,
    pub positive_score: i32,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Weighted,
            title_phrase: "Available in Databank".to_string(),
            title_weight: 2,
            column_marker: "P11".to_string(),
            header_weight: 2,
            token_threshold: 40,
            token_weight: 1,
            positive_score: 2,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub backend: ExtractorBackend,
    pub classifier: ClassifierOptions,
    pub segmenter: SegmenterStrategy,
    pub pairing: PairingPolicy,
    pub delimiter: String,
    pub flag_token: String,
    pub databank: String,
    pub databank_header_pattern: String,
    pub inline_header_pattern: String,
    pub section_end_markers: Vec<String>,
    pub formula_stop_words: Vec<String>,
    pub name_keywords: Vec<String>,
    /// Lets a formula-shaped line such as `WATER` fill the empty name of the
    /// open alias instead of opening a new one.
    pub formula_fills_name: bool,
    pub excluded_tables: BTreeMap<String, String>,
    pub delimit_lines: bool,
    pub available_only: bool,
    pub extended_columns: bool,
    pub csv_delimiter: char,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            backend: ExtractorBackend::Auto,
            classifier: ClassifierOptions::default(),
            segmenter: SegmenterStrategy::HeaderSentinel,
            pairing: PairingPolicy::Strict,
            delimiter: "---".to_string(),
            flag_token: "X".to_string(),
            databank: "PURE11".to_string(),
            databank_header_pattern: r"^P11\s+P10\b".to_string(),
            inline_header_pattern: r"(?i)alias.*name.*p11".to_string(),
            section_end_markers: strings(&[
                "Pure Component",
                "Databanks",
                "Physical Property Data",
                "Available in Databank",
            ]),
            formula_stop_words: strings(&[
                "NAME", "ALIAS", "AVAILABLE", "DATABANK", "COMPONENT", "TABLE", "PAGE",
            ]),
            name_keywords: strings(&["ACID", "OXIDE", "CHLORIDE", "AMINE", "ALCOHOL"]),
            formula_fills_name: true,
            excluded_tables: BTreeMap::new(),
            delimit_lines: true,
            available_only: true,
            extended_columns: false,
            csv_delimiter: ',',
        }
    }
}

impl PipelineOptions {
    /// Loads options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let body = std::fs::read_to_string(path).map_err(|error| PipelineError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        let options: Self = serde_json::from_str(&body).map_err(|error| PipelineError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.delimiter.trim().is_empty() {
            return Err(PipelineError::InvalidOption(
                "delimiter must not be empty".to_string(),
            ));
        }
        if self.flag_token.trim().is_empty() {
            return Err(PipelineError::InvalidOption(
                "flag_token must not be empty".to_string(),
            ));
        }
        if self.delimiter.trim() == self.flag_token.trim() {
            return Err(PipelineError::InvalidOption(
                "delimiter and flag_token must differ".to_string(),
            ));
        }
        if self.databank.trim().is_empty() {
            return Err(PipelineError::InvalidOption(
                "databank must not be empty".to_string(),
            ));
        }
        if !self.csv_delimiter.is_ascii() {
            return Err(PipelineError::InvalidOption(
                "csv_delimiter must be a single ASCII character".to_string(),
            ));
        }
        if (self.segmenter == SegmenterStrategy::InlineHeader)
            != (self.pairing == PairingPolicy::SingleLine)
        {
            return Err(PipelineError::InvalidOption(
                "the inline-header segmenter and the single-line pairing policy go together"
                    .to_string(),
            ));
        }
        for pattern in [&self.databank_header_pattern, &self.inline_header_pattern] {
            regex::Regex::new(pattern).map_err(|source| PipelineError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn csv_delimiter_byte(&self) -> u8 {
        u8::try_from(self.csv_delimiter).unwrap_or(b',')
    }

    /// Looks up a chunk identifier in the exclusion list, ignoring a
    /// trailing file extension on either side.
    #[must_use]
    pub fn exclusion_reason(&self, table_id: &str) -> Option<&str> {
        let wanted = strip_extension(table_id);
        self.excluded_tables
            .iter()
            .find(|(id, _)| strip_extension(id) == wanted)
            .map(|(_, reason)| reason.as_str())
    }
}

fn strip_extension(id: &str) -> &str {
    Path::new(id)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(id)
}
