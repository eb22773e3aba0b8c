use std::collections::BTreeSet;

use regex::Regex;

use crate::error::PipelineError;
use crate::options::PipelineOptions;

const FORMULA_PATTERN: &str = r"^[A-Z][A-Z0-9()\-.:*]*$";
const NAME_PATTERN: &str = r"^[A-Z][A-Z0-9\-.:*,()\s]*$";
const LETTERS_ONLY_PATTERN: &str = r"^[A-Z]{10,}$";
const CODE_TOKEN_PATTERN: &str = r"^[A-Z0-9()\-+.]+$";
const MAX_FORMULA_LEN: usize = 30;
const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineShape {
    Flag,
    Formula,
    Name,
    Unclassified,
}

#[derive(Debug, Clone)]
pub struct ShapeRules {
    formula: Regex,
    name: Regex,
    letters_only: Regex,
    code_token: Regex,
    flag_run: Regex,
    stop_words: BTreeSet<String>,
    name_keywords: Vec<String>,
    flag_token: String,
}

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern).map_err(|source| PipelineError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn all_digits(text: &str) -> bool {
    text.bytes().all(|byte| byte.is_ascii_digit())
}

impl ShapeRules {
    pub fn new(options: &PipelineOptions) -> Result<Self, PipelineError> {
        Ok(Self {
            formula: compile(FORMULA_PATTERN)?,
            name: compile(NAME_PATTERN)?,
            letters_only: compile(LETTERS_ONLY_PATTERN)?,
            code_token: compile(CODE_TOKEN_PATTERN)?,
            flag_run: compile(&format!(
                r"\b(?:{})+\b",
                regex::escape(options.flag_token.trim())
            ))?,
            stop_words: options
                .formula_stop_words
                .iter()
                .map(|word| word.trim().to_uppercase())
                .collect(),
            name_keywords: options
                .name_keywords
                .iter()
                .map(|word| word.trim().to_uppercase())
                .filter(|word| !word.is_empty())
                .collect(),
            flag_token: options.flag_token.trim().to_string(),
        })
    }

    #[must_use]
    pub fn is_stop_word(&self, text: &str) -> bool {
        self.stop_words.contains(&text.trim().to_uppercase())
    }

    #[must_use]
    pub fn is_availability_flag(&self, text: &str) -> bool {
        text.trim() == self.flag_token
    }

    #[must_use]
    pub fn is_chemical_formula(&self, text: &str) -> bool {
        let text = text.trim();
        !text.is_empty()
            && text.len() <= MAX_FORMULA_LEN
            && self.formula.is_match(text)
            && !self.is_stop_word(text)
            && !self.letters_only.is_match(text)
            && !all_digits(text)
    }

    #[must_use]
    pub fn is_compound_name(&self, text: &str) -> bool {
        let text = text.trim();
        NAME_LEN.contains(&text.len())
            && self.name.is_match(text)
            && !text.chars().all(|ch| ch == 'X')
            && !self.is_stop_word(text)
            && !all_digits(text)
    }

    /// Whitespace, commas and name keywords mark a line as a name even
    /// when it also fits the formula shape.
    #[must_use]
    pub fn looks_like_name_only(&self, text: &str) -> bool {
        let upper = text.trim().to_uppercase();
        upper.contains(char::is_whitespace)
            || upper.contains(',')
            || self
                .name_keywords
                .iter()
                .any(|keyword| upper.contains(keyword.as_str()))
    }

    /// Byte offset of the first run of flag tokens in a one-line row.
    #[must_use]
    pub fn flag_run_start(&self, line: &str) -> Option<usize> {
        self.flag_run.find(line).map(|run| run.start())
    }

    /// Whether a word of a one-line row begins the registered name. Words
    /// that read like a formula suffix (`-2`, `(L)`) stay with the alias.
    #[must_use]
    pub fn starts_name(&self, word: &str) -> bool {
        let upper = word.to_uppercase();
        let suffix_like = word.starts_with(|ch: char| {
            ch.is_ascii_digit() || matches!(ch, '-' | '(' | '+' | '.')
        });
        self.name_keywords
            .iter()
            .any(|keyword| upper.contains(keyword.as_str()))
            || (word.chars().count() > 4 && !self.code_token.is_match(word))
            || !suffix_like
    }

    #[must_use]
    pub fn classify(&self, text: &str) -> LineShape {
        if self.is_availability_flag(text) {
            LineShape::Flag
        } else if self.is_chemical_formula(text) && !self.looks_like_name_only(text) {
            LineShape::Formula
        } else if self.is_compound_name(text) {
            LineShape::Name
        } else {
            LineShape::Unclassified
        }
    }
}
