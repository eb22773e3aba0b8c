use regex::Regex;

use crate::error::PipelineError;
use crate::model::{ClassifiedPage, Page};
use crate::options::{ClassifierMode, ClassifierOptions};

const SHORT_TOKEN_PATTERN: &str = r"\b[A-Z0-9][A-Z0-9\-()/.+]{0,15}\b";
const STRICT_HEADER_PATTERN: &str = r"(?i)P11\s+P10";

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern).map_err(|source| PipelineError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct PageClassifier {
    options: ClassifierOptions,
    short_token: Regex,
    strict_header: Regex,
}

impl PageClassifier {
    pub fn new(options: &ClassifierOptions) -> Result<Self, PipelineError> {
        Ok(Self {
            options: options.clone(),
            short_token: compile(SHORT_TOKEN_PATTERN)?,
            strict_header: compile(STRICT_HEADER_PATTERN)?,
        })
    }

    /// Number of short upper-case alphanumeric tokens after upper-casing `text`.
    #[must_use]
    pub fn count_short_tokens(&self, text: &str) -> usize {
        self.short_token.find_iter(&text.to_uppercase()).count()
    }

    #[must_use]
    pub fn has_strict_header(&self, text: &str) -> bool {
        self.strict_header.is_match(text)
    }

    #[must_use]
    pub fn weighted_score(&self, text: &str) -> i32 {
        let upper = text.replace('\u{00A0}', " ").to_uppercase();
        let options = &self.options;
        let mut score = 0;

        if upper.contains(&options.title_phrase.to_uppercase()) {
            score += options.title_weight;
        }
        if upper.contains("ALIAS")
            && upper.contains("NAME")
            && upper.contains(&options.column_marker.to_uppercase())
        {
            score += options.header_weight;
        }
        if self.short_token.find_iter(&upper).count() >= options.token_threshold {
            score += options.token_weight;
        }

        score
    }

    /// Returns `(is_table_page, score)` for the configured mode.
    #[must_use]
    pub fn evaluate(&self, text: &str) -> (bool, i32) {
        match self.options.mode {
            ClassifierMode::Weighted => {
                let score = self.weighted_score(text);
                (score >= self.options.positive_score, score)
            }
            ClassifierMode::StrictHeader => {
                if self.has_strict_header(text) {
                    (true, self.options.positive_score)
                } else {
                    (false, 0)
                }
            }
        }
    }

    #[must_use]
    pub fn classify(&self, page: Page) -> ClassifiedPage {
        let (is_table_page, score) = self.evaluate(&page.raw_text);
        ClassifiedPage {
            page,
            is_table_page,
            score,
        }
    }
}
