use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub raw_text: String,
    pub lines: Vec<String>,
}

impl Page {
    #[must_use]
    pub fn from_lines(page_number: u32, lines: Vec<String>) -> Self {
        Self {
            page_number,
            raw_text: lines.join("\n"),
            lines,
        }
    }

    #[must_use]
    pub fn empty(page_number: u32) -> Self {
        Self::from_lines(page_number, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPage {
    pub page: Page,
    pub is_table_page: bool,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMarker {
    Alias,
    Name,
    DatabankHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChunk {
    pub source_table_id: String,
    pub lines: Vec<String>,
    pub header_markers_found: BTreeSet<HeaderMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundRecord {
    pub databank: String,
    pub alias_or_code: String,
    pub registered_name: String,
    pub available_in_p11: bool,
    pub source_table: String,
}

impl CompoundRecord {
    /// Trims and upper-cases both fields; `None` when either ends up empty.
    #[must_use]
    pub fn normalized(
        databank: &str,
        alias: &str,
        name: &str,
        available_in_p11: bool,
        source_table: &str,
    ) -> Option<Self> {
        let alias_or_code = normalize_field(alias);
        let registered_name = normalize_field(name);
        if alias_or_code.is_empty() || registered_name.is_empty() {
            return None;
        }

        Some(Self {
            databank: databank.trim().to_string(),
            alias_or_code,
            registered_name,
            available_in_p11,
            source_table: source_table.to_string(),
        })
    }

    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.alias_or_code, &self.registered_name)
    }
}

#[must_use]
pub fn normalize_field(value: &str) -> String {
    value.replace('\u{00A0}', " ").trim().to_uppercase()
}
