use std::fmt::{Display, Formatter};

use crate::model::{CompoundRecord, TableChunk};
use crate::options::{PairingPolicy, PipelineOptions};
use crate::shape::{LineShape, ShapeRules};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawRow {
    alias: String,
    name: String,
    flags: u32,
}

/// Why a whole chunk produced no records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRejection {
    Excluded { reason: String },
    OddLineCount { count: usize },
}

impl Display for ChunkRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excluded { reason } => write!(f, "excluded by configuration: {reason}"),
            Self::OddLineCount { count } => write!(
                f,
                "odd number of content lines ({count}); alias/name rows cannot be paired"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkRecords {
    pub records: Vec<CompoundRecord>,
    /// Rows dropped because the alias or the name was empty.
    pub dropped_incomplete: usize,
}

fn pair_strict(lines: &[String], rules: &ShapeRules) -> Result<Vec<RawRow>, ChunkRejection> {
    let mut content: Vec<(&str, u32)> = Vec::new();
    let mut saw_flag = false;
    for line in lines {
        if rules.is_availability_flag(line) {
            saw_flag = true;
            if let Some((_, flags)) = content.last_mut() {
                *flags += 1;
            }
        } else {
            content.push((line.as_str(), 0));
        }
    }

    if content.len() % 2 != 0 {
        return Err(ChunkRejection::OddLineCount {
            count: content.len(),
        });
    }

    // A chunk printed without any flag column counts every row as available.
    let default_flags = u32::from(!saw_flag);
    Ok(content
        .chunks_exact(2)
        .map(|pair| RawRow {
            alias: pair[0].0.to_string(),
            name: pair[1].0.to_string(),
            flags: pair[0].1 + pair[1].1 + default_flags,
        })
        .collect())
}

#[derive(Default)]
struct OpenRow {
    alias: String,
    name: Option<String>,
    flags: u32,
}

fn pair_by_shape(
    lines: &[String],
    rules: &ShapeRules,
    formula_fills_name: bool,
) -> (Vec<RawRow>, usize) {
    let mut rows = Vec::new();
    let mut incomplete = 0_usize;
    let mut open: Option<OpenRow> = None;

    let mut finish = |row: OpenRow, rows: &mut Vec<RawRow>| match row.name {
        Some(name) => rows.push(RawRow {
            alias: row.alias,
            name,
            flags: row.flags,
        }),
        None => incomplete += 1,
    };

    for line in lines {
        let line = line.trim();
        match rules.classify(line) {
            LineShape::Flag => {
                if let Some(row) = open.as_mut() {
                    row.flags += 1;
                }
            }
            LineShape::Formula => {
                if formula_fills_name
                    && let Some(row) = open.as_mut().filter(|row| row.name.is_none())
                    && rules.is_compound_name(line)
                {
                    row.name = Some(line.to_string());
                    continue;
                }
                if let Some(row) = open.take() {
                    finish(row, &mut rows);
                }
                open = Some(OpenRow {
                    alias: line.to_string(),
                    ..OpenRow::default()
                });
            }
            LineShape::Name => {
                if let Some(row) = open.as_mut().filter(|row| row.name.is_none()) {
                    row.name = Some(line.to_string());
                }
            }
            LineShape::Unclassified => {}
        }
    }
    if let Some(row) = open.take() {
        finish(row, &mut rows);
    }

    (rows, incomplete)
}

const MAX_INLINE_ALIAS: usize = 50;
const MAX_INLINE_NAME: usize = 100;

fn inline_alias_is_usable(alias: &str, rules: &ShapeRules) -> bool {
    alias.chars().count() <= MAX_INLINE_ALIAS
        && !alias.chars().all(|ch| ch.is_ascii_digit())
        && !rules.is_stop_word(alias)
}

// One row per line: the alias words, the name words, then an optional run of
// flag tokens.
fn pair_single_line(lines: &[String], rules: &ShapeRules) -> (Vec<RawRow>, usize) {
    let mut rows = Vec::new();
    let mut incomplete = 0_usize;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (body, flags) = match rules.flag_run_start(line) {
            Some(start) => (&line[..start], 1),
            None => (line, 0),
        };
        let words = body.split_whitespace().collect::<Vec<_>>();
        if words.len() < 2 {
            incomplete += 1;
            continue;
        }

        let split = words[1..]
            .iter()
            .position(|word| rules.starts_name(word))
            .map_or(1, |index| index + 1);
        let alias = words[..split].concat();
        let name = words[split..].join("-");
        if !inline_alias_is_usable(&alias, rules) || name.chars().count() > MAX_INLINE_NAME {
            incomplete += 1;
            continue;
        }
        rows.push(RawRow { alias, name, flags });
    }

    (rows, incomplete)
}

/// Reconstructs the records of one chunk with the configured policy.
///
/// Records are normalized (trimmed, upper-cased); rows whose alias or name
/// ends up empty are counted in `dropped_incomplete` rather than returned.
pub fn reconstruct_chunk(
    chunk: &TableChunk,
    options: &PipelineOptions,
    rules: &ShapeRules,
) -> Result<ChunkRecords, ChunkRejection> {
    if let Some(reason) = options.exclusion_reason(&chunk.source_table_id) {
        return Err(ChunkRejection::Excluded {
            reason: reason.to_string(),
        });
    }

    let (rows, mut dropped_incomplete) = match options.pairing {
        PairingPolicy::Strict => (pair_strict(&chunk.lines, rules)?, 0),
        PairingPolicy::ShapeDriven => {
            pair_by_shape(&chunk.lines, rules, options.formula_fills_name)
        }
        PairingPolicy::SingleLine => pair_single_line(&chunk.lines, rules),
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match CompoundRecord::normalized(
            &options.databank,
            &row.alias,
            &row.name,
            row.flags >= 1,
            &chunk.source_table_id,
        ) {
            Some(record) => records.push(record),
            None => dropped_incomplete += 1,
        }
    }

    Ok(ChunkRecords {
        records,
        dropped_incomplete,
    })
}
