use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::csv_out::read_records;
use crate::model::CompoundRecord;
use crate::warning::UnitFailure;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub read: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeStats {
    pub input_record_count: usize,
    pub unique_count: usize,
    pub duplicate_count: usize,
    /// Duplicates as a percentage of the input, 0 when there is no input.
    pub duplicate_rate: f64,
    /// Source rows skipped for a blank databank, alias or name.
    pub dropped_incomplete: usize,
    pub per_source: BTreeMap<String, SourceCounts>,
    pub per_databank: BTreeMap<String, usize>,
    pub failed: Vec<UnitFailure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    pub records: Vec<CompoundRecord>,
    pub stats: MergeStats,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Merges named record sets. The first occurrence of an (alias, name) key
/// wins; the output is sorted by alias, then name.
pub fn merge_records<I, S>(sources: I) -> MergedTable
where
    I: IntoIterator<Item = (S, Vec<CompoundRecord>)>,
    S: Into<String>,
{
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut stats = MergeStats::default();
    let mut records = Vec::new();

    for (source, batch) in sources {
        let counts = stats.per_source.entry(source.into()).or_default();
        counts.read += batch.len();
        stats.input_record_count += batch.len();

        for record in batch {
            let key = (record.alias_or_code.clone(), record.registered_name.clone());
            if seen.insert(key) {
                counts.kept += 1;
                *stats.per_databank.entry(record.databank.clone()).or_default() += 1;
                records.push(record);
            }
        }
    }

    records.sort_by(|left, right| left.key().cmp(&right.key()));
    stats.unique_count = records.len();
    stats.duplicate_count = stats.input_record_count - stats.unique_count;
    stats.duplicate_rate = percent(stats.duplicate_count, stats.input_record_count);

    MergedTable { records, stats }
}

/// Reads and merges CSV files in the given order. A file that cannot be
/// read is reported in `stats.failed` and contributes nothing.
#[must_use]
pub fn merge_csv_files(paths: &[PathBuf], delimiter: u8) -> MergedTable {
    let mut failed = Vec::new();
    let mut dropped_incomplete = 0_usize;
    let mut sources = Vec::with_capacity(paths.len());

    for path in paths {
        let label = source_label(path);
        match read_records(path, &label, delimiter) {
            Ok(read) => {
                dropped_incomplete += read.dropped_incomplete;
                sources.push((label, read.records));
            }
            Err(error) => {
                warn!(source = %path.display(), %error, "skipping merge source");
                failed.push(UnitFailure::new(path.display().to_string(), error.to_string()));
            }
        }
    }

    let mut merged = merge_records(sources);
    merged.stats.failed = failed;
    merged.stats.dropped_incomplete = dropped_incomplete;
    merged
}

fn source_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(|| path.display().to_string(), str::to_string)
}
