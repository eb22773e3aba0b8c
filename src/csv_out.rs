use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::PipelineError;
use crate::model::{CompoundRecord, normalize_field};

const BASE_COLUMNS: [&str; 3] = ["databank", "alias_or_code", "registered_name"];
const EXTENDED_COLUMNS: [&str; 2] = ["available_in_p11", "source_table"];

/// Writes records with the three base columns, plus availability and source
/// table when `extended` is set. An empty slice still produces the header.
pub fn write_records(
    path: &Path,
    records: &[CompoundRecord],
    delimiter: u8,
    extended: bool,
) -> Result<(), PipelineError> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;

    let mut header = BASE_COLUMNS.to_vec();
    if extended {
        header.extend(EXTENDED_COLUMNS);
    }
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.databank.as_str(),
            record.alias_or_code.as_str(),
            record.registered_name.as_str(),
        ];
        if extended {
            row.push(if record.available_in_p11 { "true" } else { "false" });
            row.push(record.source_table.as_str());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn column_index(header: &StringRecord, name: &str) -> Option<usize> {
    header
        .iter()
        .position(|column| column.trim().eq_ignore_ascii_case(name))
}

fn parse_availability(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "n"
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRecords {
    pub records: Vec<CompoundRecord>,
    /// Rows with a blank databank, alias or name.
    pub dropped_incomplete: usize,
}

/// Reads a per-table or merged CSV back into records.
pub fn read_records(
    path: &Path,
    fallback_source: &str,
    delimiter: u8,
) -> Result<CsvRecords, PipelineError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    let header = reader.headers()?.clone();

    let mut base = [0_usize; 3];
    for (slot, column) in base.iter_mut().zip(BASE_COLUMNS) {
        *slot = column_index(&header, column).ok_or_else(|| PipelineError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;
    }
    let available_column = column_index(&header, EXTENDED_COLUMNS[0]);
    let source_column = column_index(&header, EXTENDED_COLUMNS[1]);

    let mut read = CsvRecords::default();
    for row in reader.records() {
        let row = row?;
        let field = |index: usize| row.get(index).unwrap_or_default();

        let available = available_column.is_none_or(|index| parse_availability(field(index)));
        let source = source_column
            .map(field)
            .map(str::trim)
            .filter(|source| !source.is_empty())
            .unwrap_or(fallback_source);

        let databank = normalize_field(field(base[0]));
        match CompoundRecord::normalized(
            &databank,
            field(base[1]),
            field(base[2]),
            available,
            source,
        ) {
            Some(record) if !databank.is_empty() => read.records.push(record),
            _ => read.dropped_incomplete += 1,
        }
    }
    Ok(read)
}
