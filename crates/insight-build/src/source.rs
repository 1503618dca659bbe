//! CSV table source.
//!
//! Headers are normalized (trimmed, lowercased, spaces to underscores) and the
//! table is named after the file stem the same way. Empty cells become nulls;
//! every other cell is kept as text for the profiler to type.

use std::collections::HashSet;
use std::path::Path;

use insight_core::{Row, Table, Value};

use crate::error::SourceError;

/// Normalize a header or file stem into a column/table name.
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Load one CSV file into a [`Table`].
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table, SourceError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.is_empty() {
        return Err(SourceError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let mut columns = Vec::with_capacity(headers.len());
    let mut seen = HashSet::new();
    for header in headers.iter() {
        let column = normalize_name(header);
        if !seen.insert(column.clone()) {
            return Err(SourceError::DuplicateColumn {
                path: path.to_path_buf(),
                column,
            });
        }
        columns.push(column);
    }

    let name = path
        .file_stem()
        .map(|s| normalize_name(&s.to_string_lossy()))
        .unwrap_or_default();
    let mut table = Table::new(name, columns);

    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row: Row = table
            .columns
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| (column.clone(), Value::from_raw(cell)))
            .collect();
        table.push_row(row);
    }

    tracing::info!(
        path = %path.display(),
        table = %table.name,
        rows = table.len(),
        columns = table.columns.len(),
        "Loaded CSV table"
    );
    Ok(table)
}

/// Load several CSV files; table names must be unique.
pub fn load_tables<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Table>, SourceError> {
    let mut tables: Vec<Table> = Vec::with_capacity(paths.len());
    for path in paths {
        let table = load_csv(path)?;
        if tables.iter().any(|t| t.name == table.name) {
            return Err(SourceError::DuplicateTable { table: table.name });
        }
        tables.push(table);
    }
    Ok(tables)
}
