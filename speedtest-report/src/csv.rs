//! CSV Output

use crate::{write_export, OutputFormat, ReportError};
use serde_json::Value;
use speedtest_core::{relative_display, Cache, PARAM_PREFIX};
use std::collections::BTreeSet;
use std::path::Path;

const QUOTE: char = '|';

/// Render the cache as a CSV table.
///
/// Columns are `filepath,function_name,nloops,time_taken_ms` followed by
/// every `param__*` key found in any record, sorted. Paths are shown
/// relative to `working_dir`, function names are cut at the first `[`, and
/// scores are in milliseconds. Fields are quoted with `|` only when needed.
pub fn generate_csv_report(cache: &Cache, working_dir: &Path) -> String {
    let param_columns: Vec<&str> = cache
        .iter()
        .flat_map(|(_, records)| records.values())
        .flat_map(|record| record.params.keys())
        .filter(|key| key.starts_with(PARAM_PREFIX))
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut output = String::new();

    let mut header = vec!["filepath", "function_name", "nloops", "time_taken_ms"];
    header.extend(param_columns.iter().copied());
    push_row(&mut output, header.into_iter().map(String::from));

    for (source, records) in cache.iter() {
        let rel = relative_display(Path::new(source), working_dir);
        for (signature, record) in records {
            let name = signature.split('[').next().unwrap_or(signature);
            let mut row = vec![
                rel.clone(),
                name.to_string(),
                record.loop_count.to_string(),
                (record.score * 1e3).to_string(),
            ];
            row.extend(
                param_columns
                    .iter()
                    .map(|column| record.params.get(*column).map(value_field).unwrap_or_default()),
            );
            push_row(&mut output, row.into_iter());
        }
    }

    output
}

/// Write the CSV table to the next free `run*.csv` in `dir`.
pub fn write_csv(cache: &Cache, dir: &Path) -> Result<String, ReportError> {
    write_export(dir, OutputFormat::Csv, &generate_csv_report(cache, dir))
}

fn value_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_row(output: &mut String, fields: impl Iterator<Item = String>) {
    let fields: Vec<String> = fields.map(|f| escape_field(&f)).collect();
    output.push_str(&fields.join(","));
    output.push_str("\r\n");
}

fn escape_field(field: &str) -> String {
    if field.contains([',', QUOTE, '\r', '\n']) {
        let doubled = field.replace(QUOTE, "||");
        format!("{QUOTE}{doubled}{QUOTE}")
    } else {
        field.to_string()
    }
}
