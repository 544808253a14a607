//! Result rendering: a fixed-column text table and JSON export

use crate::{FuzzerError, Result};
use serde::Serialize;
use std::path::Path;
use version_engine::ResultEntry;

const HEADERS: [&str; 7] = ["#", "Method", "Host", "Original", "Modified", "Status", "Length"];

/// One displayed row of the results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub id: u64,
    pub method: String,
    pub host: String,
    pub original_path: String,
    pub modified_path: String,
    pub status_code: u16,
    pub body_length: usize,
}

impl From<&ResultEntry> for ResultRow {
    fn from(entry: &ResultEntry) -> Self {
        Self {
            id: entry.id,
            method: entry.method.clone(),
            host: entry.host.clone(),
            original_path: entry.original_path.clone(),
            modified_path: entry.modified_path.clone(),
            status_code: entry.status_code,
            body_length: entry.body_length,
        }
    }
}

impl ResultRow {
    fn cells(&self) -> [String; 7] {
        [
            self.id.to_string(),
            self.method.clone(),
            self.host.clone(),
            self.original_path.clone(),
            self.modified_path.clone(),
            self.status_code.to_string(),
            self.body_length.to_string(),
        ]
    }
}

/// Render entries as a text table, one line per result.
pub fn render_table(entries: &[ResultEntry]) -> String {
    let rows: Vec<[String; 7]> = entries.iter().map(|e| ResultRow::from(e).cells()).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, HEADERS.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, rule.iter().map(String::as_str), &widths);
    for row in &rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize; 7]) {
    let line: Vec<String> = cells
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Write entries as a JSON array.
pub fn write_json(path: &Path, entries: &[ResultEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| FuzzerError::Export(format!("Failed to serialize results: {}", e)))?;
    std::fs::write(path, json)
        .map_err(|e| FuzzerError::Export(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}
