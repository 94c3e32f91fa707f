//! File output for CLI exports and seed input.
//!
//! The CLI `export` command writes the buffered CSV to disk; `seed` reads raw
//! message rows from a CSV file with the table's column names as header.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ReportError, Result};
use crate::models::MessageRecord;
use crate::time_range::parse_timestamp;

/// Write an export payload, creating parent directories as needed.
///
/// Returns the number of bytes written.
pub fn write_export_file(body: &[u8], file_path: &Path) -> Result<usize> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let file = File::create(file_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(body)?;
    writer.flush()?;
    Ok(body.len())
}

/// One CSV line of seed data
#[derive(Debug, Deserialize)]
struct SeedRow {
    id: String,
    ts: String,
    sdt_in: String,
    group_id: String,
    #[serde(default)]
    sdt_out: Option<String>,
    #[serde(default)]
    text_sms: Option<String>,
    #[serde(default)]
    predicted_label: Option<String>,
    #[serde(default)]
    llm_label: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    feedback: Option<bool>,
}

/// Read message rows from a CSV file.
///
/// `ts` accepts anything the report endpoints accept (offset-aware ISO 8601
/// or epoch numbers). Empty optional cells become `None`.
pub fn read_seed_file(file_path: &Path) -> Result<Vec<MessageRecord>> {
    let mut reader = csv::Reader::from_path(file_path)?;
    let mut records = Vec::new();

    for (line, row) in reader.deserialize::<SeedRow>().enumerate() {
        let row = row?;
        let ts: DateTime<Utc> = parse_timestamp(&row.ts).map_err(|e| {
            ReportError::InvalidParameter(format!("{}: row {}: {e}", file_path.display(), line + 2))
        })?;
        records.push(MessageRecord {
            id: row.id,
            ts,
            sdt_in: row.sdt_in,
            group_id: row.group_id,
            sdt_out: non_blank(row.sdt_out),
            text_sms: non_blank(row.text_sms),
            predicted_label: non_blank(row.predicted_label),
            llm_label: non_blank(row.llm_label),
            confidence: non_blank(row.confidence),
            feedback: row.feedback,
        });
    }

    Ok(records)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
