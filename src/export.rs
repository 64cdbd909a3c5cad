// 📤 Export Serializer - projected table → flat spreadsheet (CSV)
//
// Row 1: title header + one column per period label.
// Then one row per metric with the resolved display value only; candidates
// and conflict flags are not exported.

use crate::error::{ReconError, Result};
use crate::projection::Table;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Group thousands with ',' (1,200). Grouped cells are quoted by the
    /// CSV writer.
    pub group_thousands: bool,

    /// Header of the first (metric title) column
    pub title_header: String,

    /// Text written for cells without a value
    pub no_data: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            group_thousands: true,
            title_header: "Metric".to_string(),
            no_data: String::new(),
        }
    }
}

/// Serialize the table into CSV bytes. An empty table yields the header only.
pub fn serialize(table: &Table, options: &ExportOptions) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = Vec::with_capacity(table.periods.len() + 1);
    header.push(options.title_header.clone());
    header.extend(table.periods.iter().map(|period| period.label()));
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.cells.len() + 1);
        record.push(row.title.clone());
        record.extend(row.cells.iter().map(|cell| match cell.value {
            Some(value) => format_number(value, options.group_thousands),
            None => options.no_data.clone(),
        }));
        writer.write_record(&record)?;
    }

    debug!(rows = table.rows.len(), columns = table.periods.len(), "serialized table");

    writer
        .into_inner()
        .map_err(|e| ReconError::Io(e.into_error()))
}

/// Serialize and write to a file
pub fn write_csv(path: &Path, table: &Table, options: &ExportOptions) -> Result<()> {
    let bytes = serialize(table, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Display formatting: at most three fraction digits, trailing zeros dropped,
/// optional thousands grouping.
pub fn format_number(value: f64, group_thousands: bool) -> String {
    let fixed = format!("{:.3}", value);
    let trimmed = if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed.as_str()
    };

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (rest != "0", rest),
        None => (false, trimmed),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };

    let mut out = String::with_capacity(trimmed.len() + int_part.len() / 3);
    if negative {
        out.push('-');
    }
    if group_thousands {
        out.push_str(&group_digits(int_part));
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
