//! Spreadsheet → CSV conversion.
//!
//! Only the first sheet is converted. Multi-sheet workbooks lose every sheet
//! after the first; downstream ingestion only ever reads one.

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook_from_rs};
use chrono::Timelike;

use crate::error::PipelineError;

/// Binary layout of a spreadsheet, chosen from the key's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Legacy BIFF (`.xls`).
    Xls,
    /// Office Open XML (`.xlsx`).
    Xlsx,
}

impl SpreadsheetFormat {
    /// Pick the format from a key's extension (case-insensitive).
    pub fn from_key(key: &str) -> Option<Self> {
        let lower = key.to_ascii_lowercase();
        if lower.ends_with("xlsx") {
            Some(Self::Xlsx)
        } else if lower.ends_with("xls") {
            Some(Self::Xls)
        } else {
            None
        }
    }
}

/// Convert the first sheet of a workbook into comma-separated text.
pub fn convert(bytes: &[u8], format: SpreadsheetFormat) -> Result<String, PipelineError> {
    let cursor = Cursor::new(bytes);
    let range = match format {
        SpreadsheetFormat::Xlsx => {
            let mut workbook: Xlsx<_> =
                open_workbook_from_rs(cursor).map_err(|e| PipelineError::format("spreadsheet", e))?;
            workbook
                .worksheet_range_at(0)
                .ok_or_else(|| PipelineError::format("spreadsheet", "workbook has no sheets"))?
                .map_err(|e| PipelineError::format("spreadsheet", e))?
        }
        SpreadsheetFormat::Xls => {
            let mut workbook: Xls<_> =
                open_workbook_from_rs(cursor).map_err(|e| PipelineError::format("spreadsheet", e))?;
            workbook
                .worksheet_range_at(0)
                .ok_or_else(|| PipelineError::format("spreadsheet", "workbook has no sheets"))?
                .map_err(|e| PipelineError::format("spreadsheet", e))?
        }
    };

    grid_to_csv(&range)
}

/// Serialize a sheet as a grid anchored at A1. calamine trims leading empty
/// rows and columns from the range, so they are filled back in here.
fn grid_to_csv(range: &Range<Data>) -> Result<String, PipelineError> {
    let Some((last_row, last_col)) = range.end() else {
        return Ok(String::new());
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'));

    let mut out = Vec::new();
    for row in 0..=last_row {
        let cells: Vec<String> = (0..=last_col)
            .map(|col| range.get_value((row, col)).map(cell_to_string).unwrap_or_default())
            .collect();

        // csv quotes a lone empty field; a blank one-column row stays blank.
        if matches!(cells.as_slice(), [only] if only.is_empty()) {
            out.push(b'\n');
            continue;
        }

        let mut writer = builder.from_writer(&mut out);
        writer
            .write_record(&cells)
            .map_err(|e| PipelineError::format("spreadsheet", e))?;
        writer.flush().map_err(|e| PipelineError::format("spreadsheet", e))?;
    }

    String::from_utf8(out).map_err(|e| PipelineError::format("spreadsheet", e))
}

/// Render a cell the way a spreadsheet would display it.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.num_seconds_from_midnight() == 0 => ts.format("%Y-%m-%d").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_float(dt.as_f64()),
        },
        Data::Error(e) => e.to_string(),
    }
}

/// Whole floats render without a fractional part (`3`, not `3.0`).
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
