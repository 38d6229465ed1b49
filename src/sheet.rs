use std::fmt;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// A single cell as read from the source sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

/// One row of the source sheet, in original order, with its original index.
///
/// Blank rows are retained as all-empty rows and empty cells are kept up to
/// the sheet's used range: the extraction model infers hierarchy and section
/// breaks from visual layout, so collapsing structure would destroy signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub index: usize,
    pub cells: Vec<CellValue>,
}

impl RawRow {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_empty)
    }
}

fn cell_from(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Read the first sheet of a workbook into layout-preserving rows.
///
/// Multi-sheet files are accepted; sheets beyond the first are ignored. The
/// grid is read from the origin through the used range's end, so leading
/// blank rows and columns that position the layout survive.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ReportError::UnreadableFile(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let first = sheet_names.first().cloned().ok_or(ReportError::EmptySheet)?;
    if sheet_names.len() > 1 {
        debug!(
            "Workbook has {} sheets, reading only '{}'",
            sheet_names.len(),
            first
        );
    }

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| ReportError::UnreadableFile(e.to_string()))?;

    let (end_row, end_col) = match range.end() {
        Some(end) => end,
        None => return Err(ReportError::EmptySheet),
    };

    let mut rows = Vec::with_capacity(end_row as usize + 1);
    for row_idx in 0..=end_row {
        let cells = (0..=end_col)
            .map(|col_idx| {
                range
                    .get_value((row_idx, col_idx))
                    .map(cell_from)
                    .unwrap_or(CellValue::Empty)
            })
            .collect();
        rows.push(RawRow {
            index: row_idx as usize,
            cells,
        });
    }

    debug!("Read {} rows from sheet '{}'", rows.len(), first);
    Ok(rows)
}

/// Render rows as the pipe-delimited grid embedded in the extraction prompt.
/// Row numbers are 1-based to match what a spreadsheet user would see.
pub fn render_rows(rows: &[RawRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row.cells.iter().map(CellValue::to_string).collect();
        out.push_str(&format!("{:>4} | {}\n", row.index + 1, cells.join(" | ")));
    }
    out
}
