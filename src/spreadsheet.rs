//! Spreadsheet codec: calamine for reading workbooks, rust_xlsxwriter for writing them.
//!
//! Only the first worksheet is ever read. Cells are flattened to CSV text so that
//! spreadsheets share the delimited-text ingestion route and its type inference.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde_json::Value;
use thiserror::Error;

use crate::query::Row;

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("{0}")]
    Read(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoSheets,
    #[error("{0}")]
    Csv(#[from] csv::Error),
}

/// A parsed workbook, reduced to what ingestion uses.
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub sheet_names: Vec<String>,
    first_sheet: Range<Data>,
}

impl LoadedWorkbook {
    pub fn first_sheet_name(&self) -> Option<&str> {
        self.sheet_names.first().map(String::as_str)
    }

    pub fn first_sheet_height(&self) -> usize {
        self.first_sheet.height()
    }
}

pub fn bytes_to_workbook(bytes: &[u8]) -> Result<LoadedWorkbook, SpreadsheetError> {
    let mut sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet_names = sheets.sheet_names();
    if sheet_names.is_empty() {
        return Err(SpreadsheetError::NoSheets);
    }
    let first_sheet = sheets
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::NoSheets)??;
    Ok(LoadedWorkbook {
        sheet_names,
        first_sheet,
    })
}

/// Render the first sheet as comma-separated text. The first row is the header;
/// blank header cells are named `column_<n>`.
pub fn first_sheet_to_csv_text(workbook: &LoadedWorkbook) -> Result<String, SpreadsheetError> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    let mut rows = workbook.first_sheet.rows();
    if let Some(header) = rows.next() {
        let names: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let name = cell_to_text(cell);
                if name.trim().is_empty() {
                    format!("column_{}", idx + 1)
                } else {
                    name
                }
            })
            .collect();
        wtr.write_record(&names)?;
    }
    for row in rows {
        wtr.write_record(row.iter().map(cell_to_text))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| SpreadsheetError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    }
}

/// Build a single-sheet workbook from result rows, header first, in column order.
pub fn rows_to_workbook_bytes(columns: &[String], rows: &[Row]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col_idx, name) in columns.iter().enumerate() {
        let col = column_index(col_idx)?;
        worksheet.write_string(0, col, name.as_str())?;
        for (row_idx, row) in rows.iter().enumerate() {
            let r = u32::try_from(row_idx + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
            match row.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(r, col, *b)?;
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(r, col, f)?;
                    }
                    None => {
                        worksheet.write_string(r, col, n.to_string())?;
                    }
                },
                Some(Value::String(s)) => {
                    worksheet.write_string(r, col, s.as_str())?;
                }
                Some(other) => {
                    worksheet.write_string(r, col, other.to_string())?;
                }
            }
        }
    }

    workbook.save_to_buffer()
}

fn column_index(idx: usize) -> Result<u16, XlsxError> {
    u16::try_from(idx).map_err(|_| XlsxError::RowColumnLimitError)
}
