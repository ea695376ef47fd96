//! Export Codec: result rows to file bytes.
//!
//! Parquet has no in-memory writer here; rows go through a temporary all-text
//! relation and the engine's own parquet writer.

use tracing::debug;

use crate::engine::{CopyFormat, Engine};
use crate::error::{Error, ExportError, Result};
use crate::format::ExportFormat;
use crate::query::{value_to_text, QueryResult};
use crate::spreadsheet;

const ROWS_RELATION: &str = "__tabsql_export_rows";

/// Encode `result` in any export format.
pub fn encode(result: &QueryResult, format: ExportFormat, engine: &mut Engine) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Parquet => {
            if result.is_empty() {
                return Err(ExportError::NoRows.into());
            }
            encode_parquet(result, engine)
        }
        other => encode_without_engine(result, other),
    }
}

/// Encode without an engine. Parquet is reported as unsupported.
pub fn encode_without_engine(result: &QueryResult, format: ExportFormat) -> Result<Vec<u8>> {
    if result.is_empty() {
        return Err(ExportError::NoRows.into());
    }
    let bytes = match format {
        ExportFormat::Csv => encode_delimited(result, b',')?,
        ExportFormat::Tsv => encode_delimited(result, b'\t')?,
        ExportFormat::Json => serde_json::to_vec_pretty(result.rows())
            .map_err(|e| ExportError::Encode(e.to_string()))?,
        // Both spreadsheet formats are written as OOXML.
        ExportFormat::Xlsx | ExportFormat::Xls => {
            spreadsheet::rows_to_workbook_bytes(result.columns(), result.rows())
                .map_err(ExportError::from)?
        }
        ExportFormat::Parquet => return Err(ExportError::Unsupported(format).into()),
    };
    debug!(format = format.as_str(), bytes = bytes.len(), "encoded export");
    Ok(bytes)
}

/// Header plus rows. A field is quoted only when it holds the delimiter, a
/// quote or a line break; nulls are empty.
pub fn encode_delimited(result: &QueryResult, delimiter: u8) -> std::result::Result<Vec<u8>, ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    wtr.write_record(result.columns())?;
    for row in result.rows() {
        wtr.write_record(result.columns().iter().map(|c| {
            row.get(c).and_then(value_to_text).unwrap_or_default()
        }))?;
    }
    wtr.into_inner()
        .map_err(|e| ExportError::Encode(e.into_error().to_string()))
}

fn encode_parquet(result: &QueryResult, engine: &mut Engine) -> Result<Vec<u8>> {
    let rows: Vec<Vec<Option<String>>> = result
        .rows()
        .iter()
        .map(|row| {
            result
                .columns()
                .iter()
                .map(|c| row.get(c).and_then(value_to_text))
                .collect()
        })
        .collect();

    let staging = engine.unused_relation_name(ROWS_RELATION);
    engine
        .create_text_relation(&staging, result.columns(), &rows)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    let copied = engine.copy_relation(&staging, CopyFormat::Parquet);
    engine.drop_relation(&staging);

    copied.map_err(|e| Error::from(ExportError::Encode(e.to_string())))
}
