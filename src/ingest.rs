//! Ingestion: file content in, catalog entry out.
//!
//! Content is parsed before the existing relation is touched, so a failed load
//! leaves the previous relation and its catalog entry as they were.

use polars::prelude::DataFrame;
use tracing::{debug, info};

use crate::catalog::{Catalog, ColumnInfo, LoadedTable};
use crate::engine::{Engine, FileBuffer, FileReader};
use crate::error::{Error, Result};
use crate::format::{self, FileFormat, TableFormat};
use crate::naming::sanitize_relation_name;
use crate::spreadsheet;

pub fn ingest(
    engine: &mut Engine,
    catalog: &mut Catalog,
    content: FileBuffer,
    name: &str,
    format: FileFormat,
) -> Result<LoadedTable> {
    let relation_name = sanitize_relation_name(name);
    debug!(name, relation = %relation_name, ?format, bytes = content.len(), "ingesting");

    let df = parse(engine, content, name, format)?;
    if df.width() == 0 {
        return Err(Error::ingestion(name, "no columns could be inferred"));
    }

    // Last load wins.
    if engine.drop_relation(&relation_name) {
        debug!(relation = %relation_name, "replacing existing relation");
    }
    engine.create_relation(&relation_name, df);

    match introspect(engine, &relation_name, name, TableFormat::Source(format)) {
        Ok(table) => {
            info!(
                relation = %table.relation_name,
                rows = table.row_count,
                columns = table.columns.len(),
                "loaded table"
            );
            catalog.upsert(table.clone());
            Ok(table)
        }
        Err(e) => {
            engine.drop_relation(&relation_name);
            catalog.remove(&relation_name);
            Err(Error::ingestion(name, e.to_string()))
        }
    }
}

/// Read schema and row count of a live relation through SQL.
pub(crate) fn introspect(
    engine: &mut Engine,
    relation_name: &str,
    display_name: &str,
    format: TableFormat,
) -> Result<LoadedTable> {
    let schema = engine
        .relation_schema(relation_name)
        .map_err(|e| Error::query(&e))?;
    let row_count = engine
        .relation_row_count(relation_name)
        .map_err(|e| Error::query(&e))?;
    Ok(LoadedTable {
        display_name: display_name.to_string(),
        relation_name: relation_name.to_string(),
        format,
        columns: ColumnInfo::from_schema(&schema),
        row_count,
    })
}

fn parse(
    engine: &mut Engine,
    content: FileBuffer,
    name: &str,
    format: FileFormat,
) -> Result<DataFrame> {
    let (buffer, reader) = match format {
        FileFormat::Csv | FileFormat::Tsv => {
            let separator = format::delimiter(format).unwrap_or(b',');
            (content, FileReader::Delimited { separator })
        }
        FileFormat::Xlsx | FileFormat::Xls => {
            let workbook = spreadsheet::bytes_to_workbook(content.as_bytes())
                .map_err(|e| Error::ingestion(name, e.to_string()))?;
            let text = spreadsheet::first_sheet_to_csv_text(&workbook)
                .map_err(|e| Error::ingestion(name, e.to_string()))?;
            if text.trim().is_empty() {
                return Err(Error::ingestion(name, "first worksheet is empty"));
            }
            (
                FileBuffer::Text(text),
                FileReader::Delimited { separator: b',' },
            )
        }
        FileFormat::Parquet => (content, FileReader::Parquet),
        FileFormat::Json => (content, FileReader::Json),
    };

    if buffer.is_empty() {
        return Err(Error::ingestion(name, "file is empty"));
    }

    engine.register_file(name, buffer);
    let parsed = engine.read_file(name, reader);
    engine.unregister_file(name);
    parsed.map_err(|e| Error::ingestion(name, e.to_string()))
}
