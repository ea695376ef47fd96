//! The embedded analytical engine: a polars `SQLContext` plus an in-memory
//! file registry, behind the small capability set the session layer needs.
//!
//! Relations are stored materialized, so a derived relation never depends on
//! the relations it was built from.

use std::collections::HashMap;
use std::io::Cursor;

use polars::prelude::*;
use polars_sql::SQLContext;

use crate::sql;

/// Raw content registered under a file name before a relation is read from it.
#[derive(Debug, Clone)]
pub enum FileBuffer {
    Text(String),
    Bytes(Vec<u8>),
}

impl FileBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileBuffer::Text(s) => s.as_bytes(),
            FileBuffer::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a registered file is turned into a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileReader {
    Delimited { separator: u8 },
    Parquet,
    /// A JSON array of objects, or newline-delimited objects when the content
    /// does not start with `[`.
    Json,
}

/// Formats the engine can copy a relation out to directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Csv,
    Tsv,
    Parquet,
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Rows sampled for CSV schema inference (None = polars default).
    pub infer_schema_length: Option<usize>,
    pub try_parse_dates: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            infer_schema_length: Some(1000),
            try_parse_dates: true,
        }
    }
}

pub struct Engine {
    ctx: SQLContext,
    files: HashMap<String, FileBuffer>,
    read_options: ReadOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_read_options(ReadOptions::default())
    }

    pub fn with_read_options(read_options: ReadOptions) -> Self {
        Self {
            ctx: SQLContext::new(),
            files: HashMap::new(),
            read_options,
        }
    }

    pub fn register_file(&mut self, name: &str, buffer: FileBuffer) {
        self.files.insert(name.to_string(), buffer);
    }

    pub fn unregister_file(&mut self, name: &str) -> Option<FileBuffer> {
        self.files.remove(name)
    }

    /// Parse a registered file without touching any relation.
    pub fn read_file(&self, name: &str, reader: FileReader) -> PolarsResult<DataFrame> {
        let buffer = self.files.get(name).ok_or_else(|| {
            PolarsError::ComputeError(format!("no file registered as '{}'", name).into())
        })?;
        let bytes = buffer.as_bytes();

        match reader {
            FileReader::Delimited { separator } => {
                let mut read_options = CsvReadOptions::default();
                read_options.has_header = true;
                read_options.infer_schema_length = self.read_options.infer_schema_length;
                let try_parse_dates = self.read_options.try_parse_dates;
                read_options = read_options.map_parse_options(|opts| {
                    opts.with_separator(separator)
                        .with_try_parse_dates(try_parse_dates)
                });
                CsvReader::new(Cursor::new(bytes.to_vec()))
                    .with_options(read_options)
                    .finish()
            }
            FileReader::Parquet => {
                let mut cursor = Cursor::new(bytes);
                ParquetReader::new(&mut cursor).finish()
            }
            FileReader::Json => {
                let is_array = bytes
                    .iter()
                    .find(|b| !b.is_ascii_whitespace())
                    .is_some_and(|b| *b == b'[');
                let format = if is_array {
                    JsonFormat::Json
                } else {
                    JsonFormat::JsonLines
                };
                JsonReader::new(Cursor::new(bytes))
                    .with_json_format(format)
                    .finish()
            }
        }
    }

    /// Register `df` as `name`, replacing any relation already there.
    pub fn create_relation(&mut self, name: &str, df: DataFrame) {
        self.ctx.unregister(name);
        self.ctx.register(name, df.lazy());
    }

    pub fn drop_relation(&mut self, name: &str) -> bool {
        let existed = self.has_relation(name);
        self.ctx.unregister(name);
        existed
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.ctx.get_tables().iter().any(|t| t == name)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.ctx.get_tables()
    }

    /// `base`, or `base_<n>` for the first `n` that no relation uses yet.
    pub fn unused_relation_name(&self, base: &str) -> String {
        let taken = self.relation_names();
        if !taken.iter().any(|t| t == base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !taken.iter().any(|t| t == candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Run one statement and collect the full result.
    pub fn execute(&mut self, sql: &str) -> PolarsResult<DataFrame> {
        self.ctx.execute(sql)?.collect()
    }

    /// Number of rows `sql` produces, without keeping them.
    pub fn count(&mut self, sql: &str) -> PolarsResult<usize> {
        let df = self
            .ctx
            .execute(sql)?
            .select([len().alias(sql::ROW_COUNT_COLUMN)])
            .collect()?;
        first_count(&df, sql::ROW_COUNT_COLUMN)
    }

    /// `CREATE TABLE name AS select`. The select runs first, so a failing
    /// statement leaves the existing relation in place.
    pub fn create_relation_as(&mut self, name: &str, select: &str) -> PolarsResult<()> {
        let df = self.execute(select)?;
        self.create_relation(name, df);
        Ok(())
    }

    pub fn relation_schema(&mut self, name: &str) -> PolarsResult<SchemaRef> {
        self.ctx
            .execute(&sql::select_all(name, None))?
            .collect_schema()
    }

    pub fn relation_row_count(&mut self, name: &str) -> PolarsResult<usize> {
        let df = self.execute(&sql::count_rows(name))?;
        first_count(&df, sql::ROW_COUNT_COLUMN)
    }

    /// Build an all-text relation from string cells (None = null).
    pub fn create_text_relation(
        &mut self,
        name: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> PolarsResult<()> {
        let mut series_vec: Vec<Column> = Vec::with_capacity(columns.len());
        for (col_idx, column) in columns.iter().enumerate() {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| row.get(col_idx).cloned().flatten())
                .collect();
            series_vec.push(Series::new(column.as_str().into(), values).into());
        }
        let df = DataFrame::new(series_vec)?;
        self.create_relation(name, df);
        Ok(())
    }

    /// Write a relation out in a columnar or delimited format.
    pub fn copy_relation(&mut self, name: &str, format: CopyFormat) -> PolarsResult<Vec<u8>> {
        let mut df = self.execute(&sql::select_all(name, None))?;
        let mut buf: Vec<u8> = Vec::new();
        match format {
            CopyFormat::Csv | CopyFormat::Tsv => {
                let separator = if format == CopyFormat::Tsv { b'\t' } else { b',' };
                CsvWriter::new(&mut buf)
                    .with_separator(separator)
                    .include_header(true)
                    .finish(&mut df)?;
            }
            CopyFormat::Parquet => {
                ParquetWriter::new(&mut buf).finish(&mut df)?;
            }
        }
        Ok(buf)
    }
}

fn first_count(df: &DataFrame, column: &str) -> PolarsResult<usize> {
    let counts = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::UInt64)?;
    Ok(counts.u64()?.get(0).unwrap_or(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, csv: &str) -> Engine {
        let mut engine = Engine::new();
        engine.register_file(&format!("{name}.csv"), FileBuffer::Text(csv.to_string()));
        let df = engine
            .read_file(&format!("{name}.csv"), FileReader::Delimited { separator: b',' })
            .unwrap();
        engine.create_relation(name, df);
        engine
    }

    #[test]
    fn reads_registered_csv_into_relation() {
        let mut engine = engine_with("people", "id,name\n1,ann\n2,bob\n3,cy\n");
        assert!(engine.has_relation("people"));
        assert_eq!(engine.relation_row_count("people").unwrap(), 3);
        let schema = engine.relation_schema("people").unwrap();
        let names: Vec<&str> = schema.iter_names().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn reading_unknown_file_fails() {
        let engine = Engine::new();
        assert!(engine
            .read_file("missing.csv", FileReader::Delimited { separator: b',' })
            .is_err());
    }

    #[test]
    fn json_lines_are_detected() {
        let mut engine = Engine::new();
        engine.register_file(
            "events.json",
            FileBuffer::Text("{\"a\":1}\n{\"a\":2}\n".to_string()),
        );
        let df = engine.read_file("events.json", FileReader::Json).unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn failed_create_as_keeps_existing_relation() {
        let mut engine = engine_with("t", "a\n1\n2\n");
        assert!(engine
            .create_relation_as("t", "SELECT nope FROM \"t\"")
            .is_err());
        assert!(engine.has_relation("t"));
        assert_eq!(engine.relation_row_count("t").unwrap(), 2);
    }

    #[test]
    fn drop_reports_existence() {
        let mut engine = engine_with("t", "a\n1\n");
        assert!(engine.drop_relation("t"));
        assert!(!engine.drop_relation("t"));
        assert!(engine.relation_names().is_empty());
    }

    #[test]
    fn unused_relation_name_skips_taken_names() {
        let mut engine = engine_with("stage", "a\n1\n");
        assert_eq!(engine.unused_relation_name("fresh"), "fresh");
        assert_eq!(engine.unused_relation_name("stage"), "stage_1");

        let df = engine.execute("SELECT * FROM \"stage\"").unwrap();
        engine.create_relation("stage_1", df);
        assert_eq!(engine.unused_relation_name("stage"), "stage_2");
    }

    #[test]
    fn count_runs_without_collecting_rows() {
        let mut engine = engine_with("t", "a\n1\n2\n3\n4\n");
        let n = engine
            .count("SELECT * FROM \"t\" WHERE \"a\" > 2")
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn text_relation_copies_to_parquet() {
        let mut engine = Engine::new();
        engine
            .create_text_relation(
                "tmp",
                &["x".to_string(), "y".to_string()],
                &[
                    vec![Some("1".to_string()), None],
                    vec![Some("it's".to_string()), Some("b".to_string())],
                ],
            )
            .unwrap();
        let bytes = engine.copy_relation("tmp", CopyFormat::Parquet).unwrap();
        let df = ParquetReader::new(&mut Cursor::new(bytes.as_slice()))
            .finish()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names().len(), 2);
    }

    #[test]
    fn copy_to_tsv_uses_tab_separator() {
        let mut engine = engine_with("t", "a,b\n1,x\n");
        let bytes = engine.copy_relation("t", CopyFormat::Tsv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().next(), Some("a\tb"));
        assert_eq!(text.lines().nth(1), Some("1\tx"));
    }
}
