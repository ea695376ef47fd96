//! Query Executor: runs SQL verbatim and materializes the whole result as rows.

use std::sync::Arc;

use polars::prelude::*;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::engine::Engine;
use crate::error::{Error, Result};

/// One result row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// An immutable, cheaply clonable result set.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Arc<[String]>,
    rows: Arc<[Row]>,
}

impl Default for QueryResult {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert a collected frame. Temporal and other non-scalar types become
    /// strings; non-finite floats become null.
    pub fn from_frame(df: &DataFrame) -> PolarsResult<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let values = df
            .get_columns()
            .iter()
            .map(column_values)
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(df.height());
        for row_idx in 0..df.height() {
            let mut row = Map::with_capacity(columns.len());
            for (name, column) in columns.iter().zip(values.iter()) {
                let value = column.get(row_idx).cloned().unwrap_or(Value::Null);
                row.insert(name.clone(), value);
            }
            rows.push(row);
        }
        Ok(Self::new(columns, rows))
    }
}

/// Run `sql` and collect every row. No LIMIT is added here.
pub fn execute(engine: &mut Engine, sql: &str) -> Result<QueryResult> {
    debug!(sql, "executing query");
    let df = engine.execute(sql).map_err(|e| Error::query(&e))?;
    let result = QueryResult::from_frame(&df).map_err(|e| Error::query(&e))?;
    debug!(rows = result.row_count(), "query finished");
    Ok(result)
}

/// Text form of a cell for the text encoders; null is `None`.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn column_values(column: &Column) -> PolarsResult<Vec<Value>> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect(),
        DataType::UInt64 => series
            .u64()?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect(),
        dt if dt.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect(),
        dt if dt.is_float() => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| {
                v.and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect(),
        DataType::String => string_values(series)?,
        DataType::Null => vec![Value::Null; series.len()],
        _ => match series.cast(&DataType::String) {
            Ok(as_text) => string_values(&as_text)?,
            Err(_) => (0..series.len())
                .map(|idx| {
                    series.get(idx).map(|av| {
                        if av.is_null() {
                            Value::Null
                        } else {
                            Value::String(av.to_string())
                        }
                    })
                })
                .collect::<PolarsResult<Vec<_>>>()?,
        },
    };
    Ok(values)
}

fn string_values(series: &Series) -> PolarsResult<Vec<Value>> {
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
        .collect())
}
