//! Catalog of loaded tables. Kept in lockstep with the engine's relation set by
//! `Session`, which is the only writer.

use polars::prelude::Schema;
use serde::{Deserialize, Serialize};

use crate::format::TableFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine type name, e.g. `i64`, `str`, `date`, `datetime[μs]`.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn from_schema(schema: &Schema) -> Vec<Self> {
        schema
            .iter()
            .map(|(name, dtype)| Self::new(name.as_str(), dtype.to_string()))
            .collect()
    }

    /// Date, time, datetime or duration; these render as formatted strings.
    pub fn is_temporal(&self) -> bool {
        let t = self.type_name.as_str();
        t == "date" || t.starts_with("datetime") || t == "time" || t.starts_with("duration")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedTable {
    pub display_name: String,
    pub relation_name: String,
    pub format: TableFormat,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
}

impl LoadedTable {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Ordered by first load; re-loading a relation keeps its position.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<LoadedTable>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace the entry with the same relation name.
    pub fn upsert(&mut self, table: LoadedTable) {
        match self
            .tables
            .iter_mut()
            .find(|t| t.relation_name == table.relation_name)
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn get(&self, relation_name: &str) -> Option<&LoadedTable> {
        self.tables.iter().find(|t| t.relation_name == relation_name)
    }

    pub fn remove(&mut self, relation_name: &str) -> Option<LoadedTable> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.relation_name == relation_name)?;
        Some(self.tables.remove(idx))
    }

    pub fn tables(&self) -> &[LoadedTable] {
        &self.tables
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.relation_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
