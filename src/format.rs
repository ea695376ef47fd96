//! File format detection and the format tag carried by catalog entries.

use serde::{Deserialize, Serialize};

pub use tabsql_cli::{ExportFormat, FileFormat};

/// Where a catalog entry's relation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Source(FileFormat),
    /// Produced inside the engine (e.g. a materialized join); has no file behind it.
    Derived,
}

impl TableFormat {
    pub fn file_format(self) -> Option<FileFormat> {
        match self {
            TableFormat::Source(f) => Some(f),
            TableFormat::Derived => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableFormat::Source(f) => f.extension(),
            TableFormat::Derived => "derived",
        }
    }
}

/// Field delimiter for the delimited-text formats.
pub fn delimiter(format: FileFormat) -> Option<u8> {
    match format {
        FileFormat::Csv => Some(b','),
        FileFormat::Tsv => Some(b'\t'),
        _ => None,
    }
}
