//! tabsql: load CSV, TSV, JSON, Parquet and spreadsheet files into an embedded
//! SQL engine, query and join them, and export results.
//!
//! [`Session`] owns the engine and the catalog of loaded tables. [`Workspace`]
//! adds tabs and the on-disk store used to restore the last file.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod format;
mod ingest;
pub mod join;
pub mod naming;
pub mod query;
pub mod search;
pub mod session;
pub mod spreadsheet;
pub mod sql;
pub mod store;
pub mod tabs;
pub mod workspace;

pub use cache::CacheManager;
pub use catalog::{Catalog, ColumnInfo, LoadedTable};
pub use config::{AppConfig, ConfigManager};
pub use engine::{FileBuffer, ReadOptions};
pub use error::{Error, ExportError, Result};
pub use filter::{ColumnFilter, FilterModel, NumberOperator, TextOperator};
pub use format::{ExportFormat, FileFormat, TableFormat};
pub use join::{CompiledJoin, JoinCondition, JoinKind, JoinOperator, JoinSpec, SelectedColumn, Side};
pub use naming::sanitize_relation_name;
pub use query::{QueryResult, Row};
pub use search::{SearchMode, SearchRequest};
pub use session::{JoinPreview, Session, SessionOptions};
pub use store::{DiskStorage, MemoryStorage, PersistedFile, RestoreOutcome, SessionStore, Storage};
pub use tabs::{LiveFilterState, TabManager, TabState, TabUpdate};
pub use tabsql_cli::Args;
pub use workspace::Workspace;

/// Application name, used for the config and cache directories
pub const APP_NAME: &str = "tabsql";
