//! Error taxonomy for the session layer, plus user-facing formatting.
//!
//! Engine messages are carried verbatim; `user_message` only decides how a
//! message is framed for display.

use polars::prelude::PolarsError;
use std::io;
use thiserror::Error;

use crate::ExportFormat;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine connection is gone; the session cannot continue.
    #[error("Analytical engine is not ready")]
    EngineNotReady,

    #[error("Could not load {name}: {message}")]
    Ingestion { name: String, message: String },

    #[error("{message}")]
    Query { message: String },

    #[error("Invalid search pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Session storage error: {message}")]
    Persistence { message: String },

    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    #[error("No open tab for table {0}")]
    TabNotFound(String),

    #[error("No table is open")]
    NoActiveTab,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No rows to export")]
    NoRows,

    #[error("{} export is not supported here", .0.as_str())]
    Unsupported(ExportFormat),

    #[error("Export failed: {0}")]
    Encode(String),
}

impl Error {
    pub fn ingestion(name: &str, message: impl Into<String>) -> Self {
        Error::Ingestion {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn query(err: &PolarsError) -> Self {
        Error::Query {
            message: err.to_string(),
        }
    }

    pub fn query_message(message: impl Into<String>) -> Self {
        Error::Query {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
        }
    }

    /// Only a missing engine ends the session; everything else is reported and recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EngineNotReady)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::persistence(user_message_from_io(&err, None))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::persistence(format!("corrupted record: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Encode(err.to_string())
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find a session Error or io::Error.
pub fn user_message(report: &color_eyre::eyre::Report) -> String {
    for cause in report.chain() {
        if let Some(err) = cause.downcast_ref::<Error>() {
            return match err {
                Error::Query { message } => format!("Query failed: {}", message),
                other => other.to_string(),
            };
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return user_message_from_io(io_err, None);
        }
    }

    // Fallback: use first line of display to avoid long tracebacks
    let display = report.to_string();
    display
        .lines()
        .next()
        .map(str::trim)
        .unwrap_or("An error occurred")
        .to_string()
}
