//! Shared CLI definitions for tabsql.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tabular file format of an input file.
/// When `--format` is not specified, format is detected from the file extension.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Parquet columnar format
    Parquet,
    /// Excel Open XML workbook (first sheet is loaded)
    Xlsx,
    /// Legacy Excel workbook (first sheet is loaded)
    Xls,
    /// JSON array of objects (newline-delimited JSON is also accepted)
    Json,
}

impl FileFormat {
    pub const ALL: [Self; 6] = [
        Self::Csv,
        Self::Tsv,
        Self::Parquet,
        Self::Xlsx,
        Self::Xls,
        Self::Json,
    ];

    /// Detect the format of a file name. Unknown or missing extensions fall back to CSV.
    pub fn detect(file_name: &str) -> Self {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(Self::Csv)
    }

    /// Detect file format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "parquet" => Some(Self::Parquet),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Parquet => "parquet",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Json => "json",
        }
    }

    /// Binary formats are persisted as base64; text formats are stored verbatim.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Parquet | Self::Xlsx | Self::Xls)
    }

    pub fn is_spreadsheet(self) -> bool {
        matches!(self, Self::Xlsx | Self::Xls)
    }
}

/// Output format for exports
#[derive(Debug, Default, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
    Xlsx,
    Xls,
    Parquet,
}

impl ExportFormat {
    pub const ALL: [Self; 6] = [
        Self::Csv,
        Self::Tsv,
        Self::Json,
        Self::Xlsx,
        Self::Xls,
        Self::Parquet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Tsv => "TSV",
            Self::Json => "JSON",
            Self::Xlsx => "XLSX",
            Self::Xls => "XLS",
            Self::Parquet => "Parquet",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Command-line arguments for tabsql
#[derive(Clone, Parser, Debug)]
#[command(
    name = "tabsql",
    version,
    about = "Query, join and export tabular files with SQL",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    /// Path(s) to the data file(s) to load. Each file becomes one table; the last one is active.
    /// Without paths the last saved file is restored (see session.restore_on_start).
    #[arg(value_name = "PATH")]
    pub paths: Vec<std::path::PathBuf>,

    /// Force file format (csv, tsv, parquet, xlsx, xls, json) for every path.
    /// By default format is detected from the extension; unknown extensions are read as CSV.
    #[arg(long = "format", value_enum)]
    pub format: Option<FileFormat>,

    /// SQL to run after loading. Loaded tables are addressed by their sanitized file names.
    #[arg(long = "sql", value_name = "SQL")]
    pub sql: Option<String>,

    /// Search the active table for this text in any column
    #[arg(long = "search", value_name = "TERM", conflicts_with = "sql")]
    pub search: Option<String>,

    /// Treat --search as a regular expression
    #[arg(long = "regex", requires = "search", action)]
    pub regex: bool,

    /// Make --search case-sensitive
    #[arg(long = "case-sensitive", requires = "search", action)]
    pub case_sensitive: bool,

    /// Quick filter applied when exporting the active table (case-insensitive match in any visible column)
    #[arg(long = "quick-filter", value_name = "TEXT")]
    pub quick_filter: Option<String>,

    /// JSON file describing a join between two loaded tables
    #[arg(long = "join-spec", value_name = "FILE")]
    pub join_spec: Option<std::path::PathBuf>,

    /// Name of the table created by --join-spec (default: <left>_<right>_join)
    #[arg(long = "join-target", value_name = "NAME", requires = "join_spec")]
    pub join_target: Option<String>,

    /// Write the active result to this file instead of printing it
    #[arg(long = "export", value_name = "PATH")]
    pub export: Option<std::path::PathBuf>,

    /// Export format. By default it is taken from the --export extension, then from config.
    #[arg(long = "export-format", value_enum)]
    pub export_format: Option<ExportFormat>,

    /// Maximum rows fetched by the initial preview of each loaded table (overrides config)
    #[arg(long = "preview-limit", value_name = "N")]
    pub preview_limit: Option<usize>,

    /// Restore the last saved file before processing paths
    #[arg(long = "restore", action)]
    pub restore: bool,

    /// Do not save loaded files for later restore
    #[arg(long = "no-persist", action)]
    pub no_persist: bool,

    /// Delete the saved session and exit
    #[arg(long = "clear-session", action)]
    pub clear_session: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/tabsql/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

fn markdown_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn placeholders(arg: &clap::Arg) -> Option<String> {
    let names = arg.get_value_names()?;
    let rendered: Vec<String> = names.iter().map(|n| format!("<{}>", n.as_str())).collect();
    Some(rendered.join(" "))
}

/// `-s, --long <VALUE>` style label, or `[<PATH>]` for an optional positional.
fn option_label(arg: &clap::Arg) -> String {
    if arg.is_positional() {
        let value = placeholders(arg).unwrap_or_default();
        return if arg.is_required_set() {
            value
        } else {
            format!("[{value}]")
        };
    }
    let flags: Vec<String> = arg
        .get_short()
        .map(|c| format!("-{c}"))
        .into_iter()
        .chain(arg.get_long().map(|l| format!("--{l}")))
        .collect();
    let mut label = flags.join(", ");
    if arg.get_action().takes_values() {
        if let Some(value) = placeholders(arg) {
            label.push(' ');
            label.push_str(&value);
        }
    }
    label
}

/// Usage line and an option table, printed by `gen_docs`.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = format!(
        "# Command Line Options\n\n## Usage\n\n```\n{}\n```\n\n## Options\n\n",
        cmd.render_usage()
    );
    out.push_str("| Option | Description |\n|--------|-------------|\n");

    let documented = cmd
        .get_arguments()
        .filter(|arg| !matches!(arg.get_id().as_str(), "help" | "version"));
    for arg in documented {
        let help = arg
            .get_help()
            .map(|h| markdown_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("| `{}` | {} |\n", option_label(arg), help));
    }
    out
}
