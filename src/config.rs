use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::cache::CacheManager;
use crate::engine::ReadOptions;
use crate::format::ExportFormat;
use crate::session::SessionOptions;

const CONFIG_FILE: &str = "config.toml";

/// Manages config directory and config file operations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Default configuration as a TOML template. Every field is commented out
    /// so the built-in defaults apply until a line is uncommented.
    pub fn generate_default_config(&self) -> String {
        let toml_str = match toml::to_string_pretty(&AppConfig::default()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Could not serialize default config: {}", e);
                String::new()
            }
        };
        Self::comment_all_fields(&toml_str, &Self::collect_all_comments())
    }

    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();
        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        let sections: &[(&str, &[(&str, &str)])] = &[
            ("file_loading", FILE_LOADING_COMMENTS),
            ("query", QUERY_COMMENTS),
            ("session", SESSION_COMMENTS),
            ("export", EXPORT_COMMENTS),
            ("debug", DEBUG_COMMENTS),
        ];
        for (section, fields) in sections {
            for (field, comment) in *fields {
                comments.insert(format!("{}.{}", section, field), comment.to_string());
            }
        }
        comments
    }

    fn push_comment(out: &mut String, comment: Option<&String>) {
        if let Some(comment) = comment {
            for line in comment.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    /// Optional fields the serializer skipped are written as `# field = null`
    /// at the end of their section.
    fn push_missing_options(
        out: &mut String,
        section: &str,
        seen: &HashSet<String>,
        comments: &HashMap<String, String>,
    ) {
        for path in OPTIONAL_FIELDS {
            let in_section = path
                .rsplit_once('.')
                .is_some_and(|(s, _)| s == section);
            if !in_section || seen.contains(*path) {
                continue;
            }
            Self::push_comment(out, comments.get(*path));
            let field_name = path.rsplit('.').next().unwrap_or(path);
            out.push_str(&format!("# {} = null\n\n", field_name));
        }
    }

    fn comment_all_fields(toml: &str, comments: &HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# tabsql configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                Self::push_missing_options(&mut result, &current_section, &seen_fields, comments);
                current_section = section;
                if let Some((_, header)) = SECTION_HEADERS.iter().find(|(s, _)| *s == current_section) {
                    result.push_str(header);
                    result.push('\n');
                }
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                Self::push_comment(&mut result, comments.get(&field_path));
                seen_fields.insert(field_path);
                result.push_str("# ");
                result.push_str(line);
                result.push_str("\n\n");
                continue;
            }

            if !line.trim().is_empty() {
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            }
        }
        Self::push_missing_options(&mut result, &current_section, &seen_fields, comments);
        result
    }

    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .map(str::to_string)
    }

    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path(CONFIG_FILE);

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, self.generate_default_config())?;
        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub file_loading: FileLoadingConfig,
    pub query: QueryConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
    pub debug: DebugConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "file_loading",
        "# ============================================================================\n# File Loading Defaults\n# ============================================================================",
    ),
    (
        "query",
        "# ============================================================================\n# Query Settings\n# ============================================================================",
    ),
    (
        "session",
        "# ============================================================================\n# Session Persistence\n# ============================================================================\n# The last loaded file is saved so it can be reopened with --restore.",
    ),
    (
        "export",
        "# ============================================================================\n# Export Settings\n# ============================================================================",
    ),
    (
        "debug",
        "# ============================================================================\n# Debug Settings\n# ============================================================================",
    ),
];

/// Fields serialized as absent when unset.
const OPTIONAL_FIELDS: &[&str] = &["session.storage_dir"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            file_loading: FileLoadingConfig::default(),
            query: QueryConfig::default(),
            session: SessionConfig::default(),
            export: ExportConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoadingConfig {
    /// Rows scanned for schema inference. 0 scans every row.
    pub infer_schema_length: usize,
    pub try_parse_dates: bool,
}

const FILE_LOADING_COMMENTS: &[(&str, &str)] = &[
    (
        "infer_schema_length",
        "Number of rows scanned to infer column types in CSV/TSV/JSON files.\n0 scans the whole file (slower, but never mistypes a late value).",
    ),
    (
        "try_parse_dates",
        "Parse date-like text columns (YYYY-MM-DD, ISO datetimes) as dates",
    ),
];

impl Default for FileLoadingConfig {
    fn default() -> Self {
        Self {
            infer_schema_length: 1000,
            try_parse_dates: true,
        }
    }
}

impl FileLoadingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = Self::default();
        if other.infer_schema_length != default.infer_schema_length {
            self.infer_schema_length = other.infer_schema_length;
        }
        if other.try_parse_dates != default.try_parse_dates {
            self.try_parse_dates = other.try_parse_dates;
        }
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            infer_schema_length: match self.infer_schema_length {
                0 => None,
                n => Some(n),
            },
            try_parse_dates: self.try_parse_dates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub preview_limit: usize,
    pub join_preview_limit: usize,
}

const QUERY_COMMENTS: &[(&str, &str)] = &[
    (
        "preview_limit",
        "Rows fetched when a file is first opened",
    ),
    (
        "join_preview_limit",
        "Rows shown when previewing a join before it is materialized",
    ),
];

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            preview_limit: 1000,
            join_preview_limit: 100,
        }
    }
}

impl QueryConfig {
    pub fn merge(&mut self, other: Self) {
        let default = Self::default();
        if other.preview_limit != default.preview_limit {
            self.preview_limit = other.preview_limit;
        }
        if other.join_preview_limit != default.join_preview_limit {
            self.join_preview_limit = other.join_preview_limit;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub persist: bool,
    pub restore_on_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

const SESSION_COMMENTS: &[(&str, &str)] = &[
    (
        "persist",
        "Save each loaded file so it can be restored in a later run",
    ),
    (
        "restore_on_start",
        "Reopen the last saved file when started without any paths",
    ),
    (
        "storage_dir",
        "Directory for saved session records.\nnull = the platform cache directory (e.g. ~/.cache/tabsql)",
    ),
];

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist: true,
            restore_on_start: true,
            storage_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn merge(&mut self, other: Self) {
        let default = Self::default();
        if other.persist != default.persist {
            self.persist = other.persist;
        }
        if other.restore_on_start != default.restore_on_start {
            self.restore_on_start = other.restore_on_start;
        }
        if other.storage_dir.is_some() {
            self.storage_dir = other.storage_dir;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: ExportFormat,
}

const EXPORT_COMMENTS: &[(&str, &str)] = &[(
    "default_format",
    "Format used when --export has no recognizable extension.\nOne of: csv, tsv, json, parquet, xlsx, xls",
)];

impl ExportConfig {
    pub fn merge(&mut self, other: Self) {
        if other.default_format != ExportFormat::default() {
            self.default_format = other.default_format;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
}

const DEBUG_COMMENTS: &[(&str, &str)] = &[(
    "log_level",
    "Log level written to stderr: error, warn, info, debug, trace or off.\nRUST_LOG overrides this; --debug forces debug.",
)];

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        if other.log_level != Self::default().log_level {
            self.log_level = other.log_level;
        }
    }
}

impl AppConfig {
    /// Load configuration from the user's config directory, falling back to defaults
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_from(&manager)
    }

    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let config_path = manager.config_path(CONFIG_FILE);
        let mut config = AppConfig::default();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                eyre!(
                    "Failed to read config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            let user_config: AppConfig = toml::from_str(&content).map_err(|e| {
                eyre!(
                    "Failed to parse config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            config.merge(user_config);
        }

        config
            .validate()
            .map_err(|e| eyre!("Invalid configuration in {}: {}", config_path.display(), e))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }
        self.file_loading.merge(other.file_loading);
        self.query.merge(other.query);
        self.session.merge(other.session);
        self.export.merge(other.export);
        self.debug.merge(other.debug);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.x",
                self.version
            ));
        }
        if self.query.preview_limit == 0 {
            return Err(eyre!("query.preview_limit must be greater than 0"));
        }
        if self.query.join_preview_limit == 0 {
            return Err(eyre!("query.join_preview_limit must be greater than 0"));
        }
        let level = self.debug.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(eyre!(
                "debug.log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.debug.log_level
            ));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            read_options: self.file_loading.read_options(),
            join_preview_limit: self.query.join_preview_limit,
        }
    }

    /// Cache location for saved sessions, honouring `session.storage_dir`.
    pub fn cache_manager(&self, app_name: &str) -> Result<CacheManager> {
        match &self.session.storage_dir {
            Some(dir) => Ok(CacheManager::with_dir(dir.clone())),
            None => CacheManager::new(app_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_template_is_fully_commented() {
        let manager = ConfigManager::with_dir(PathBuf::from("/nonexistent"));
        let template = manager.generate_default_config();
        assert!(template.contains("# preview_limit = 1000"));
        assert!(template.contains("# [session]"));
        assert!(template.contains("# storage_dir = null"));
        assert!(template.contains("# default_format = \"csv\""));
        assert!(template
            .lines()
            .all(|l| l.is_empty() || l.starts_with('#')));

        let parsed: AppConfig = toml::from_str(&template).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp.path().join("tabsql"));
        let path = manager.write_default_config(false).unwrap();
        assert!(path.exists());
        assert!(manager.write_default_config(false).is_err());
        assert!(manager.write_default_config(true).is_ok());
    }

    #[test]
    fn test_load_merges_partial_user_config() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp.path().to_path_buf());
        std::fs::write(
            manager.config_path(CONFIG_FILE),
            "[query]\npreview_limit = 50\n\n[export]\ndefault_format = \"parquet\"\n\n[file_loading]\ninfer_schema_length = 0\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&manager).unwrap();
        assert_eq!(config.query.preview_limit, 50);
        assert_eq!(config.query.join_preview_limit, 100);
        assert_eq!(config.export.default_format, ExportFormat::Parquet);
        assert!(config.session.persist);

        let options = config.session_options();
        assert_eq!(options.read_options.infer_schema_length, None);
        assert!(options.read_options.try_parse_dates);
        assert_eq!(options.join_preview_limit, 100);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp.path().join("absent"));
        assert_eq!(AppConfig::load_from(&manager).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.query.preview_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.debug.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.version = "2.0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_dir_overrides_cache_location() {
        let mut config = AppConfig::default();
        config.session.storage_dir = Some(PathBuf::from("/tmp/tabsql-store"));
        let cache = config.cache_manager("tabsql").unwrap();
        assert_eq!(cache.cache_dir(), Path::new("/tmp/tabsql-store"));
    }
}
