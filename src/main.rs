use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabsql::error::{user_message, user_message_from_io};
use tabsql::{
    AppConfig, Args, ConfigManager, DiskStorage, Error, ExportError, ExportFormat, JoinSpec,
    RestoreOutcome, SearchRequest, Session, SessionStore, Workspace, APP_NAME,
};

fn init_logging(args: &Args, config: &AppConfig) {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.debug.log_level.to_lowercase()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Flags that do their work without loading any data.
fn handle_early_exit_flags(args: &Args, config: Option<&AppConfig>) -> Result<Option<()>> {
    if args.generate_config {
        let manager = ConfigManager::new(APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(Some(()));
    }

    if args.clear_session {
        let cache = match config {
            Some(config) => config.cache_manager(APP_NAME),
            None => tabsql::CacheManager::new(APP_NAME),
        };
        match cache {
            Ok(cache) => {
                let mut store = SessionStore::new(DiskStorage::from_cache(&cache));
                store.clear()?;
                println!("Saved session cleared");
            }
            Err(_) => println!("No saved session to clear"),
        }
        return Ok(Some(()));
    }

    Ok(None)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        eyre!(user_message_from_io(
            &e,
            Some(&format!("({})", path.display()))
        ))
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let session = Session::new(config.session_options());
    let store = if args.no_persist || !config.session.persist {
        None
    } else {
        let cache = config.cache_manager(APP_NAME)?;
        Some(SessionStore::new(DiskStorage::from_cache(&cache)))
    };
    let preview_limit = args.preview_limit.unwrap_or(config.query.preview_limit);
    if preview_limit == 0 {
        return Err(eyre!("--preview-limit must be greater than 0"));
    }
    let mut workspace = Workspace::new(session, store, preview_limit);

    if args.restore || (args.paths.is_empty() && config.session.restore_on_start) {
        match workspace.restore_previous() {
            RestoreOutcome::Restored(table) => {
                eprintln!("Restored {} as {}", table.display_name, table.relation_name)
            }
            RestoreOutcome::NothingToRestore => eprintln!("No saved session to restore"),
            RestoreOutcome::CouldNotRestore { reason } => {
                eprintln!("Could not restore previous session: {}", reason)
            }
        }
    }

    for path in &args.paths {
        let bytes = read_input(path)?;
        let name = display_name(path);
        let tab = workspace.open_file(&name, bytes, args.format)?;
        info!(
            relation = %tab.table.relation_name,
            rows = tab.table.row_count,
            columns = tab.table.columns.len(),
            "loaded table"
        );
    }

    if workspace.tabs().is_empty() {
        return Err(eyre!(
            "No table loaded. Pass one or more file paths, or use --restore."
        ));
    }

    if let Some(spec_path) = &args.join_spec {
        let text = std::fs::read_to_string(spec_path)
            .wrap_err_with(|| format!("Failed to read join spec {}", spec_path.display()))?;
        let spec: JoinSpec = serde_json::from_str(&text)
            .wrap_err_with(|| format!("Invalid join spec {}", spec_path.display()))?;
        let tab = workspace.join(&spec, args.join_target.as_deref())?;
        eprintln!(
            "Created {} ({} rows)",
            tab.table.relation_name, tab.table.row_count
        );
    }

    if let Some(sql) = &args.sql {
        workspace.run_query(sql)?;
    } else if let Some(term) = &args.search {
        let mut request = if args.regex {
            SearchRequest::regex(term.as_str())
        } else {
            SearchRequest::substring(term.as_str())
        };
        request.case_sensitive = args.case_sensitive;
        workspace.search(&request)?;
    }

    if let Some(text) = &args.quick_filter {
        workspace.set_quick_filter(text);
    }

    match &args.export {
        Some(path) => {
            let format = args
                .export_format
                .or_else(|| ExportFormat::from_path(path))
                .unwrap_or(config.export.default_format);
            let bytes = workspace.export_active(None, format)?;
            std::fs::write(path, &bytes)
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} bytes as {} to {}",
                bytes.len(),
                format.as_str(),
                path.display()
            );
        }
        None => {
            let format = args.export_format.unwrap_or(ExportFormat::Csv);
            if !matches!(format, ExportFormat::Csv | ExportFormat::Tsv | ExportFormat::Json) {
                return Err(eyre!(
                    "{} output must be written to a file with --export",
                    format.as_str()
                ));
            }
            match workspace.export_active(None, format) {
                Ok(bytes) => std::io::stdout().lock().write_all(&bytes)?,
                Err(Error::Export(ExportError::NoRows)) => eprintln!("(no rows)"),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // --generate-config must work even when the current config is invalid.
    if args.generate_config {
        if let Err(e) = handle_early_exit_flags(&args, None) {
            eprintln!("Error: {}", user_message(&e));
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match AppConfig::load(APP_NAME) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&args, &config);

    match handle_early_exit_flags(&args, Some(&config)) {
        Ok(Some(())) => return Ok(()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", user_message(&e));
            std::process::exit(1);
        }
    }

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {}", user_message(&e));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(display_name(&PathBuf::from("/data/Sales 2024.csv")), "Sales 2024.csv");
    }

    #[test]
    fn test_search_flags_parse() {
        let args = Args::parse_from(["tabsql", "a.csv", "--search", "fox", "--regex"]);
        assert_eq!(args.search.as_deref(), Some("fox"));
        assert!(args.regex);
        assert!(!args.case_sensitive);
    }
}
