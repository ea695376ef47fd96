use color_eyre::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory holding saved session records
pub const SESSION_DIR: &str = "session";

/// Registry of known cache subdirectories
const CACHE_DIRS: &[&str] = &[SESSION_DIR];

/// Manages cache directory and cache file operations
#[derive(Debug, Clone)]
pub struct CacheManager {
    pub(crate) cache_dir: PathBuf,
}

impl CacheManager {
    /// Create a new CacheManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine cache directory"))?
            .join(app_name);

        Ok(Self { cache_dir })
    }

    /// Use an explicit cache directory (config override, tests)
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    pub fn session_dir(&self) -> PathBuf {
        self.cache_path(SESSION_DIR)
    }

    /// Ensure a subdirectory exists within the cache directory
    pub fn ensure_subdir(&self, subdir: &str) -> Result<PathBuf> {
        let path = self.cache_path(subdir);
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        Ok(path)
    }

    /// Remove every registered cache subdirectory
    pub fn clear_all(&self) -> Result<()> {
        for subdir in CACHE_DIRS {
            let path = self.cache_path(subdir);
            if path.exists() {
                if let Err(e) = fs::remove_dir_all(&path) {
                    tracing::warn!("Could not remove cache directory {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }
}
