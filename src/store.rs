//! Session Store: keeps the last loaded file so it can be re-ingested after a restart.
//!
//! Only one record is restorable at a time, the one the "last used" pointer
//! names. Saving a new file replaces the previous record.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::catalog::LoadedTable;
use crate::engine::FileBuffer;
use crate::error::{Error, Result};
use crate::format::FileFormat;
use crate::session::Session;

mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).map_err(|e| {
            serde::ser::Error::custom(format!("Failed to serialize SystemTime: {}", e))
        })?;
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_millis(millis))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFile {
    pub id: String,
    pub display_name: String,
    pub format: FileFormat,
    /// Verbatim text for text formats, base64 for binary formats.
    pub content: String,
    #[serde(with = "time_serde")]
    pub created: SystemTime,
    #[serde(with = "time_serde")]
    pub last_used: SystemTime,
    /// Size of the original file content in bytes.
    pub byte_size: usize,
}

impl PersistedFile {
    pub fn new(display_name: &str, format: FileFormat, bytes: &[u8]) -> Result<Self> {
        let content = if format.is_binary() {
            base64::engine::general_purpose::STANDARD.encode(bytes)
        } else {
            String::from_utf8(bytes.to_vec()).map_err(|_| {
                Error::persistence(format!("{} is not valid UTF-8 text", display_name))
            })?
        };
        let created = SystemTime::now();
        Ok(Self {
            id: record_id(display_name, created),
            display_name: display_name.to_string(),
            format,
            content,
            created,
            last_used: created,
            byte_size: bytes.len(),
        })
    }

    /// Decode the stored content back into what ingestion takes.
    pub fn decode(&self) -> Result<FileBuffer> {
        let buffer = if self.format.is_binary() {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(self.content.as_bytes())
                .map_err(|e| Error::persistence(format!("corrupted record content: {}", e)))?;
            FileBuffer::Bytes(bytes)
        } else {
            FileBuffer::Text(self.content.clone())
        };
        if buffer.len() != self.byte_size {
            return Err(Error::persistence(format!(
                "corrupted record content: expected {} bytes, found {}",
                self.byte_size,
                buffer.len()
            )));
        }
        Ok(buffer)
    }
}

/// Hash of display name and creation time, as fixed-width hex.
fn record_id(display_name: &str, created: SystemTime) -> String {
    let mut hasher = DefaultHasher::new();
    display_name.hash(&mut hasher);
    created
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Durable key/blob storage for file records plus the single "last used" pointer.
pub trait Storage {
    fn put_record(&mut self, record: &PersistedFile) -> Result<()>;
    /// `Ok(None)` when no record has this id; `Err` when one exists but is unreadable.
    fn get_record(&self, id: &str) -> Result<Option<PersistedFile>>;
    fn remove_record(&mut self, id: &str) -> Result<()>;
    fn last_used(&self) -> Result<Option<String>>;
    fn set_last_used(&mut self, id: Option<&str>) -> Result<()>;
    /// Remove every record and the pointer.
    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_file_id: Option<String>,
}

/// One `file_<id>.json` per record and a `settings.json`, all in one directory.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    dir: PathBuf,
}

const SETTINGS_FILE: &str = "settings.json";

impl DiskStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn from_cache(cache: &CacheManager) -> Self {
        Self::new(cache.session_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Option<PathBuf> {
        // Ids are hex; anything else cannot name a record file.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.dir.join(format!("file_{}.json", id)))
    }

    fn write_locked(&self, path: &Path, json: &[u8]) -> Result<()> {
        use fs2::FileExt;
        fs::create_dir_all(&self.dir)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        file.lock_exclusive()?;
        file.write_all(json)?;
        file.flush()?;
        file.unlock()?;
        Ok(())
    }

    fn read_settings(&self) -> Result<Settings> {
        let path = self.dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Storage for DiskStorage {
    fn put_record(&mut self, record: &PersistedFile) -> Result<()> {
        let path = self
            .record_path(&record.id)
            .ok_or_else(|| Error::persistence(format!("invalid record id '{}'", record.id)))?;
        let json = serde_json::to_vec_pretty(record)?;
        self.write_locked(&path, &json)
    }

    fn get_record(&self, id: &str) -> Result<Option<PersistedFile>> {
        let Some(path) = self.record_path(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn remove_record(&mut self, id: &str) -> Result<()> {
        if let Some(path) = self.record_path(id) {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn last_used(&self) -> Result<Option<String>> {
        Ok(self.read_settings()?.last_used_file_id)
    }

    fn set_last_used(&mut self, id: Option<&str>) -> Result<()> {
        let settings = Settings {
            last_used_file_id: id.map(str::to_string),
        };
        let json = serde_json::to_vec_pretty(&settings)?;
        self.write_locked(&self.dir.join(SETTINGS_FILE), &json)
    }

    fn clear(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let is_record = name.starts_with("file_") && name.ends_with(".json");
            if path.is_file() && (is_record || name == SETTINGS_FILE) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// In-process storage; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    records: HashMap<String, PersistedFile>,
    last_used: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn put_record(&mut self, record: &PersistedFile) -> Result<()> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<PersistedFile>> {
        Ok(self.records.get(id).cloned())
    }

    fn remove_record(&mut self, id: &str) -> Result<()> {
        self.records.remove(id);
        Ok(())
    }

    fn last_used(&self) -> Result<Option<String>> {
        Ok(self.last_used.clone())
    }

    fn set_last_used(&mut self, id: Option<&str>) -> Result<()> {
        self.last_used = id.map(str::to_string);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.last_used = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    NothingToRestore,
    CouldNotRestore { reason: String },
    Restored(LoadedTable),
}

impl RestoreOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "previous session could not be restored");
        RestoreOutcome::CouldNotRestore { reason }
    }
}

pub struct SessionStore<S: Storage> {
    storage: S,
}

impl<S: Storage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persist `bytes` as the restorable file and return its id.
    pub fn save(&mut self, display_name: &str, format: FileFormat, bytes: &[u8]) -> Result<String> {
        let record = PersistedFile::new(display_name, format, bytes)?;
        let previous = self.storage.last_used()?;

        self.storage.put_record(&record)?;
        self.storage.set_last_used(Some(&record.id))?;

        if let Some(old) = previous.filter(|old| *old != record.id) {
            if let Err(e) = self.storage.remove_record(&old) {
                debug!(id = %old, error = %e, "could not remove replaced record");
            }
        }
        info!(id = %record.id, name = display_name, bytes = record.byte_size, "saved session file");
        Ok(record.id)
    }

    /// The record the pointer names, if both exist.
    pub fn last_used_record(&self) -> Result<Option<PersistedFile>> {
        match self.storage.last_used()? {
            Some(id) => self.storage.get_record(&id),
            None => Ok(None),
        }
    }

    /// Re-ingest the last used file. Never fails; problems become `CouldNotRestore`.
    pub fn restore(&mut self, session: &mut Session) -> RestoreOutcome {
        let id = match self.storage.last_used() {
            Ok(Some(id)) => id,
            Ok(None) => return RestoreOutcome::NothingToRestore,
            Err(e) => return RestoreOutcome::failed(e.to_string()),
        };
        let mut record = match self.storage.get_record(&id) {
            Ok(Some(record)) => record,
            Ok(None) => return RestoreOutcome::failed(format!("saved file {} is missing", id)),
            Err(e) => return RestoreOutcome::failed(e.to_string()),
        };
        let content = match record.decode() {
            Ok(content) => content,
            Err(e) => return RestoreOutcome::failed(e.to_string()),
        };

        match session.ingest(content, &record.display_name, record.format) {
            Ok(table) => {
                record.last_used = SystemTime::now();
                if let Err(e) = self.storage.put_record(&record) {
                    warn!(error = %e, "could not refresh last-used time");
                }
                info!(relation = %table.relation_name, "restored previous session");
                RestoreOutcome::Restored(table)
            }
            Err(e) => RestoreOutcome::failed(e.to_string()),
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        self.storage.clear()?;
        info!("cleared saved session");
        Ok(())
    }
}
