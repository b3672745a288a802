//! Session Storage - Durable persistence for the token and identity snapshot
//!
//! Exactly two entries are kept: the opaque token and a JSON snapshot of the
//! identity. Writes and removals always cover both keys in one commit so a
//! reload never observes one without the other.

use crate::auth::Identity;
use sisrec_core::{storage_error, SisrecResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage key for the opaque bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Storage key for the serialized identity snapshot
pub const USER_KEY: &str = "user";

/// Key-value storage that survives restarts
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> SisrecResult<Option<String>>;

    /// Write every entry in a single commit
    fn set_all(&self, entries: &[(&str, String)]) -> SisrecResult<()>;

    /// Remove every key in a single commit; absent keys are ignored
    fn remove_all(&self, keys: &[&str]) -> SisrecResult<()>;
}

/// In-process storage, used by tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the storage with existing entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> SisrecResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| storage_error!("Memory storage lock poisoned", "memory_storage"))?;
        Ok(entries.get(key).cloned())
    }

    fn set_all(&self, new_entries: &[(&str, String)]) -> SisrecResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Memory storage lock poisoned", "memory_storage"))?;
        for (key, value) in new_entries {
            entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> SisrecResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Memory storage lock poisoned", "memory_storage"))?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Single JSON document on disk, replaced atomically on every commit
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: std::sync::Mutex<()>,
}

impl FileStorage {
    /// Create a file-backed storage, creating the parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> SisrecResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Session storage initialized at: {}", path.display());

        Ok(Self {
            path,
            write_lock: std::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> SisrecResult<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }

        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                // An unreadable document is treated as empty; the next commit replaces it
                warn!(
                    "Discarding unreadable session document {}: {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
        }
    }

    fn write_document(&self, document: &HashMap<String, String>) -> SisrecResult<()> {
        let json_data = serde_json::to_string_pretty(document)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json_data).map_err(|e| {
            storage_error!(
                format!("Failed to write {}", tmp_path.display()),
                "file_storage",
                e
            )
        })?;

        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(storage_error!(
                format!("Failed to replace {}", self.path.display()),
                "file_storage",
                e
            ));
        }

        debug!("Committed session document to {}", self.path.display());
        Ok(())
    }

    fn modify<F>(&self, change: F) -> SisrecResult<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| storage_error!("File storage lock poisoned", "file_storage"))?;
        let mut document = self.read_document()?;
        change(&mut document);
        self.write_document(&document)
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> SisrecResult<Option<String>> {
        Ok(self.read_document()?.remove(key))
    }

    fn set_all(&self, entries: &[(&str, String)]) -> SisrecResult<()> {
        self.modify(|document| {
            for (key, value) in entries {
                document.insert((*key).to_string(), value.clone());
            }
        })
    }

    fn remove_all(&self, keys: &[&str]) -> SisrecResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|document| {
            for key in keys {
                document.remove(*key);
            }
        })
    }
}

/// What a previous run left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistedSession {
    /// Both entries present
    Complete { token: String, user_json: String },
    /// Exactly one of the two entries present
    Partial,
    Empty,
}

/// Typed view of the two session keys over any `DurableStorage`
pub struct SessionPersistence {
    storage: std::sync::Arc<dyn DurableStorage>,
}

impl SessionPersistence {
    pub fn new(storage: std::sync::Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> SisrecResult<PersistedSession> {
        let token = self.storage.get(AUTH_TOKEN_KEY)?;
        let user_json = self.storage.get(USER_KEY)?;

        Ok(match (token, user_json) {
            (Some(token), Some(user_json)) => PersistedSession::Complete { token, user_json },
            (None, None) => PersistedSession::Empty,
            _ => PersistedSession::Partial,
        })
    }

    pub fn save(&self, token: &str, identity: &Identity) -> SisrecResult<()> {
        let user_json = serde_json::to_string(identity)?;
        self.storage.set_all(&[
            (AUTH_TOKEN_KEY, token.to_string()),
            (USER_KEY, user_json),
        ])
    }

    pub fn clear(&self) -> SisrecResult<()> {
        self.storage.remove_all(&[AUTH_TOKEN_KEY, USER_KEY])
    }
}
