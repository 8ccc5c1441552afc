//! File-backed key-value store
//!
//! One file per key under a data directory. File names are the SHA-256 of
//! the key so arbitrary cache keys are safe on every filesystem; the key
//! itself is stored inside the file for enumeration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::{KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: String,
}

/// Directory of JSON entry files.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let entry: FileEntry = serde_json::from_str(&content)?;
        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.entry_path(key);
        let entry = FileEntry {
            key: key.to_string(),
            value: value.to_string(),
        };
        let content = serde_json::to_string(&entry)?;
        fs::write(&path, content).map_err(|e| io_error(&path, e))?;

        // Entries may hold credentials
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).map_err(|e| io_error(&path, e))?;
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let dir = fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        for item in dir {
            let item = item.map_err(|e| io_error(&self.dir, e))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<FileEntry>(&content) {
                Ok(entry) => keys.push(entry.key),
                Err(e) => tracing::warn!("Skipping malformed entry {}: {}", path.display(), e),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
