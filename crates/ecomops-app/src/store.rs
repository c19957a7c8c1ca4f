//! JSON-file token cache for the command-line shell.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ecomops_auth::{AuthError, TokenStore};
use tracing::debug;

/// Token cache persisted as a flat JSON object.
///
/// Every write rewrites the whole file; clearing removes it.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Opens the cache at `path`; a missing file is an empty cache.
    ///
    /// # Errors
    /// Returns [`AuthError::Storage`] when the file exists but is unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|error| storage_error(&path, error))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|error| storage_error(&path, error))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|error| storage_error(&self.path, error))?;
            }
            return Ok(());
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|error| storage_error(&self.path, error))?;
        fs::write(&self.path, raw).map_err(|error| storage_error(&self.path, error))?;
        debug!(stage = "token_store", action = "flush", keys = entries.len());
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("token store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("token store lock poisoned".to_string()))?;
        entries.clear();
        self.flush(&entries)
    }
}

fn storage_error(path: &Path, error: impl std::fmt::Display) -> AuthError {
    AuthError::Storage(format!("{}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use ecomops_auth::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ecomops-store-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn survives_reopen_and_clear_removes_file() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);

        let store = FileTokenStore::open(&path).expect("open empty store");
        store.set(ACCESS_TOKEN_KEY, "access-1").expect("write access token");
        store.set(REFRESH_TOKEN_KEY, "refresh-1").expect("write refresh token");

        let reopened = FileTokenStore::open(&path).expect("reopen store");
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));

        reopened.clear().expect("clear store");
        assert!(!path.exists());
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").expect("write corrupt file");
        assert!(matches!(FileTokenStore::open(&path), Err(AuthError::Storage(_))));
        let _ = fs::remove_file(&path);
    }
}
