use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Failed to access token file: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent home of the session token across process restarts.
pub trait TokenStore: Send + Sync {
    /// The persisted token, if one exists.
    fn read(&self) -> Result<Option<SecretString>, TokenStoreError>;
    fn write(&self, token: &SecretString) -> Result<(), TokenStoreError>;
    /// Remove the persisted token. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// Stores the token as a single line in a user-only file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<(), TokenStoreError> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        if dir.as_os_str().is_empty() || dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to set token directory permissions to 0700"
                );
            }
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self) -> Result<Option<SecretString>, TokenStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SecretString::from(token.to_string())))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TokenStoreError::Io(e)),
        }
    }

    /// Write-to-temp-then-rename so a crash never leaves a partial token.
    fn write(&self, token: &SecretString) -> Result<(), TokenStoreError> {
        use std::time::{SystemTime, UNIX_EPOCH};

        self.ensure_parent_dir()?;

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!("tmp.{:016x}", suffix));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        let written = file
            .write_all(token.expose_secret().as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.sync_all());
        drop(file);

        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(TokenStoreError::Io(e));
        }

        #[cfg(windows)]
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(TokenStoreError::Io(e));
        }

        tracing::debug!(path = %self.path.display(), "Persisted session token");
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed session token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenStoreError::Io(e)),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<SecretString>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(SecretString::from(token.into()))),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self) -> Result<Option<SecretString>, TokenStoreError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn write(&self, token: &SecretString) -> Result<(), TokenStoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (PathBuf, FileTokenStore) {
        let dir = std::env::temp_dir().join(format!("upwatch_token_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let store = FileTokenStore::new(dir.join("nested").join("token"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_reads_none() {
        let (dir, store) = temp_store("missing");
        assert!(store.read().unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_then_read() {
        let (dir, store) = temp_store("write_read");
        store
            .write(&SecretString::from("abc.def.ghi".to_string()))
            .unwrap();

        let token = store.read().unwrap().unwrap();
        assert_eq!(token.expose_secret(), "abc.def.ghi");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_replaces_existing_token() {
        let (dir, store) = temp_store("replace");
        store.write(&SecretString::from("first".to_string())).unwrap();
        store.write(&SecretString::from("second".to_string())).unwrap();
        assert_eq!(store.read().unwrap().unwrap().expose_secret(), "second");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (dir, store) = temp_store("clear");
        store.write(&SecretString::from("tok".to_string())).unwrap();
        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
        store.clear().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_blank_file_reads_none() {
        let (dir, store) = temp_store("blank");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.read().unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = temp_store("perms");
        store.write(&SecretString::from("tok".to_string())).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::with_token("tok");
        assert!(store.has_token());
        store.clear().unwrap();
        assert!(!store.has_token());
        assert!(store.read().unwrap().is_none());
    }
}
