//! Credential storage implementations

use crate::auth::credential::{Credential, StoredCredential};
use crate::error::AuthError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Opaque key-value store of credentials, keyed by provider id.
///
/// A missing entry is a normal value (`None`), never an error.
pub trait CredentialStore: Send + Sync {
    /// Loads the credential for `provider`.
    fn get(&self, provider: &str) -> Option<Credential>;

    /// Stores `credential` for `provider`, replacing any previous record.
    fn set(&self, provider: &str, credential: &Credential) -> Result<(), AuthError>;

    /// Removes the record for `provider`. Deleting a missing record is not an error.
    fn delete(&self, provider: &str) -> Result<(), AuthError>;

    /// Provider ids with a stored record.
    fn list(&self) -> Vec<String>;
}

/// Get the default credentials directory
pub fn default_credentials_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelforge")
        .join("credentials")
}

/// File-backed store: one `<provider>.json` per provider, owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Store rooted at the default data directory.
    pub fn new() -> Self {
        Self::with_dir(default_credentials_dir())
    }

    /// Store rooted at `dir` (useful for testing).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the credential files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get credentials file path for a provider
    fn credentials_path(&self, provider: &str) -> PathBuf {
        let name: String = provider
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    fn load_record(path: &Path) -> Option<StoredCredential> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("Failed to read credential file {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unparseable credential file {:?}: {}", path, e);
                None
            }
        }
    }
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Ensure file has private permissions (0o600)
fn ensure_private_file(path: &Path) -> Result<(), AuthError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider: &str) -> Option<Credential> {
        let path = self.credentials_path(provider);
        let record = Self::load_record(&path)?;
        match record.into_credential() {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!("Ignoring invalid credential record for {}: {}", provider, e);
                None
            }
        }
    }

    fn set(&self, provider: &str, credential: &Credential) -> Result<(), AuthError> {
        let Some(record) = StoredCredential::from_credential(credential) else {
            tracing::debug!("Not persisting {} credential for {}", credential.kind(), provider);
            return Ok(());
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.credentials_path(provider);
        let content = serde_json::to_string_pretty(&record)?;

        // Write to temp file first, then rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        ensure_private_file(&temp_path)?;
        fs::rename(&temp_path, &path)
            .map_err(|e| AuthError::Storage(format!("failed to save credential for {}: {}", provider, e)))?;

        tracing::debug!("Saved {} credential to {:?}", provider, path);
        Ok(())
    }

    fn delete(&self, provider: &str) -> Result<(), AuthError> {
        let path = self.credentials_path(provider);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted {} credential from {:?}", provider, path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut providers: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            })
            .collect();
        providers.sort();
        providers
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Credential>> {
        // A poisoned map is still a consistent map of whole credentials.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: &str) -> Option<Credential> {
        self.entries().get(provider).cloned()
    }

    fn set(&self, provider: &str, credential: &Credential) -> Result<(), AuthError> {
        if matches!(credential, Credential::None) {
            return Ok(());
        }
        self.entries().insert(provider.to_string(), credential.clone());
        Ok(())
    }

    fn delete(&self, provider: &str) -> Result<(), AuthError> {
        self.entries().remove(provider);
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.entries().keys().cloned().collect();
        providers.sort();
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::{OAuthCredential, BEARER};
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;

    fn oauth_credential() -> Credential {
        Credential::OAuth(OAuthCredential {
            access_token: SecretString::new("gho_token".to_string()),
            refresh_token: Some(SecretString::new("ghr_refresh".to_string())),
            expires_at: Utc.timestamp_opt(1_900_000_000, 0).unwrap(),
            token_type: BEARER.to_string(),
        })
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_dir(dir.path());

        let credential = oauth_credential();
        store.set("github-copilot", &credential).unwrap();
        assert_eq!(store.get("github-copilot"), Some(credential));

        let key = Credential::api_key("sk-test");
        store.set("openai", &key).unwrap();
        assert_eq!(store.get("openai"), Some(key));

        assert_eq!(store.list(), vec!["github-copilot".to_string(), "openai".to_string()]);
    }

    #[test]
    fn test_file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_dir(dir.path().join("nested"));
        assert!(store.get("openai").is_none());
        assert!(store.list().is_empty());
        store.delete("openai").unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("openai.json"), "{not json").unwrap();
        let store = FileCredentialStore::with_dir(dir.path());
        assert!(store.get("openai").is_none());
    }

    #[test]
    fn test_file_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_dir(dir.path());
        store.set("openai", &Credential::api_key("sk-test")).unwrap();
        store.delete("openai").unwrap();
        assert!(store.get("openai").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_dir(dir.path());
        store.set("openai", &Credential::api_key("sk-test")).unwrap();
        let mode = fs::metadata(dir.path().join("openai.json")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_no_credential_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_dir(dir.path());
        store.set("ollama", &Credential::None).unwrap();
        assert!(store.get("ollama").is_none());

        let memory = MemoryCredentialStore::new();
        memory.set("ollama", &Credential::None).unwrap();
        assert!(memory.get("ollama").is_none());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        let credential = oauth_credential();
        store.set("github-copilot", &credential).unwrap();
        assert_eq!(store.get("github-copilot"), Some(credential));
        store.delete("github-copilot").unwrap();
        assert!(store.get("github-copilot").is_none());
    }

    #[test]
    fn test_credentials_path_sanitizes() {
        let store = FileCredentialStore::with_dir("/tmp/creds");
        let path = store.credentials_path("../evil/name");
        assert!(path.to_string_lossy().ends_with("___evil_name.json"));
    }
}
