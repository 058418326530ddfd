// # File Stores
//
// File-based implementations of BindingStore and CredentialStore with crash
// recovery.
//
// ## Purpose
//
// - Bindings: keep (ad, platform) bindings across restarts so a re-sync after
//   a crash updates the existing native campaigns instead of creating
//   duplicates
// - Credentials: keep refreshed tokens across restarts so a restart does not
//   fall back to the tokens the daemon was first seeded with
//
// ## Crash Recovery
//
// - Atomic writes: the whole file is written to `.tmp`, then renamed
// - Backup: the previous file is copied to `.backup` before every rename
// - Recovery: an unparsable file is replaced by its backup on load
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "bindings": {
//     "ad-1": {
//       "google": { "ad_id": "ad-1", "platform": "google", "native_id": "123", ... }
//     }
//   }
// }
// ```
//
// The credential file has the same envelope with a `credentials` array and
// is readable by its owner only on Unix.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::model::{Credential, CredentialKey, Platform, PlatformBinding};
use crate::traits::{BindingStore, CredentialStore};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

type Bindings = BTreeMap<String, BTreeMap<Platform, PlatformBinding>>;

/// Serializable store file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFileFormat<T> {
    version: String,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BindingFile {
    bindings: Bindings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialFile {
    credentials: Vec<Credential>,
}

enum Loaded<T> {
    Body(T),
    Corrupt(String),
}

/// One JSON store file: atomic replace on write, backup recovery on load
#[derive(Debug)]
struct StoreFile {
    path: PathBuf,
    /// What the file holds, for log messages
    label: &'static str,
    /// Restrict the file to its owner
    private: bool,
    /// Serializes writers so two renames never race on the temp file
    write_lock: Mutex<()>,
}

impl StoreFile {
    async fn open(path: &Path, label: &'static str, private: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            label,
            private,
            write_lock: Mutex::new(()),
        })
    }

    async fn load_with_recovery<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let reason = match self.load(&self.path).await? {
            Loaded::Body(body) => {
                tracing::debug!("Loaded {} from {}", self.label, self.path.display());
                return Ok(body);
            }
            Loaded::Corrupt(reason) => reason,
        };

        tracing::warn!(
            "{} file {} appears corrupted: {}. Attempting recovery from backup.",
            self.label,
            self.path.display(),
            reason
        );

        let backup_path = Self::backup_path(&self.path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with no {}.", self.label);
            return Ok(T::default());
        }

        match self.load(&backup_path).await? {
            Loaded::Body(body) => {
                tracing::info!("Recovered {} from backup", self.label);
                if let Err(e) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!("Failed to restore {} file from backup: {}", self.label, e);
                }
                Ok(body)
            }
            Loaded::Corrupt(backup_reason) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with no {}.",
                    backup_reason,
                    self.label
                );
                Ok(T::default())
            }
        }
    }

    async fn load<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<Loaded<T>> {
        if !path.exists() {
            tracing::debug!("{} file does not exist: {}", self.label, path.display());
            return Ok(Loaded::Body(T::default()));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "Failed to read {} file {}: {}",
                self.label,
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat<T> = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => return Ok(Loaded::Corrupt(e.to_string())),
        };

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "{} file version mismatch: expected {}, got {}. Attempting to load anyway.",
                self.label,
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(Loaded::Body(file.body))
    }

    /// Replace the file with `body` atomically
    async fn persist<T: Serialize>(&self, body: T) -> Result<()> {
        let _writer = self.write_lock.lock().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            body,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize {}: {}", self.label, e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            #[cfg(unix)]
            if self.private {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))
                    .await
                    .map_err(|e| {
                        Error::store(format!(
                            "Failed to restrict temp file {}: {}",
                            temp_path.display(),
                            e
                        ))
                    })?;
            }
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create {} backup: {}", self.label, e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("{} written to {}", self.label, self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

/// File-based binding store with crash recovery
///
/// Every mutation is written through to disk before it returns.
///
/// # Example
///
/// ```rust,no_run
/// use adsync_core::model::{Platform, PlatformBinding};
/// use adsync_core::state::FileBindingStore;
/// use adsync_core::traits::BindingStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileBindingStore::new("/var/lib/adsync/bindings.json").await?;
///     store.upsert(&PlatformBinding::new("ad-1", Platform::Facebook)).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileBindingStore {
    file: StoreFile,
    bindings: RwLock<Bindings>,
}

impl FileBindingStore {
    /// Create or load a file binding store
    ///
    /// Parent directories are created as needed. A corrupted file is
    /// recovered from its backup, or started empty if the backup is unusable
    /// too.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = StoreFile::open(path.as_ref(), "bindings", false).await?;
        let loaded: BindingFile = file.load_with_recovery().await?;
        tracing::debug!(count = loaded.bindings.len(), "Loaded bindings from file");

        Ok(Self {
            file,
            bindings: RwLock::new(loaded.bindings),
        })
    }

    async fn persist(&self) -> Result<()> {
        let bindings = self.bindings.read().await.clone();
        self.file.persist(BindingFile { bindings }).await
    }
}

#[async_trait]
impl BindingStore for FileBindingStore {
    async fn get(&self, ad_id: &str, platform: Platform) -> Result<Option<PlatformBinding>> {
        let bindings = self.bindings.read().await;
        Ok(bindings.get(ad_id).and_then(|m| m.get(&platform)).cloned())
    }

    async fn upsert(&self, binding: &PlatformBinding) -> Result<()> {
        {
            let mut bindings = self.bindings.write().await;
            bindings
                .entry(binding.ad_id.clone())
                .or_default()
                .insert(binding.platform, binding.clone());
        }
        self.persist().await
    }

    async fn list_for_ad(&self, ad_id: &str) -> Result<Vec<PlatformBinding>> {
        let bindings = self.bindings.read().await;
        Ok(bindings
            .get(ad_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn archive(&self, ad_id: &str, platform: Platform) -> Result<bool> {
        let found = {
            let mut bindings = self.bindings.write().await;
            match bindings.get_mut(ad_id).and_then(|m| m.get_mut(&platform)) {
                Some(binding) => {
                    binding.archived = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    async fn flush(&self) -> Result<()> {
        // Written through on every mutation
        Ok(())
    }
}

/// File-based credential store with crash recovery
///
/// Refreshed tokens written back by the credential cache land on disk before
/// `save` returns.
#[derive(Debug)]
pub struct FileCredentialStore {
    file: StoreFile,
    credentials: RwLock<HashMap<CredentialKey, Credential>>,
}

impl FileCredentialStore {
    /// Create or load a file credential store
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = StoreFile::open(path.as_ref(), "credentials", true).await?;
        let loaded: CredentialFile = file.load_with_recovery().await?;
        tracing::debug!(count = loaded.credentials.len(), "Loaded credentials from file");

        Ok(Self {
            file,
            credentials: RwLock::new(
                loaded
                    .credentials
                    .into_iter()
                    .map(|c| (c.key(), c))
                    .collect(),
            ),
        })
    }

    /// Store `credential` unless one is already stored for its key
    ///
    /// # Returns
    ///
    /// Whether the credential was stored
    pub async fn seed(&self, credential: &Credential) -> Result<bool> {
        {
            let mut credentials = self.credentials.write().await;
            if credentials.contains_key(&credential.key()) {
                return Ok(false);
            }
            credentials.insert(credential.key(), credential.clone());
        }
        self.persist().await?;
        Ok(true)
    }

    async fn persist(&self) -> Result<()> {
        let mut credentials: Vec<_> = self.credentials.read().await.values().cloned().collect();
        credentials.sort_by_key(Credential::key);
        self.file.persist(CredentialFile { credentials }).await
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, key: &CredentialKey) -> Result<Option<Credential>> {
        Ok(self.credentials.read().await.get(key).cloned())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(credential.key(), credential.clone());
        self.persist().await
    }

    async fn remove(&self, key: &CredentialKey) -> Result<()> {
        let removed = self.credentials.write().await.remove(key).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetStatus;
    use chrono::Utc;
    use tempfile::tempdir;

    fn deployed(ad_id: &str, platform: Platform, native_id: &str) -> PlatformBinding {
        let mut binding = PlatformBinding::new(ad_id, platform);
        binding.record_success(native_id, TargetStatus::Active, Some(vec![]), Utc::now());
        binding
    }

    fn credential(user: &str, platform: Platform, token: &str) -> Credential {
        Credential::new(
            &CredentialKey::new(user, platform),
            token,
            Some(format!("refresh-{}", user)),
            Utc::now() + chrono::Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let store = FileBindingStore::new(&path).await.unwrap();
        assert!(store.list_for_ad("ad-1").await.unwrap().is_empty());

        store
            .upsert(&deployed("ad-1", Platform::Google, "g-1"))
            .await
            .unwrap();
        store
            .upsert(&deployed("ad-1", Platform::Facebook, "fb-1"))
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = FileBindingStore::new(&path).await.unwrap();
        let binding = reopened.get("ad-1", Platform::Facebook).await.unwrap().unwrap();
        assert_eq!(binding.native_id.as_deref(), Some("fb-1"));
        assert_eq!(reopened.list_for_ad("ad-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_format_is_versioned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let store = FileBindingStore::new(&path).await.unwrap();
        store
            .upsert(&deployed("ad-1", Platform::Google, "g-1"))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["version"], STORE_FILE_VERSION);
        assert_eq!(raw["bindings"]["ad-1"]["google"]["native_id"], "g-1");
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let store = FileBindingStore::new(&path).await.unwrap();
        store
            .upsert(&deployed("ad-1", Platform::Google, "g-1"))
            .await
            .unwrap();
        // second write leaves the first state in the backup
        store
            .upsert(&deployed("ad-1", Platform::Google, "g-2"))
            .await
            .unwrap();
        assert!(StoreFile::backup_path(&path).exists());

        fs::write(&path, b"{ not json").await.unwrap();

        let recovered = FileBindingStore::new(&path).await.unwrap();
        let binding = recovered.get("ad-1", Platform::Google).await.unwrap().unwrap();
        assert_eq!(binding.native_id.as_deref(), Some("g-1"));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bindings.json");
        fs::write(&path, b"garbage").await.unwrap();

        let store = FileBindingStore::new(&path).await.unwrap();
        assert!(store.get("ad-1", Platform::Google).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_archive_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("bindings.json");

        let store = FileBindingStore::new(&path).await.unwrap();
        store
            .upsert(&deployed("ad-1", Platform::Google, "g-1"))
            .await
            .unwrap();
        assert!(store.archive("ad-1", Platform::Google).await.unwrap());
        assert!(!store.archive("ad-1", Platform::Facebook).await.unwrap());

        let reopened = FileBindingStore::new(&path).await.unwrap();
        assert!(reopened.get("ad-1", Platform::Google).await.unwrap().unwrap().archived);
    }

    #[tokio::test]
    async fn test_refreshed_credential_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let key = CredentialKey::new("user-1", Platform::Google);

        let store = FileCredentialStore::new(&path).await.unwrap();
        store
            .save(&credential("user-1", Platform::Google, "seed"))
            .await
            .unwrap();
        store
            .save(&credential("user-1", Platform::Google, "refreshed"))
            .await
            .unwrap();

        let reopened = FileCredentialStore::new(&path).await.unwrap();
        let stored = reopened.load(&key).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "refreshed");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-user-1"));
    }

    #[tokio::test]
    async fn test_seed_keeps_stored_credential() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let key = CredentialKey::new("user-1", Platform::Facebook);

        {
            let store = FileCredentialStore::new(&path).await.unwrap();
            assert!(store.seed(&credential("user-1", Platform::Facebook, "seed")).await.unwrap());
            store
                .save(&credential("user-1", Platform::Facebook, "refreshed"))
                .await
                .unwrap();
        }

        let restarted = FileCredentialStore::new(&path).await.unwrap();
        assert!(!restarted.seed(&credential("user-1", Platform::Facebook, "seed")).await.unwrap());
        assert_eq!(restarted.load(&key).await.unwrap().unwrap().access_token, "refreshed");
    }

    #[tokio::test]
    async fn test_removed_credential_stays_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let key = CredentialKey::new("user-1", Platform::Google);

        let store = FileCredentialStore::new(&path).await.unwrap();
        store
            .save(&credential("user-1", Platform::Google, "seed"))
            .await
            .unwrap();
        store.remove(&key).await.unwrap();

        let reopened = FileCredentialStore::new(&path).await.unwrap();
        assert!(reopened.load(&key).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credential_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(&path).await.unwrap();
        store
            .save(&credential("user-1", Platform::Google, "seed"))
            .await
            .unwrap();

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
