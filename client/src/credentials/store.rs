//! Credential store implementations.

use super::{Credential, CredentialStore, CredentialStoreError};
use crate::config::Environment;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const DEFAULT_DIR: &str = ".infogroup";

/// One JSON file per environment: `{dir}/config.{env}.json`.
///
/// Saves write a sibling temp file and rename it into place, so a concurrent
/// reader sees either the old key or the new one.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `$HOME/.infogroup`.
    ///
    /// # Errors
    /// [`CredentialStoreError::NoHomeDirectory`] if `HOME` is unset or empty.
    pub fn in_home() -> Result<Self, CredentialStoreError> {
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or(CredentialStoreError::NoHomeDirectory)?;
        Ok(Self::new(Path::new(&home).join(DEFAULT_DIR)))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, env: Environment) -> PathBuf {
        self.dir.join(format!("config.{env}.json"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, env: Environment) -> Result<Option<Credential>, CredentialStoreError> {
        let path = self.path_for(env);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(
        &self,
        env: Environment,
        credential: &Credential,
    ) -> Result<(), CredentialStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(env);
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(credential)?).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), "Persisted API key");
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// In-memory store for tests and for embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<Environment, Credential>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a credential without counting it as a save.
    pub fn insert(&self, env: Environment, credential: Credential) {
        if let Ok(mut map) = self.credentials.lock() {
            map.insert(env, credential);
        }
    }

    #[must_use]
    pub fn get(&self, env: Environment) -> Option<Credential> {
        self.credentials
            .lock()
            .ok()
            .and_then(|map| map.get(&env).cloned())
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, env: Environment) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self.get(env))
    }

    async fn save(
        &self,
        env: Environment,
        credential: &Credential,
    ) -> Result<(), CredentialStoreError> {
        self.insert(env, credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
