//! API key lifecycle.
//!
//! [`CredentialManager`] owns the key used to sign every request. It loads a
//! persisted key for the active environment, checks its age, and renews it
//! through a [`KeyIssuer`] (the search client's authenticate call) when the
//! key is missing, too old, or rejected by the service.
//!
//! # Locking
//!
//! The state sits behind an async mutex held for the whole
//! check-load-renew sequence, so tasks sharing one manager renew at most once
//! per rejected key. Renewal after a 401 is keyed on the rejected value: if
//! the current or persisted key already differs from it, somebody else has
//! renewed and that key is adopted instead of issuing another.

mod store;

pub use store::{FileCredentialStore, MemoryCredentialStore};

use crate::config::Environment;
use crate::search::{AccountCredentials, SearchError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An issued API key and when it was issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "apikey")]
    pub api_key: String,
    #[serde(rename = "apikey_timestamp")]
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(api_key: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            api_key: api_key.into(),
            issued_at,
        }
    }

    /// Age of the key at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.issued_at)
    }

    #[must_use]
    pub fn is_expired(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > lifetime
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Errors from persisted credential storage.
#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file is malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HOME is not set; configure credentials_dir explicitly")]
    NoHomeDirectory,
}

/// Persisted credentials, keyed by environment.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, env: Environment) -> Result<Option<Credential>, CredentialStoreError>;

    async fn save(&self, env: Environment, credential: &Credential)
        -> Result<(), CredentialStoreError>;
}

/// Source of fresh API keys.
#[async_trait]
pub trait KeyIssuer: Send + Sync {
    /// Request a new key for `account`. `Ok(None)` means the service
    /// answered but issued no key.
    async fn issue_key(&self, account: &AccountCredentials) -> Result<Option<String>, SearchError>;

    /// Loggable description of where keys come from (never includes secrets).
    fn endpoint(&self) -> String;
}

/// Lifecycle state of the managed credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing loaded yet.
    Unloaded,
    /// A key believed to be accepted by the service.
    Valid(Credential),
    /// The last key was rejected or could not be renewed.
    Expired,
}

/// Owns the API key for one client.
pub struct CredentialManager {
    env: Environment,
    store: Arc<dyn CredentialStore>,
    account: Option<AccountCredentials>,
    lifetime: Duration,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    #[must_use]
    pub fn new(
        env: Environment,
        store: Arc<dyn CredentialStore>,
        account: Option<AccountCredentials>,
        lifetime: Duration,
    ) -> Self {
        Self {
            env,
            store,
            account,
            lifetime,
            state: Mutex::new(CredentialState::Unloaded),
        }
    }

    /// Start from a key supplied directly by the caller. The key is treated
    /// as issued now and is not persisted.
    #[must_use]
    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(CredentialState::Valid(Credential::new(api_key, Utc::now()))),
            ..self
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> CredentialState {
        self.state.lock().await.clone()
    }

    /// Record that the service rejected `rejected`. A different key already
    /// in place (renewed by another task) is left alone.
    pub async fn mark_expired(&self, rejected: &str) {
        let mut state = self.state.lock().await;
        if matches!(&*state, CredentialState::Valid(current) if current.api_key == rejected) {
            *state = CredentialState::Expired;
        }
    }

    /// Return a usable key, loading or renewing as needed.
    ///
    /// Without `force`, an in-memory or persisted key younger than the
    /// lifetime is reused. Otherwise a new key is issued and persisted.
    ///
    /// # Errors
    /// [`SearchError::AuthenticationFailure`] if renewal fails for any reason
    /// or no account is configured; [`SearchError::CredentialStore`] if the
    /// new key cannot be persisted.
    pub async fn ensure_valid(
        &self,
        force: bool,
        issuer: &dyn KeyIssuer,
    ) -> Result<String, SearchError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if !force {
            if let CredentialState::Valid(credential) = &*state {
                if !credential.is_expired(self.lifetime, now) {
                    return Ok(credential.api_key.clone());
                }
            }
            if let Some(credential) = self.load_fresh(now, None).await {
                tracing::debug!(env = %self.env, "Using persisted API key");
                let api_key = credential.api_key.clone();
                *state = CredentialState::Valid(credential);
                return Ok(api_key);
            }
        }

        self.renew(&mut state, issuer).await
    }

    /// Replace a key the service rejected.
    ///
    /// If the in-memory or persisted key is already different from
    /// `rejected` and still fresh, it is adopted without issuing a new one.
    ///
    /// # Errors
    /// As [`CredentialManager::ensure_valid`].
    pub async fn renew_rejected(
        &self,
        rejected: &str,
        issuer: &dyn KeyIssuer,
    ) -> Result<String, SearchError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let CredentialState::Valid(credential) = &*state {
            if credential.api_key != rejected && !credential.is_expired(self.lifetime, now) {
                tracing::debug!(env = %self.env, "API key already renewed");
                return Ok(credential.api_key.clone());
            }
        }
        if let Some(credential) = self.load_fresh(now, Some(rejected)).await {
            tracing::info!(env = %self.env, "Adopting API key renewed elsewhere");
            let api_key = credential.api_key.clone();
            *state = CredentialState::Valid(credential);
            return Ok(api_key);
        }

        self.renew(&mut state, issuer).await
    }

    /// Persisted credential if present, fresh, and not `rejected`.
    async fn load_fresh(&self, now: DateTime<Utc>, rejected: Option<&str>) -> Option<Credential> {
        match self.store.load(self.env).await {
            Ok(Some(credential)) if credential.is_expired(self.lifetime, now) => {
                tracing::info!(env = %self.env, "Persisted API key is past its lifetime");
                None
            }
            Ok(Some(credential)) if Some(credential.api_key.as_str()) == rejected => None,
            Ok(Some(credential)) => Some(credential),
            Ok(None) => {
                tracing::debug!(env = %self.env, "No persisted API key");
                None
            }
            Err(err) => {
                tracing::warn!(env = %self.env, error = %err, "Failed to load persisted API key");
                None
            }
        }
    }

    async fn renew(
        &self,
        state: &mut CredentialState,
        issuer: &dyn KeyIssuer,
    ) -> Result<String, SearchError> {
        let Some(account) = &self.account else {
            tracing::warn!(env = %self.env, "API key needs renewal but no account is configured");
            *state = CredentialState::Expired;
            return Err(SearchError::AuthenticationFailure {
                path: issuer.endpoint(),
            });
        };

        tracing::info!(env = %self.env, username = %account.username, "Generating new API key");
        let issued = match issuer.issue_key(account).await {
            Ok(Some(api_key)) => api_key,
            Ok(None) => {
                tracing::warn!(env = %self.env, "Authentication failed, giving up");
                *state = CredentialState::Expired;
                return Err(SearchError::AuthenticationFailure {
                    path: issuer.endpoint(),
                });
            }
            Err(err) => {
                tracing::warn!(env = %self.env, error = %err, "Authenticate request failed, giving up");
                *state = CredentialState::Expired;
                return Err(SearchError::AuthenticationFailure {
                    path: issuer.endpoint(),
                });
            }
        };

        let credential = Credential::new(issued, Utc::now());
        self.store.save(self.env, &credential).await?;
        let api_key = credential.api_key.clone();
        *state = CredentialState::Valid(credential);
        Ok(api_key)
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("env", &self.env)
            .field("account", &self.account)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Outcome {
        Grant,
        Refuse,
        Fail,
    }

    /// Issues `key-1`, `key-2`, ..., nothing, or a server error.
    struct CountingIssuer {
        calls: AtomicUsize,
        outcome: Outcome,
    }

    impl CountingIssuer {
        fn with(outcome: Outcome) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
            }
        }

        fn granting() -> Self {
            Self::with(Outcome::Grant)
        }

        fn refusing() -> Self {
            Self::with(Outcome::Refuse)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeyIssuer for CountingIssuer {
        async fn issue_key(
            &self,
            _account: &AccountCredentials,
        ) -> Result<Option<String>, SearchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.outcome {
                Outcome::Grant => Ok(Some(format!("key-{n}"))),
                Outcome::Refuse => Ok(None),
                Outcome::Fail => Err(SearchError::TransportFailure {
                    status: 500,
                    body: "auth down".into(),
                    path: self.endpoint(),
                }),
            }
        }

        fn endpoint(&self) -> String {
            "/searchapi/authenticate".to_string()
        }
    }

    fn account() -> AccountCredentials {
        AccountCredentials {
            username: "analyst".into(),
            password: "hunter2".into(),
            app: "tests".into(),
        }
    }

    fn manager(store: Arc<MemoryCredentialStore>) -> CredentialManager {
        CredentialManager::new(Environment::Test, store, Some(account()), Duration::hours(72))
    }

    #[tokio::test]
    async fn starts_unloaded() {
        let manager = manager(Arc::new(MemoryCredentialStore::new()));
        assert_eq!(manager.state().await, CredentialState::Unloaded);
    }

    #[tokio::test]
    async fn fresh_persisted_key_is_reused_without_renewal() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(
            Environment::Test,
            Credential::new("persisted", Utc::now() - Duration::hours(1)),
        );
        let manager = manager(store.clone());
        let issuer = CountingIssuer::granting();

        let key = manager.ensure_valid(false, &issuer).await.unwrap();

        assert_eq!(key, "persisted");
        assert_eq!(issuer.calls(), 0);
        assert_eq!(store.save_count(), 0);
        assert!(matches!(manager.state().await, CredentialState::Valid(_)));
    }

    #[tokio::test]
    async fn old_persisted_key_is_renewed_and_saved() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(
            Environment::Test,
            Credential::new("stale", Utc::now() - Duration::hours(73)),
        );
        let manager = manager(store.clone());
        let issuer = CountingIssuer::granting();

        let key = manager.ensure_valid(false, &issuer).await.unwrap();

        assert_eq!(key, "key-1");
        assert_eq!(issuer.calls(), 1);
        let saved = store.get(Environment::Test).expect("saved");
        assert_eq!(saved.api_key, "key-1");
        assert!(saved.age(Utc::now()) < Duration::minutes(1));
    }

    #[tokio::test]
    async fn missing_key_is_renewed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let manager = manager(store.clone());
        let issuer = CountingIssuer::granting();

        assert_eq!(manager.ensure_valid(false, &issuer).await.unwrap(), "key-1");
        // Second call reuses the in-memory key
        assert_eq!(manager.ensure_valid(false, &issuer).await.unwrap(), "key-1");
        assert_eq!(issuer.calls(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn force_always_renews() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(Environment::Test, Credential::new("persisted", Utc::now()));
        let manager = manager(store);
        let issuer = CountingIssuer::granting();

        assert_eq!(manager.ensure_valid(true, &issuer).await.unwrap(), "key-1");
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn refused_renewal_is_authentication_failure() {
        let manager = manager(Arc::new(MemoryCredentialStore::new()));
        let issuer = CountingIssuer::refusing();

        let result = manager.ensure_valid(false, &issuer).await;

        assert!(matches!(
            result,
            Err(SearchError::AuthenticationFailure { ref path }) if path == "/searchapi/authenticate"
        ));
        assert_eq!(manager.state().await, CredentialState::Expired);
    }

    #[tokio::test]
    async fn failing_authenticate_is_authentication_failure() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(Environment::Test, Credential::new("old", Utc::now()));
        let manager = manager(store.clone());
        let issuer = CountingIssuer::with(Outcome::Fail);
        manager.ensure_valid(false, &issuer).await.unwrap();

        let result = manager.renew_rejected("old", &issuer).await;

        assert!(matches!(
            result,
            Err(SearchError::AuthenticationFailure { ref path }) if path == "/searchapi/authenticate"
        ));
        assert_eq!(issuer.calls(), 1);
        assert_eq!(manager.state().await, CredentialState::Expired);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn renewal_without_account_fails() {
        let manager = CredentialManager::new(
            Environment::Prod,
            Arc::new(MemoryCredentialStore::new()),
            None,
            Duration::hours(72),
        )
        .with_api_key("configured");
        let issuer = CountingIssuer::granting();

        assert_eq!(manager.ensure_valid(false, &issuer).await.unwrap(), "configured");
        let result = manager.renew_rejected("configured", &issuer).await;
        assert!(matches!(result, Err(SearchError::AuthenticationFailure { .. })));
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test]
    async fn renew_rejected_issues_once_for_the_same_rejected_key() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(Environment::Test, Credential::new("old", Utc::now()));
        let manager = manager(store);
        let issuer = CountingIssuer::granting();
        assert_eq!(manager.ensure_valid(false, &issuer).await.unwrap(), "old");

        // Two callers saw the same 401 for "old"
        let first = manager.renew_rejected("old", &issuer).await.unwrap();
        let second = manager.renew_rejected("old", &issuer).await.unwrap();

        assert_eq!(first, "key-1");
        assert_eq!(second, "key-1");
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_renewals_of_one_rejected_key_issue_once() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(Environment::Test, Credential::new("old", Utc::now()));
        let manager = manager(store.clone());
        let issuer = CountingIssuer::granting();
        assert_eq!(manager.ensure_valid(false, &issuer).await.unwrap(), "old");

        let (first, second) = tokio::join!(
            manager.renew_rejected("old", &issuer),
            manager.renew_rejected("old", &issuer),
        );

        assert_eq!(first.unwrap(), "key-1");
        assert_eq!(second.unwrap(), "key-1");
        assert_eq!(issuer.calls(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn renew_rejected_adopts_key_persisted_by_another_process() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(Environment::Test, Credential::new("old", Utc::now()));
        let manager = manager(store.clone());
        let issuer = CountingIssuer::granting();
        manager.ensure_valid(false, &issuer).await.unwrap();

        store.insert(Environment::Test, Credential::new("from-elsewhere", Utc::now()));
        let key = manager.renew_rejected("old", &issuer).await.unwrap();

        assert_eq!(key, "from-elsewhere");
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test]
    async fn mark_expired_only_affects_the_rejected_key() {
        let manager = manager(Arc::new(MemoryCredentialStore::new()));
        manager.mark_expired("k").await;
        assert_eq!(manager.state().await, CredentialState::Unloaded);

        let manager = manager.with_api_key("k");
        manager.mark_expired("other").await;
        assert!(matches!(manager.state().await, CredentialState::Valid(_)));

        manager.mark_expired("k").await;
        assert_eq!(manager.state().await, CredentialState::Expired);
    }

    #[test]
    fn credential_debug_redacts_key() {
        let credential = Credential::new("super-secret", Utc::now());
        assert!(!format!("{credential:?}").contains("super-secret"));
    }

    #[test]
    fn credential_expiry_boundary() {
        let now = Utc::now();
        let lifetime = Duration::hours(72);
        assert!(!Credential::new("k", now - Duration::hours(72)).is_expired(lifetime, now));
        assert!(Credential::new("k", now - Duration::hours(72) - Duration::seconds(1))
            .is_expired(lifetime, now));
    }
}
