//! Credential cache with coalesced refresh
//!
//! `get_access_token` serves a cached token while it is valid and not about
//! to expire. Otherwise it loads the credential from the [`CredentialStore`]
//! and, if that is stale too, runs the platform's refresh flow.
//!
//! Concurrent callers for the same (user, platform) share one in-flight
//! load/refresh: the first caller installs a shared future, the others
//! await a clone of it. Each in-flight future carries a generation number
//! so a revoke or a newer refresh is never overwritten by a stale result.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{AccessToken, Credential, CredentialKey, Platform};
use crate::traits::CredentialStore;

/// Runs a platform's token refresh flow
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `previous` for a fresh credential
    async fn refresh(&self, previous: &Credential) -> Result<Credential>;
}

type SharedLoad = Shared<BoxFuture<'static, Result<Credential>>>;

#[derive(Default)]
struct Entry {
    current: Option<Credential>,
    in_flight: Option<(u64, SharedLoad)>,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    margin: chrono::Duration,
    entries: Mutex<HashMap<CredentialKey, Entry>>,
    generation: AtomicU64,
}

/// Per-(user, platform) access token cache
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("margin", &self.inner.margin)
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    /// Create a cache over `store`, refreshing through `refresher`
    ///
    /// Tokens expiring within `margin` are treated as expired.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        margin: chrono::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                margin,
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<CredentialKey, Entry>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| Error::Other("credential cache lock poisoned".to_string()))
    }

    /// Get a usable access token for `(user_id, platform)`
    ///
    /// # Returns
    ///
    /// - `Ok(token)`: a token valid beyond the safety margin
    /// - `Err(Error::Authentication)`: no credential stored, or refresh rejected
    /// - `Err(_)`: store or transport failure during load/refresh
    pub async fn get_access_token(&self, user_id: &str, platform: Platform) -> Result<AccessToken> {
        let key = CredentialKey::new(user_id, platform);

        let pending = {
            let mut entries = self.entries()?;
            let entry = entries.entry(key.clone()).or_default();

            if let Some(current) = &entry.current
                && current.is_usable(Utc::now(), self.inner.margin)
            {
                return Ok(current.token());
            }

            match &entry.in_flight {
                Some((_, pending)) => {
                    debug!(key = %key, "Joining in-flight credential refresh");
                    pending.clone()
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let pending = load_or_refresh(
                        self.inner.clone(),
                        key.clone(),
                        entry.current.clone(),
                        generation,
                    )
                    .boxed()
                    .shared();
                    entry.in_flight = Some((generation, pending.clone()));
                    pending
                }
            }
        };

        pending.await.map(|credential| credential.token())
    }

    /// Mark the cached credential invalid so the next call refreshes it
    pub fn invalidate(&self, user_id: &str, platform: Platform) -> Result<()> {
        let key = CredentialKey::new(user_id, platform);
        let mut entries = self.entries()?;
        if let Some(current) = entries.get_mut(&key).and_then(|e| e.current.as_mut()) {
            debug!(key = %key, "Credential invalidated");
            current.valid = false;
        }
        Ok(())
    }

    /// Invalidate only if `rejected` is still the cached token
    ///
    /// Several calls rejected with the same stale token then trigger one
    /// refresh between them, not one each.
    pub fn invalidate_token(
        &self,
        user_id: &str,
        platform: Platform,
        rejected: &AccessToken,
    ) -> Result<()> {
        let key = CredentialKey::new(user_id, platform);
        let mut entries = self.entries()?;
        if let Some(current) = entries.get_mut(&key).and_then(|e| e.current.as_mut())
            && current.access_token == rejected.secret()
        {
            debug!(key = %key, "Rejected credential invalidated");
            current.valid = false;
        }
        Ok(())
    }

    /// Drop a credential from the cache and the store
    ///
    /// Any refresh still in flight for the key completes for its current
    /// waiters but is not installed.
    pub async fn revoke(&self, user_id: &str, platform: Platform) -> Result<()> {
        let key = CredentialKey::new(user_id, platform);
        self.entries()?.remove(&key);
        self.inner.store.remove(&key).await?;
        info!(key = %key, "Credential revoked");
        Ok(())
    }

    /// Whether a usable credential is currently cached
    pub fn is_cached(&self, user_id: &str, platform: Platform) -> bool {
        let key = CredentialKey::new(user_id, platform);
        self.entries()
            .ok()
            .and_then(|entries| {
                entries
                    .get(&key)
                    .and_then(|e| e.current.as_ref())
                    .map(|c| c.is_usable(Utc::now(), self.inner.margin))
            })
            .unwrap_or(false)
    }
}

async fn load_or_refresh(
    inner: Arc<Inner>,
    key: CredentialKey,
    cached: Option<Credential>,
    generation: u64,
) -> Result<Credential> {
    let result = resolve(&inner, &key, cached).await;

    let installed = {
        let Ok(mut entries) = inner.entries.lock() else {
            return Err(Error::Other("credential cache lock poisoned".to_string()));
        };
        let entry = entries.entry(key.clone()).or_default();
        let owns_slot = matches!(&entry.in_flight, Some((g, _)) if *g == generation);
        if owns_slot {
            entry.in_flight = None;
            if let Ok((credential, _)) = &result {
                entry.current = Some(credential.clone());
            }
        }
        owns_slot
    };

    let (credential, refreshed) = result?;
    if installed && refreshed {
        if let Err(e) = inner.store.save(&credential).await {
            warn!(key = %key, "Refreshed credential could not be persisted: {}", e);
        }
    }
    Ok(credential)
}

/// Produce a usable credential and whether it came from a refresh
async fn resolve(
    inner: &Inner,
    key: &CredentialKey,
    cached: Option<Credential>,
) -> Result<(Credential, bool)> {
    let previous = match cached {
        Some(credential) => credential,
        None => match inner.store.load(key).await? {
            Some(stored) => {
                if stored.is_usable(Utc::now(), inner.margin) {
                    debug!(key = %key, "Credential loaded from store");
                    return Ok((stored, false));
                }
                stored
            }
            None => {
                return Err(Error::auth(format!("no credential stored for {}", key)));
            }
        },
    };

    info!(key = %key, expires_at = %previous.expires_at, "Refreshing credential");
    let mut fresh = inner.refresher.refresh(&previous).await?;
    fresh.user_id = key.user_id.clone();
    fresh.platform = key.platform;
    fresh.valid = true;
    if fresh.refresh_token.is_none() {
        fresh.refresh_token = previous.refresh_token;
    }
    if !fresh.is_usable(Utc::now(), inner.margin) {
        warn!(key = %key, expires_at = %fresh.expires_at, "Refreshed credential expires within the safety margin");
    }
    Ok((fresh, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryCredentialStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRefresher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, previous: &Credential) -> Result<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(Error::auth("refresh token revoked"));
            }
            Ok(Credential::new(
                &previous.key(),
                format!("fresh-{}", n),
                None,
                Utc::now() + chrono::Duration::hours(1),
            ))
        }
    }

    fn key() -> CredentialKey {
        CredentialKey::new("user-1", Platform::Google)
    }

    async fn store_with(expires_in: chrono::Duration) -> Arc<MemoryCredentialStore> {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save(&Credential::new(
                &key(),
                "stored",
                Some("refresh-secret".to_string()),
                Utc::now() + expires_in,
            ))
            .await
            .unwrap();
        store
    }

    fn cache(store: Arc<MemoryCredentialStore>, refresher: Arc<CountingRefresher>) -> CredentialCache {
        CredentialCache::new(store, refresher, chrono::Duration::seconds(60))
    }

    #[tokio::test]
    async fn test_valid_stored_credential_is_served_without_refresh() {
        let store = store_with(chrono::Duration::hours(1)).await;
        let refresher = CountingRefresher::new();
        let cache = cache(store, refresher.clone());

        let token = cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(token.secret(), "stored");
        assert!(cache.is_cached("user-1", Platform::Google));

        let again = cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(again.secret(), "stored");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_near_expiry_refreshes_and_persists() {
        let store = store_with(chrono::Duration::seconds(30)).await;
        let refresher = CountingRefresher::new();
        let cache = cache(store.clone(), refresher.clone());

        let token = cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(token.secret(), "fresh-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let persisted = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(persisted.access_token, "fresh-1");
        // refresh token carried over when the platform does not rotate it
        assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-secret"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let store = store_with(chrono::Duration::seconds(-10)).await;
        let refresher = CountingRefresher::new();
        let cache = cache(store, refresher.clone());

        let callers = (0..10).map(|_| {
            let cache = cache.clone();
            async move { cache.get_access_token("user-1", Platform::Google).await }
        });
        let tokens = futures::future::join_all(callers).await;

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        for token in tokens {
            assert_eq!(token.unwrap().secret(), "fresh-1");
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_reaches_every_waiter_and_is_not_cached() {
        let store = store_with(chrono::Duration::seconds(-10)).await;
        let refresher = CountingRefresher::failing();
        let cache = cache(store, refresher.clone());

        let callers = (0..3).map(|_| {
            let cache = cache.clone();
            async move { cache.get_access_token("user-1", Platform::Google).await }
        });
        for result in futures::future::join_all(callers).await {
            assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::Authentication);
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        // the failed attempt left no in-flight slot behind
        let _ = cache.get_access_token("user-1", Platform::Google).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_is_authentication_error() {
        let store = Arc::new(MemoryCredentialStore::new());
        let cache = cache(store, CountingRefresher::new());

        let err = cache
            .get_access_token("nobody", Platform::Facebook)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let store = store_with(chrono::Duration::hours(1)).await;
        let refresher = CountingRefresher::new();
        let cache = cache(store, refresher.clone());

        let stale = cache.get_access_token("user-1", Platform::Google).await.unwrap();

        cache.invalidate_token("user-1", Platform::Google, &stale).unwrap();
        let fresh = cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(fresh.secret(), "fresh-1");

        // a late report for the old token does not cause a second refresh
        cache.invalidate_token("user-1", Platform::Google, &stale).unwrap();
        cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        cache.invalidate("user-1", Platform::Google).unwrap();
        cache.get_access_token("user-1", Platform::Google).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revoke_removes_everywhere() {
        let store = store_with(chrono::Duration::hours(1)).await;
        let cache = cache(store.clone(), CountingRefresher::new());
        cache.get_access_token("user-1", Platform::Google).await.unwrap();

        cache.revoke("user-1", Platform::Google).await.unwrap();

        assert!(!cache.is_cached("user-1", Platform::Google));
        assert!(store.load(&key()).await.unwrap().is_none());
        assert!(cache.get_access_token("user-1", Platform::Google).await.is_err());
    }
}
