// # Memory Stores
//
// In-memory implementations of BindingStore, CredentialStore and
// MetricsStore.
//
// ## Crash Behavior
//
// - Everything is lost on restart
// - Without bindings the next sync of an ad creates new native campaigns,
//   so production deployments should pair these with `FileBindingStore` or a
//   database-backed binding store
// - Refreshed tokens are lost too; `FileCredentialStore` keeps them
//
// ## When to Use
//
// - Tests
// - Short-lived jobs that seed credentials at startup

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{
    Credential, CredentialKey, DateRange, MetricsRecord, Platform, PlatformBinding,
    ReconcileSummary,
};
use crate::traits::{BindingStore, CredentialStore, MetricsStore, Reconciled, reconcile_record};

/// In-memory binding store
///
/// # Example
///
/// ```rust,no_run
/// use adsync_core::model::{Platform, PlatformBinding};
/// use adsync_core::state::MemoryBindingStore;
/// use adsync_core::traits::BindingStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryBindingStore::new();
///     store.upsert(&PlatformBinding::new("ad-1", Platform::Google)).await?;
///
///     let binding = store.get("ad-1", Platform::Google).await?;
///     assert!(binding.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBindingStore {
    inner: Arc<RwLock<HashMap<(String, Platform), PlatformBinding>>>,
}

impl MemoryBindingStore {
    /// Create a new empty binding store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bindings in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn get(&self, ad_id: &str, platform: Platform) -> Result<Option<PlatformBinding>> {
        let guard = self.inner.read().await;
        Ok(guard.get(&(ad_id.to_string(), platform)).cloned())
    }

    async fn upsert(&self, binding: &PlatformBinding) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.insert((binding.ad_id.clone(), binding.platform), binding.clone());
        Ok(())
    }

    async fn list_for_ad(&self, ad_id: &str) -> Result<Vec<PlatformBinding>> {
        let guard = self.inner.read().await;
        let mut bindings: Vec<_> = guard
            .values()
            .filter(|b| b.ad_id == ad_id)
            .cloned()
            .collect();
        bindings.sort_by_key(|b| b.platform);
        Ok(bindings)
    }

    async fn archive(&self, ad_id: &str, platform: Platform) -> Result<bool> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&(ad_id.to_string(), platform)) {
            Some(binding) => {
                binding.archived = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn flush(&self) -> Result<()> {
        // Nothing buffered
        Ok(())
    }
}

/// In-memory credential store
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<RwLock<HashMap<CredentialKey, Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, key: &CredentialKey) -> Result<Option<Credential>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.insert(credential.key(), credential.clone());
        Ok(())
    }

    async fn remove(&self, key: &CredentialKey) -> Result<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

type MetricsKey = (String, Platform);

/// In-memory metrics store with per-day revisions
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsStore {
    inner: Arc<RwLock<HashMap<MetricsKey, BTreeMap<chrono::NaiveDate, MetricsRecord>>>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn upsert_versioned(&self, records: &[MetricsRecord]) -> Result<ReconcileSummary> {
        let mut guard = self.inner.write().await;
        let mut summary = ReconcileSummary::default();

        for record in records {
            let days = guard
                .entry((record.ad_id.clone(), record.platform))
                .or_default();
            match reconcile_record(days.get(&record.date), record.clone()) {
                Reconciled::Inserted(row) => {
                    summary.inserted += 1;
                    days.insert(row.date, row);
                }
                Reconciled::Revised(row) => {
                    summary.revised += 1;
                    days.insert(row.date, row);
                }
                Reconciled::Unchanged => summary.unchanged += 1,
            }
        }

        Ok(summary)
    }

    async fn list(
        &self,
        ad_id: &str,
        platform: Platform,
        range: &DateRange,
    ) -> Result<Vec<MetricsRecord>> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(&(ad_id.to_string(), platform))
            .map(|days| {
                days.range(range.start()..=range.end())
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
