// # Binding Store Trait
//
// Persistent storage for platform bindings.
//
// The binding store is what makes syncs idempotent: a binding that already
// carries a native id turns the next sync into an update of that campaign
// instead of a second create.
//
// ## Implementations
//
// - `MemoryBindingStore`: in-process, lost on restart
// - `FileBindingStore`: JSON file with atomic writes and backup recovery

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Platform, PlatformBinding};

/// Trait for binding store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Bindings are never deleted; [`archive`](BindingStore::archive) marks them.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Get the binding for one (ad, platform)
    ///
    /// # Returns
    ///
    /// - `Ok(Some(binding))`: the binding
    /// - `Ok(None)`: the ad was never deployed to this platform
    /// - `Err(Error)`: storage error
    async fn get(&self, ad_id: &str, platform: Platform) -> Result<Option<PlatformBinding>>;

    /// Create or replace the binding for `(binding.ad_id, binding.platform)`
    async fn upsert(&self, binding: &PlatformBinding) -> Result<()>;

    /// Every binding of one ad, ordered by platform
    async fn list_for_ad(&self, ad_id: &str) -> Result<Vec<PlatformBinding>>;

    /// Soft-archive a binding
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: the binding existed and is now archived
    /// - `Ok(false)`: no such binding
    async fn archive(&self, ad_id: &str, platform: Platform) -> Result<bool>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;
}
