//! Durable credential storage
//!
//! The credential cache keeps hot tokens in memory; this store is where
//! they come from on first use and where refreshed ones are written back.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Credential, CredentialKey};

/// Trait for credential store implementations
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential for a key, if any
    async fn load(&self, key: &CredentialKey) -> Result<Option<Credential>>;

    /// Store a credential, replacing any previous one for its key
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Forget the credential for a key
    async fn remove(&self, key: &CredentialKey) -> Result<()>;
}
