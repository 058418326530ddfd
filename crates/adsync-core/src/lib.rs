// # adsync-core
//
// Core library for the cross-platform campaign sync engine.
//
// ## Architecture Overview
//
// One unified ad is deployed to, updated on and measured across several
// advertising platforms:
// - **PlatformConnector / AdMapper**: traits each platform crate implements
// - **BindingStore**: persistent (ad, platform) → native campaign links (idempotency)
// - **CredentialCache**: per-(user, platform) tokens with coalesced refresh
// - **RateLimiter / CircuitBreaker / RetryHandler**: per-endpoint resilience
// - **SyncOrchestrator**: concurrent, independent fan-out across platforms
// - **ConnectorRegistry**: plugin-based registry for connectors
//
// ## Design Principles
//
// 1. **Independence**: one platform's failure never blocks another
// 2. **Plugin-Based**: connectors are registered dynamically, no platform if-else in the core
// 3. **Library-First**: everything the daemon does is available as a library
// 4. **Idempotency**: bindings make a re-sync an update, never a second create
// 5. **Single Classification**: failures are classified once, at the connector boundary

pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod resilience;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ConnectorConfig, SyncConfig};
pub use credentials::{CredentialCache, TokenRefresher};
pub use error::{Error, ErrorKind, Result, classify_http_status};
pub use orchestrator::{Stores, SyncEvent, SyncOrchestrator};
pub use registry::{ConnectorRegistry, ConnectorSet};
pub use state::{
    FileBindingStore, FileCredentialStore, MemoryBindingStore, MemoryCredentialStore,
    MemoryMetricsStore,
};
pub use traits::{
    AdMapper, BindingStore, ConnectorFactory, CredentialStore, MetricsStore, PlatformConnector,
};
