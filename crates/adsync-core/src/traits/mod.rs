//! Core traits for the adsync engine
//!
//! - [`PlatformConnector`] / [`AdMapper`]: talk to and translate for one platform
//! - [`BindingStore`]: persistent (ad, platform) bindings for idempotency
//! - [`CredentialStore`]: durable credential material
//! - [`MetricsStore`]: versioned daily metrics

pub mod binding_store;
pub mod connector;
pub mod credential_store;
pub mod metrics_store;

pub use binding_store::BindingStore;
pub use connector::{
    AdMapper, ConnectorFactory, MappedCampaign, NativeCampaign, PlatformConnector, merge_overrides,
};
pub use credential_store::CredentialStore;
pub use metrics_store::{MetricsStore, Reconciled, reconcile_record};
