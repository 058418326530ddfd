// # Platform Connector Trait
//
// Defines the interface for talking to one advertising platform.
//
// ## Implementations
//
// - Google Ads: `adsync-connector-google` crate
// - Facebook Marketing API: `adsync-connector-facebook` crate
//
// ## Usage
//
// ```rust,ignore
// use adsync_core::PlatformConnector;
//
// let mapped = connector.mapper().to_native(&ad)?;
// let native = connector.create_campaign(&token, &mapped).await?;
// println!("created {}", native.native_id);
// ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::ConnectorConfig;
use crate::error::Result;
use crate::model::{
    AccessToken, CanonicalFields, Credential, DateRange, DroppedField, MetricsRecord, Platform,
    TargetStatus, UnifiedAd,
};

/// A unified ad translated into one platform's native payload
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCampaign {
    /// Native request body, overrides already merged
    pub payload: Value,
    /// Optional unified fields the platform cannot represent
    pub dropped_fields: Vec<DroppedField>,
}

/// Reference to a campaign as the platform reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCampaign {
    /// Platform-assigned campaign id
    pub native_id: String,
    /// Delivery status the platform confirmed
    pub status: TargetStatus,
}

/// Pure translation between unified and native representations
///
/// Mapping is total for required fields: a missing or unrepresentable
/// required field is a Validation error. Optional fields a platform cannot
/// express are reported in [`MappedCampaign::dropped_fields`], never
/// silently discarded.
pub trait AdMapper: Send + Sync {
    /// Platform this mapper targets
    fn platform(&self) -> Platform;

    /// Translate a unified ad into a native create/update payload
    fn to_native(&self, ad: &UnifiedAd) -> Result<MappedCampaign>;

    /// Recover the platform-independent fields from a native payload
    fn from_native(&self, payload: &Value) -> Result<CanonicalFields>;

    /// Translate a native metrics report into unified daily records
    fn metrics_to_unified(&self, ad_id: &str, payload: &Value) -> Result<Vec<MetricsRecord>>;
}

/// Trait for platform connector implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// A connector makes exactly one native call per method invocation and
/// classifies any failure into an [`crate::ErrorKind`] before returning.
/// Retries, backoff, rate limiting and circuit breaking are owned by the
/// orchestrator; a connector must not sleep or loop.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// Platform this connector serves
    fn platform(&self) -> Platform;

    /// Mapper used to build payloads for this connector
    fn mapper(&self) -> &dyn AdMapper;

    /// Create a campaign from a mapped payload
    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &MappedCampaign,
    ) -> Result<NativeCampaign>;

    /// Update the campaign identified by `native_id`
    async fn update_campaign(
        &self,
        token: &AccessToken,
        native_id: &str,
        campaign: &MappedCampaign,
    ) -> Result<NativeCampaign>;

    /// Activate, pause or archive a campaign
    async fn set_status(
        &self,
        token: &AccessToken,
        native_id: &str,
        status: TargetStatus,
    ) -> Result<NativeCampaign>;

    /// Pull the raw native metrics report for a date range
    async fn fetch_metrics(
        &self,
        token: &AccessToken,
        native_id: &str,
        range: &DateRange,
    ) -> Result<Value>;

    /// Exchange a credential for a fresh one through the platform's refresh flow
    async fn refresh_credential(&self, previous: &Credential) -> Result<Credential>;
}

/// Helper trait for constructing connectors from configuration
pub trait ConnectorFactory: Send + Sync {
    /// Create a connector instance from configuration
    fn create(&self, config: &ConnectorConfig) -> Result<Arc<dyn PlatformConnector>>;
}

/// Merge `overrides` into `payload`, overrides winning
///
/// Nested objects merge key by key; any other value replaces what the
/// mapper produced.
pub fn merge_overrides(payload: &mut Value, overrides: Option<&Map<String, Value>>) {
    let Some(overrides) = overrides else {
        return;
    };
    let Value::Object(target) = payload else {
        *payload = Value::Object(overrides.clone());
        return;
    };
    merge_object(target, overrides);
}

fn merge_object(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_object(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
