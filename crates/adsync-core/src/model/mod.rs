//! Platform-agnostic data model
//!
//! - [`UnifiedAd`]: the canonical advertisement handed to the orchestrator
//! - [`PlatformBinding`]: link between a unified ad and its native campaign
//! - [`Credential`]: per-(user, platform) access token material
//! - [`DeploymentResult`] / [`SyncResult`]: immutable outcomes of a sync

pub mod ad;
pub mod binding;
pub mod credential;
pub mod money;
pub mod outcome;

pub use ad::{
    AdStatus, AgeRange, AssetKind, AssetRef, BudgetPeriod, BudgetSpec, CallToAction,
    CanonicalFields, Creative, Gender, ScheduleSpec, TargetingSpec, UnifiedAd,
};
pub use binding::{BindingError, DroppedField, PlatformBinding, TargetStatus};
pub use credential::{AccessToken, Credential, CredentialKey};
pub use money::{Money, currency_minor_digits};
pub use outcome::{
    DateRange, DeploymentOutcome, DeploymentResult, MetricsRecord, MetricsReport,
    ReconcileSummary, SyncResult,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External advertising platform
///
/// New platforms are added as a variant plus a connector crate; the
/// orchestrator dispatches on this tag and needs no changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Google Ads
    Google,
    /// Facebook / Meta Marketing API
    Facebook,
}

impl Platform {
    /// Every supported platform
    pub const ALL: [Platform; 2] = [Platform::Google, Platform::Facebook];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Google => "google",
            Platform::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Platform::Google),
            "facebook" | "meta" => Ok(Platform::Facebook),
            other => Err(crate::Error::config(format!("Unknown platform: {}", other))),
        }
    }
}

/// Platform API surface that carries its own quota and failure state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Campaign create/update/status mutations
    Campaigns,
    /// Performance reporting
    Reporting,
}

impl Endpoint {
    /// Every endpoint with its own budget and circuit
    pub const ALL: [Endpoint; 2] = [Endpoint::Campaigns, Endpoint::Reporting];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Campaigns => "campaigns",
            Endpoint::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single connector capability invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// First deployment of an ad
    Create,
    /// Update keyed by an existing native id
    Update,
    /// Activate, pause or archive
    SetStatus,
    /// Pull performance metrics
    FetchMetrics,
}

impl Operation {
    /// Endpoint whose rate budget and circuit this operation uses
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Operation::Create | Operation::Update | Operation::SetStatus => Endpoint::Campaigns,
            Operation::FetchMetrics => Endpoint::Reporting,
        }
    }

    /// Whether repeating the call after an unknown outcome is harmless
    ///
    /// Only a create mints a new native object on every call.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Operation::Create)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::SetStatus => "set_status",
            Operation::FetchMetrics => "fetch_metrics",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_create_is_not_idempotent() {
        assert!(!Operation::Create.is_idempotent());
        assert!(Operation::Update.is_idempotent());
        assert!(Operation::SetStatus.is_idempotent());
        assert!(Operation::FetchMetrics.is_idempotent());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Google".parse::<Platform>().unwrap(), Platform::Google);
        assert_eq!("meta".parse::<Platform>().unwrap(), Platform::Facebook);
        assert!("tiktok".parse::<Platform>().is_err());
    }

    #[test]
    fn test_operation_endpoints() {
        assert_eq!(Operation::Create.endpoint(), Endpoint::Campaigns);
        assert_eq!(Operation::SetStatus.endpoint(), Endpoint::Campaigns);
        assert_eq!(Operation::FetchMetrics.endpoint(), Endpoint::Reporting);
    }
}
