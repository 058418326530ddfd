// # Platform Binding
//
// Record linking a unified ad to the campaign realized on one platform.
//
// One binding exists per (ad, platform). It is created on the first attempted
// deployment, updated on every attempt, and soft-archived rather than deleted
// so history survives platform-side removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;
use super::ad::AdStatus;
use crate::error::{Error, ErrorKind};

/// Delivery status on a platform, normalized across platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Active,
    Paused,
    Archived,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetStatus::Active => write!(f, "active"),
            TargetStatus::Paused => write!(f, "paused"),
            TargetStatus::Archived => write!(f, "archived"),
        }
    }
}

impl From<AdStatus> for TargetStatus {
    /// Drafts are deployed paused so nothing delivers before launch
    fn from(status: AdStatus) -> Self {
        match status {
            AdStatus::Draft | AdStatus::Paused => TargetStatus::Paused,
            AdStatus::Active => TargetStatus::Active,
            AdStatus::Archived => TargetStatus::Archived,
        }
    }
}

/// An optional unified field a platform could not represent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DroppedField {
    /// Dotted path into the unified ad, e.g. `targeting.interests`
    pub path: String,
    /// Why it was dropped
    pub reason: String,
}

impl DroppedField {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Last failure recorded against a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Link between a unified ad and its native campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBinding {
    pub ad_id: String,
    pub platform: Platform,
    /// Native campaign id, once a create has succeeded
    pub native_id: Option<String>,
    /// Last status the platform confirmed
    pub native_status: Option<TargetStatus>,
    /// Last attempted sync, successful or not
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Last successful sync
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<BindingError>,
    /// Fields the platform could not represent at the last successful mapping
    #[serde(default)]
    pub dropped_fields: Vec<DroppedField>,
    /// Soft-deletion marker
    #[serde(default)]
    pub archived: bool,
    /// Native calls made by the last operation
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl PlatformBinding {
    /// Create an empty binding for an ad that has not been deployed yet
    pub fn new(ad_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            ad_id: ad_id.into(),
            platform,
            native_id: None,
            native_status: None,
            last_sync_at: None,
            last_success_at: None,
            last_error: None,
            dropped_fields: Vec::new(),
            archived: false,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether a native campaign exists for this binding
    pub fn is_deployed(&self) -> bool {
        self.native_id.is_some()
    }

    /// Record a successful platform operation
    pub fn record_success(
        &mut self,
        native_id: impl Into<String>,
        status: TargetStatus,
        dropped_fields: Option<Vec<DroppedField>>,
        at: DateTime<Utc>,
    ) {
        self.native_id = Some(native_id.into());
        self.native_status = Some(status);
        self.last_sync_at = Some(at);
        self.last_success_at = Some(at);
        self.last_error = None;
        if let Some(dropped) = dropped_fields {
            self.dropped_fields = dropped;
        }
    }

    /// Record a failed platform operation; native id and status are kept
    pub fn record_failure(&mut self, error: &Error, at: DateTime<Utc>) {
        self.last_sync_at = Some(at);
        self.last_error = Some(BindingError {
            kind: error.kind(),
            message: error.to_string(),
            at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_native_id() {
        let now = Utc::now();
        let mut binding = PlatformBinding::new("ad-1", Platform::Google);
        binding.record_success("g-1", TargetStatus::Active, Some(vec![]), now);
        binding.record_failure(&Error::network("reset"), now);

        assert_eq!(binding.native_id.as_deref(), Some("g-1"));
        assert_eq!(binding.native_status, Some(TargetStatus::Active));
        assert_eq!(binding.last_error.as_ref().unwrap().kind, ErrorKind::Network);
    }

    #[test]
    fn test_success_keeps_dropped_fields_when_not_remapped() {
        let now = Utc::now();
        let mut binding = PlatformBinding::new("ad-1", Platform::Facebook);
        let dropped = vec![DroppedField::new("targeting.keywords", "not supported")];
        binding.record_success("fb-1", TargetStatus::Active, Some(dropped.clone()), now);
        binding.record_success("fb-1", TargetStatus::Archived, None, now);

        assert_eq!(binding.dropped_fields, dropped);
        assert_eq!(binding.native_status, Some(TargetStatus::Archived));
        assert!(binding.is_deployed());
    }
}
