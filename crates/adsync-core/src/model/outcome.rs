//! Sync and metrics outcomes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::binding::{DroppedField, TargetStatus};
use super::money::Money;
use super::{Operation, Platform};
use crate::error::{Error, ErrorKind, Result};

/// Outcome of one platform operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    /// The platform settled the operation
    Deployed {
        native_id: String,
        status: TargetStatus,
        dropped_fields: Vec<DroppedField>,
    },
    /// The operation failed after the retry policy was exhausted
    Failed { kind: ErrorKind, message: String },
}

/// Immutable result of one platform operation within a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    platform: Platform,
    operation: Operation,
    outcome: DeploymentOutcome,
    attempts: u32,
    elapsed: Duration,
}

impl DeploymentResult {
    pub(crate) fn deployed(
        platform: Platform,
        operation: Operation,
        native_id: String,
        status: TargetStatus,
        dropped_fields: Vec<DroppedField>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            platform,
            operation,
            outcome: DeploymentOutcome::Deployed {
                native_id,
                status,
                dropped_fields,
            },
            attempts,
            elapsed,
        }
    }

    pub(crate) fn failed(
        platform: Platform,
        operation: Operation,
        error: &Error,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            platform,
            operation,
            outcome: DeploymentOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
            attempts,
            elapsed,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn outcome(&self) -> &DeploymentOutcome {
        &self.outcome
    }

    /// Number of native calls attempted (0 when rejected before any call)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeploymentOutcome::Deployed { .. })
    }

    pub fn native_id(&self) -> Option<&str> {
        match &self.outcome {
            DeploymentOutcome::Deployed { native_id, .. } => Some(native_id),
            DeploymentOutcome::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            DeploymentOutcome::Failed { kind, .. } => Some(*kind),
            DeploymentOutcome::Deployed { .. } => None,
        }
    }

    pub fn dropped_fields(&self) -> &[DroppedField] {
        match &self.outcome {
            DeploymentOutcome::Deployed { dropped_fields, .. } => dropped_fields,
            DeploymentOutcome::Failed { .. } => &[],
        }
    }
}

/// Aggregated per-platform outcomes for one ad
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    ad_id: String,
    results: Vec<DeploymentResult>,
}

impl SyncResult {
    pub(crate) fn new(ad_id: impl Into<String>, mut results: Vec<DeploymentResult>) -> Self {
        results.sort_by_key(|r| r.platform);
        Self {
            ad_id: ad_id.into(),
            results,
        }
    }

    pub fn ad_id(&self) -> &str {
        &self.ad_id
    }

    /// Every targeted platform's outcome
    pub fn results(&self) -> &[DeploymentResult] {
        &self.results
    }

    /// Outcome for one platform
    pub fn get(&self, platform: Platform) -> Option<&DeploymentResult> {
        self.results.iter().find(|r| r.platform == platform)
    }

    /// At least one platform settled
    pub fn is_success(&self) -> bool {
        self.results.iter().any(DeploymentResult::is_success)
    }

    /// Every platform settled
    pub fn is_complete(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(DeploymentResult::is_success)
    }

    pub fn successes(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::validation(format!(
                "date range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// A single day
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days in the range
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Daily performance of one ad on one platform, in unified units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub ad_id: String,
    pub platform: Platform,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: Money,
    /// Platforms report fractional (modelled) conversions
    pub conversions: f64,
    /// Bumped every time the platform corrects this day retroactively
    #[serde(default)]
    pub revision: u32,
    pub fetched_at: DateTime<Utc>,
}

impl MetricsRecord {
    /// Whether the platform-reported values are identical
    pub fn same_values(&self, other: &MetricsRecord) -> bool {
        self.impressions == other.impressions
            && self.clicks == other.clicks
            && self.spend == other.spend
            && self.conversions == other.conversions
    }
}

/// Counts of what a metrics reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub revised: usize,
    pub unchanged: usize,
}

/// Result of a metrics fetch for one binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub ad_id: String,
    pub platform: Platform,
    pub range: DateRange,
    pub records: Vec<MetricsRecord>,
    pub summary: ReconcileSummary,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_result_success_definition() {
        let ok = DeploymentResult::deployed(
            Platform::Facebook,
            Operation::Create,
            "fb-1".into(),
            TargetStatus::Active,
            vec![],
            1,
            Duration::from_millis(5),
        );
        let failed = DeploymentResult::failed(
            Platform::Google,
            Operation::Create,
            &Error::circuit_open("google", "campaigns"),
            0,
            Duration::ZERO,
        );
        let result = SyncResult::new("ad-1", vec![ok, failed]);

        assert!(result.is_success());
        assert!(!result.is_complete());
        assert_eq!(result.failures().count(), 1);
        assert_eq!(
            result.get(Platform::Google).unwrap().error_kind(),
            Some(ErrorKind::CircuitOpen)
        );
        assert_eq!(result.results()[0].platform(), Platform::Google);
    }

    #[test]
    fn test_all_failed_is_not_success() {
        let failed = DeploymentResult::failed(
            Platform::Google,
            Operation::Update,
            &Error::network("down"),
            4,
            Duration::ZERO,
        );
        assert!(!SyncResult::new("ad-1", vec![failed]).is_success());
        assert!(!SyncResult::new("ad-1", vec![]).is_success());
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let range = DateRange::new(start, end).unwrap();
        assert_eq!(range.days(), 7);
        assert!(range.contains(end));
        assert!(DateRange::new(end, start).is_err());
    }
}
