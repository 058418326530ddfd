// # Metrics Store Trait
//
// Storage for unified daily metrics.
//
// Platforms revise recent days after the fact (late conversions, invalid
// click refunds). Each (ad, platform, date) row is therefore upserted with a
// revision counter: a re-fetch reporting different values replaces the row
// and bumps its revision, an identical re-fetch leaves it untouched.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{DateRange, MetricsRecord, Platform, ReconcileSummary};

/// Outcome of reconciling one incoming record against the stored one
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// No row existed for that day
    Inserted(MetricsRecord),
    /// The platform corrected the day; carries the new revision
    Revised(MetricsRecord),
    /// Same values as stored
    Unchanged,
}

/// Decide what an incoming record does to the stored one
pub fn reconcile_record(existing: Option<&MetricsRecord>, mut incoming: MetricsRecord) -> Reconciled {
    match existing {
        None => {
            incoming.revision = 0;
            Reconciled::Inserted(incoming)
        }
        Some(stored) if stored.same_values(&incoming) => Reconciled::Unchanged,
        Some(stored) => {
            incoming.revision = stored.revision.saturating_add(1);
            Reconciled::Revised(incoming)
        }
    }
}

/// Trait for metrics store implementations
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Reconcile a batch of records into the store
    async fn upsert_versioned(&self, records: &[MetricsRecord]) -> Result<ReconcileSummary>;

    /// Stored records for one ad on one platform within a date range, by date
    async fn list(
        &self,
        ad_id: &str,
        platform: Platform,
        range: &DateRange,
    ) -> Result<Vec<MetricsRecord>>;
}
