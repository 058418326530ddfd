//! Sync orchestrator
//!
//! The SyncOrchestrator is responsible for:
//! - Fanning a unified ad out to every targeted platform concurrently
//! - Choosing create or update from the stored binding (idempotency)
//! - Serializing work on one (ad, platform) binding so concurrent syncs of the
//!   same ad update instead of creating twice
//! - Running each native call through breaker, retry handler and rate limiter
//! - Recording the outcome on the binding and emitting events
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────┐
//!      UnifiedAd ──────►│ SyncOrchestrator │──── SyncEvent ───► monitoring
//!                       └──────────────────┘
//!                                │ one future per platform, joined
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!  ┌──────────────┐     ┌─────────────────┐    ┌──────────────┐
//!  │ BindingStore │     │ CredentialCache │    │  AdMapper    │
//!  └──────────────┘     └─────────────────┘    └──────────────┘
//!                                │
//!            CircuitBreaker ( RetryHandler ( RateLimiter → PlatformConnector ) )
//! ```
//!
//! ## Independence
//!
//! Platforms share nothing but the stores. A platform whose circuit is open,
//! whose credential is revoked or whose mapping fails yields a failed
//! [`DeploymentResult`]; the other platforms proceed unaffected and the
//! [`SyncResult`] always lists every targeted platform.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::credentials::CredentialCache;
use crate::error::{Error, ErrorKind, Result};
use crate::model::{
    AccessToken, CredentialKey, DateRange, DeploymentResult, DroppedField, Endpoint,
    MetricsReport, Operation, Platform, PlatformBinding, ReconcileSummary, SyncResult,
    TargetStatus, UnifiedAd,
};
use crate::registry::ConnectorSet;
use crate::resilience::{
    Attempted, CircuitBreaker, CircuitSnapshot, RateBudget, RateLimiter, RetryHandler, RetryPolicy,
};
use crate::state::{MemoryBindingStore, MemoryCredentialStore, MemoryMetricsStore};
use crate::traits::{BindingStore, CredentialStore, MetricsStore, NativeCampaign};

/// Events emitted by the SyncOrchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A sync or status change fan-out began
    ///
    /// Create or update is decided per platform and reported when it settles.
    SyncStarted {
        ad_id: String,
        platforms: Vec<Platform>,
    },

    /// One platform settled
    PlatformSucceeded {
        ad_id: String,
        platform: Platform,
        operation: Operation,
        native_id: String,
        attempts: u32,
    },

    /// One platform failed after the retry policy was exhausted
    PlatformFailed {
        ad_id: String,
        platform: Platform,
        operation: Operation,
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },

    /// Optional fields a platform could not represent
    FieldsDropped {
        ad_id: String,
        platform: Platform,
        fields: Vec<DroppedField>,
    },

    /// All platforms of a fan-out have reported
    SyncCompleted {
        ad_id: String,
        succeeded: usize,
        failed: usize,
    },

    /// Metrics were fetched and reconciled
    MetricsReconciled {
        ad_id: String,
        platform: Platform,
        summary: ReconcileSummary,
    },

    /// In-flight work was cancelled
    Aborted { ad_id: String, operations: usize },

    /// Orchestrator shut down
    Stopped { reason: String },
}

/// Storage backends used by the orchestrator
#[derive(Clone)]
pub struct Stores {
    pub bindings: Arc<dyn BindingStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub metrics: Arc<dyn MetricsStore>,
}

impl Stores {
    /// Fresh in-memory stores for all three concerns
    pub fn in_memory() -> Self {
        Self {
            bindings: Arc::new(MemoryBindingStore::new()),
            credentials: Arc::new(MemoryCredentialStore::new()),
            metrics: Arc::new(MemoryMetricsStore::new()),
        }
    }
}

/// An operation that can be cancelled by `abort` or credential revocation
struct ActiveOp {
    ad_id: String,
    key: CredentialKey,
    token: CancellationToken,
}

/// Removes its operation from the active set when dropped
struct OpGuard<'a> {
    ops: &'a Mutex<HashMap<u64, ActiveOp>>,
    id: u64,
    token: CancellationToken,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Per-binding locks, keyed by (ad id, platform)
type BindingLocks = Mutex<HashMap<(String, Platform), Arc<tokio::sync::Mutex<()>>>>;

/// Cross-platform campaign sync orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`SyncOrchestrator::new()`]
/// 2. Call [`sync`](Self::sync), [`set_status`](Self::set_status) and
///    [`fetch_metrics`](Self::fetch_metrics) from any number of tasks
/// 3. [`shutdown`](Self::shutdown) cancels in-flight work and flushes bindings
///
/// ## Load Resistance
///
/// - Token buckets pace calls per (platform, endpoint)
/// - Circuit breakers stop calls to an endpoint that keeps failing
/// - The event channel is bounded; events are dropped (logged) when full
pub struct SyncOrchestrator {
    connectors: ConnectorSet,
    credentials: CredentialCache,
    bindings: Arc<dyn BindingStore>,
    metrics: Arc<dyn MetricsStore>,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry_policies: HashMap<Platform, RetryPolicy>,
    max_admission_wait: Duration,
    shutdown: CancellationToken,
    ops: Mutex<HashMap<u64, ActiveOp>>,
    next_op: AtomicU64,
    binding_locks: BindingLocks,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver) where event_receiver yields
    /// sync events
    pub fn new(
        config: &SyncConfig,
        connectors: ConnectorSet,
        stores: Stores,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.orchestrator.event_channel_capacity);
        let credentials = CredentialCache::new(
            stores.credentials,
            Arc::new(connectors.clone()),
            config.credentials.refresh_margin(),
        );
        let retry_policies = Platform::ALL
            .into_iter()
            .map(|p| (p, RetryPolicy::from(&config.retry_for(p))))
            .collect();

        let orchestrator = Self {
            connectors,
            credentials,
            bindings: stores.bindings,
            metrics: stores.metrics,
            rate_limiter: RateLimiter::from_config(config),
            breaker: CircuitBreaker::from_config(config),
            retry_policies,
            max_admission_wait: config.orchestrator.max_admission_wait(),
            shutdown: CancellationToken::new(),
            ops: Mutex::new(HashMap::new()),
            next_op: AtomicU64::new(0),
            binding_locks: Mutex::new(HashMap::new()),
            event_tx: tx,
        };

        Ok((orchestrator, rx))
    }

    /// Deploy or update `ad` on every platform in `platforms`
    ///
    /// An empty `platforms` slice targets every platform with a connector.
    /// Platforms run concurrently and independently; the result lists each
    /// one exactly once.
    pub async fn sync(&self, ad: &UnifiedAd, platforms: &[Platform]) -> SyncResult {
        let platforms = self.targets(platforms);
        self.emit_event(SyncEvent::SyncStarted {
            ad_id: ad.id.clone(),
            platforms: platforms.clone(),
        });

        let results = match ad.validate() {
            Ok(()) => join_all(platforms.iter().map(|p| self.sync_platform(ad, *p))).await,
            Err(e) => {
                warn!(ad_id = %ad.id, "Ad rejected before deployment: {}", e);
                platforms
                    .iter()
                    .map(|p| {
                        self.report_failure(&ad.id, *p, Operation::Create, &e, 0, Duration::ZERO)
                    })
                    .collect()
            }
        };

        self.complete(&ad.id, results)
    }

    /// Activate, pause or archive `ad` on each bound platform
    ///
    /// Platforms without a deployed binding report a Validation failure.
    pub async fn set_status(
        &self,
        ad: &UnifiedAd,
        platforms: &[Platform],
        status: TargetStatus,
    ) -> SyncResult {
        let platforms = self.targets(platforms);
        self.emit_event(SyncEvent::SyncStarted {
            ad_id: ad.id.clone(),
            platforms: platforms.clone(),
        });

        let results = join_all(
            platforms
                .iter()
                .map(|p| self.set_status_platform(ad, *p, status)),
        )
        .await;

        self.complete(&ad.id, results)
    }

    /// Pull metrics for one binding and reconcile them into the metrics store
    ///
    /// `user_id` owns the credential used for the call.
    pub async fn fetch_metrics(
        &self,
        user_id: &str,
        binding: &PlatformBinding,
        range: DateRange,
    ) -> Result<MetricsReport> {
        let platform = binding.platform;
        let native_id = binding.native_id.clone().ok_or_else(|| {
            Error::validation(format!(
                "ad {} is not deployed on {}",
                binding.ad_id, platform
            ))
        })?;
        let connector = self.connectors.get(platform)?;
        let op = self.track(&binding.ad_id, user_id, platform);

        let attempted = self
            .guarded(platform, Operation::FetchMetrics, user_id, &op.token, |token| {
                let connector = connector.clone();
                let native_id = native_id.clone();
                async move { connector.fetch_metrics(&token, &native_id, &range).await }
            })
            .await;
        let attempts = attempted.attempts;
        let raw = attempted.result?;

        let records: Vec<_> = connector
            .mapper()
            .metrics_to_unified(&binding.ad_id, &raw)?
            .into_iter()
            .filter(|r| range.contains(r.date))
            .collect();
        let summary = self.metrics.upsert_versioned(&records).await?;
        let records = self.metrics.list(&binding.ad_id, platform, &range).await?;

        info!(
            ad_id = %binding.ad_id,
            %platform,
            inserted = summary.inserted,
            revised = summary.revised,
            unchanged = summary.unchanged,
            "Metrics reconciled"
        );
        self.emit_event(SyncEvent::MetricsReconciled {
            ad_id: binding.ad_id.clone(),
            platform,
            summary,
        });

        Ok(MetricsReport {
            ad_id: binding.ad_id.clone(),
            platform,
            range,
            records,
            summary,
            attempts,
        })
    }

    /// Cancel in-flight work for one ad
    ///
    /// # Returns
    ///
    /// The number of platform operations that were cancelled
    pub fn abort(&self, ad_id: &str) -> usize {
        let cancelled = self.cancel_where(|op| op.ad_id == ad_id);
        if cancelled > 0 {
            info!(%ad_id, operations = cancelled, "Aborted in-flight work");
            self.emit_event(SyncEvent::Aborted {
                ad_id: ad_id.to_string(),
                operations: cancelled,
            });
        }
        cancelled
    }

    /// Drop a user's credential for a platform and cancel their in-flight work there
    pub async fn revoke_credentials(&self, user_id: &str, platform: Platform) -> Result<usize> {
        let key = CredentialKey::new(user_id, platform);
        let cancelled = self.cancel_where(|op| op.key == key);
        self.credentials.revoke(user_id, platform).await?;
        Ok(cancelled)
    }

    /// Cancel everything in flight and flush the binding store
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down sync orchestrator");
        self.shutdown.cancel();
        self.bindings.flush().await?;
        self.emit_event(SyncEvent::Stopped {
            reason: "Shutdown requested".to_string(),
        });
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Current circuit state for a platform endpoint
    pub fn circuit_snapshot(&self, platform: Platform, endpoint: Endpoint) -> CircuitSnapshot {
        self.breaker.snapshot(platform, endpoint)
    }

    /// Close a platform endpoint's circuit without waiting for the cool-down
    pub fn reset_circuit(&self, platform: Platform, endpoint: Endpoint) {
        self.breaker.reset(platform, endpoint);
    }

    /// Current rate budget for a platform endpoint, if used yet
    pub fn rate_budget(&self, platform: Platform, endpoint: Endpoint) -> Option<RateBudget> {
        self.rate_limiter.snapshot(platform, endpoint)
    }

    /// Credential cache shared by all operations
    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Binding store
    pub fn bindings(&self) -> &Arc<dyn BindingStore> {
        &self.bindings
    }

    fn targets(&self, platforms: &[Platform]) -> Vec<Platform> {
        let mut targets = if platforms.is_empty() {
            self.connectors.platforms()
        } else {
            platforms.to_vec()
        };
        targets.sort();
        targets.dedup();
        targets
    }

    fn complete(&self, ad_id: &str, results: Vec<DeploymentResult>) -> SyncResult {
        let result = SyncResult::new(ad_id, results);
        let succeeded = result.successes().count();
        let failed = result.failures().count();
        info!(%ad_id, succeeded, failed, "Fan-out completed");
        self.emit_event(SyncEvent::SyncCompleted {
            ad_id: ad_id.to_string(),
            succeeded,
            failed,
        });
        result
    }

    async fn sync_platform(&self, ad: &UnifiedAd, platform: Platform) -> DeploymentResult {
        let started = Instant::now();
        let op = self.track(&ad.id, &ad.user_id, platform);
        // held from reading the binding until the outcome is stored
        let _binding = self.lock_binding(&ad.id, platform).await;

        let mut binding = match self.bindings.get(&ad.id, platform).await {
            Ok(Some(binding)) => binding,
            Ok(None) => PlatformBinding::new(&ad.id, platform),
            Err(e) => {
                return self.report_failure(&ad.id, platform, Operation::Create, &e, 0, started.elapsed());
            }
        };
        let operation = if binding.is_deployed() {
            Operation::Update
        } else {
            Operation::Create
        };

        if binding.archived {
            let e = Error::validation(format!(
                "ad {} is archived on {}; archived campaigns are not updated",
                ad.id, platform
            ));
            return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
        }

        let prepared = self
            .connectors
            .get(platform)
            .and_then(|c| c.mapper().to_native(ad).map(|mapped| (c, mapped)));
        let (connector, mapped) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.save_failure(&mut binding, &e, 0).await;
                return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
            }
        };

        if !mapped.dropped_fields.is_empty() {
            debug!(ad_id = %ad.id, %platform, dropped = mapped.dropped_fields.len(), "Fields not representable on platform");
            self.emit_event(SyncEvent::FieldsDropped {
                ad_id: ad.id.clone(),
                platform,
                fields: mapped.dropped_fields.clone(),
            });
        }

        let native_id = binding.native_id.clone();
        let attempted = self
            .guarded(platform, operation, &ad.user_id, &op.token, |token| {
                let connector = connector.clone();
                let mapped = mapped.clone();
                let native_id = native_id.clone();
                async move {
                    match native_id {
                        Some(id) => connector.update_campaign(&token, &id, &mapped).await,
                        None => connector.create_campaign(&token, &mapped).await,
                    }
                }
            })
            .await;

        self.settle(
            &mut binding,
            operation,
            attempted,
            Some(mapped.dropped_fields),
            started,
        )
        .await
    }

    async fn set_status_platform(
        &self,
        ad: &UnifiedAd,
        platform: Platform,
        status: TargetStatus,
    ) -> DeploymentResult {
        let started = Instant::now();
        let operation = Operation::SetStatus;
        let op = self.track(&ad.id, &ad.user_id, platform);
        let _binding = self.lock_binding(&ad.id, platform).await;

        let mut binding = match self.bindings.get(&ad.id, platform).await {
            Ok(Some(binding)) if binding.is_deployed() => binding,
            Ok(_) => {
                let e = Error::validation(format!("ad {} is not deployed on {}", ad.id, platform));
                return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
            }
            Err(e) => {
                return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
            }
        };
        if binding.archived && status != TargetStatus::Archived {
            let e = Error::validation(format!(
                "ad {} is archived on {} and cannot become {}",
                ad.id, platform, status
            ));
            return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
        }

        let connector = match self.connectors.get(platform) {
            Ok(connector) => connector,
            Err(e) => {
                return self.report_failure(&ad.id, platform, operation, &e, 0, started.elapsed());
            }
        };

        let native_id = binding.native_id.clone().unwrap_or_default();
        let attempted = self
            .guarded(platform, operation, &ad.user_id, &op.token, |token| {
                let connector = connector.clone();
                let native_id = native_id.clone();
                async move { connector.set_status(&token, &native_id, status).await }
            })
            .await;

        let result = self
            .settle(&mut binding, operation, attempted, None, started)
            .await;
        if status == TargetStatus::Archived && result.is_success() {
            match self.bindings.archive(&ad.id, platform).await {
                Ok(true) => debug!(ad_id = %ad.id, %platform, "Binding archived"),
                Ok(false) => warn!(ad_id = %ad.id, %platform, "Archived binding vanished from the store"),
                Err(e) => error!(ad_id = %ad.id, %platform, "Binding could not be archived: {}", e),
            }
        }
        result
    }

    /// Wait for exclusive use of the (ad, platform) binding
    async fn lock_binding(
        &self,
        ad_id: &str,
        platform: Platform,
    ) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .binding_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((ad_id.to_string(), platform))
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Run one native call under breaker, retry handler and rate limiter
    ///
    /// Each attempt resolves a credential and takes a rate token before the
    /// call. An Authentication failure invalidates the token that was
    /// rejected and gets one re-authenticated attempt.
    async fn guarded<T, F, Fut>(
        &self,
        platform: Platform,
        operation: Operation,
        user_id: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Attempted<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let endpoint = operation.endpoint();
        let permit = match self.breaker.acquire(platform, endpoint) {
            Ok(permit) => permit,
            Err(e) => {
                debug!(%platform, %endpoint, %operation, "Rejected by open circuit");
                return Attempted {
                    result: Err(e),
                    attempts: 0,
                };
            }
        };

        let handler = RetryHandler::new(
            self.retry_policies
                .get(&platform)
                .cloned()
                .unwrap_or_default(),
            cancel.clone(),
        );
        let handler = if operation.is_idempotent() {
            handler
        } else {
            handler.non_idempotent()
        };
        let last_token: Mutex<Option<AccessToken>> = Mutex::new(None);

        let this = self;
        let call = &call;
        let last_token = &last_token;
        let attempted = handler
            .execute_with_reauth(
                || async move {
                    let token = this.credentials.get_access_token(user_id, platform).await?;
                    this.rate_limiter
                        .acquire(platform, endpoint, 1, this.max_admission_wait, cancel)
                        .await?;
                    *last_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
                    call(token).await
                },
                || async move {
                    let rejected = last_token
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    match rejected {
                        Some(token) => this.credentials.invalidate_token(user_id, platform, &token),
                        None => this.credentials.invalidate(user_id, platform),
                    }
                },
            )
            .await;

        permit.complete(attempted.result.as_ref().err());
        attempted
    }

    async fn settle(
        &self,
        binding: &mut PlatformBinding,
        operation: Operation,
        attempted: Attempted<NativeCampaign>,
        dropped_fields: Option<Vec<DroppedField>>,
        started: Instant,
    ) -> DeploymentResult {
        let Attempted { result, attempts } = attempted;
        let elapsed = started.elapsed();

        match result {
            Ok(native) => {
                let dropped = dropped_fields.clone().unwrap_or_default();
                binding.record_success(&native.native_id, native.status, dropped_fields, Utc::now());
                binding.attempts = attempts;
                if let Err(e) = self.bindings.upsert(binding).await {
                    // the campaign exists natively; losing the binding risks a
                    // duplicate create on the next sync
                    error!(
                        ad_id = %binding.ad_id,
                        platform = %binding.platform,
                        native_id = %native.native_id,
                        "Binding could not be saved after success: {}", e
                    );
                }
                info!(
                    ad_id = %binding.ad_id,
                    platform = %binding.platform,
                    %operation,
                    native_id = %native.native_id,
                    attempts,
                    "Platform operation succeeded"
                );
                self.emit_event(SyncEvent::PlatformSucceeded {
                    ad_id: binding.ad_id.clone(),
                    platform: binding.platform,
                    operation,
                    native_id: native.native_id.clone(),
                    attempts,
                });
                DeploymentResult::deployed(
                    binding.platform,
                    operation,
                    native.native_id,
                    native.status,
                    dropped,
                    attempts,
                    elapsed,
                )
            }
            Err(e) => {
                if !operation.is_idempotent() && e.is_retryable() && e.kind() != ErrorKind::RateLimited {
                    warn!(
                        ad_id = %binding.ad_id,
                        platform = %binding.platform,
                        kind = %e.kind(),
                        "Create outcome unknown; the campaign may exist natively"
                    );
                }
                self.save_failure(binding, &e, attempts).await;
                self.report_failure(&binding.ad_id, binding.platform, operation, &e, attempts, elapsed)
            }
        }
    }

    async fn save_failure(&self, binding: &mut PlatformBinding, error: &Error, attempts: u32) {
        binding.record_failure(error, Utc::now());
        binding.attempts = attempts;
        if let Err(e) = self.bindings.upsert(binding).await {
            warn!(
                ad_id = %binding.ad_id,
                platform = %binding.platform,
                "Binding failure could not be recorded: {}", e
            );
        }
    }

    fn report_failure(
        &self,
        ad_id: &str,
        platform: Platform,
        operation: Operation,
        error: &Error,
        attempts: u32,
        elapsed: Duration,
    ) -> DeploymentResult {
        warn!(%ad_id, %platform, %operation, attempts, kind = %error.kind(), "Platform operation failed: {}", error);
        self.emit_event(SyncEvent::PlatformFailed {
            ad_id: ad_id.to_string(),
            platform,
            operation,
            kind: error.kind(),
            message: error.to_string(),
            attempts,
        });
        DeploymentResult::failed(platform, operation, error, attempts, elapsed)
    }

    fn track(&self, ad_id: &str, user_id: &str, platform: Platform) -> OpGuard<'_> {
        let id = self.next_op.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                ActiveOp {
                    ad_id: ad_id.to_string(),
                    key: CredentialKey::new(user_id, platform),
                    token: token.clone(),
                },
            );
        OpGuard {
            ops: &self.ops,
            id,
            token,
        }
    }

    fn cancel_where(&self, predicate: impl Fn(&ActiveOp) -> bool) -> usize {
        let ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cancelled = 0;
        for op in ops.values().filter(|op| predicate(op)) {
            op.token.cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Emit a sync event, dropping it with a warning when the channel is full
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_event_clone_eq() {
        let event = SyncEvent::PlatformFailed {
            ad_id: "ad-1".to_string(),
            platform: Platform::Google,
            operation: Operation::Create,
            kind: ErrorKind::CircuitOpen,
            message: "circuit open for google/campaigns".to_string(),
            attempts: 0,
        };
        assert_eq!(event.clone(), event);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = SyncConfig::default();
        config.orchestrator.event_channel_capacity = 0;
        assert!(SyncOrchestrator::new(&config, ConnectorSet::new(), Stores::in_memory()).is_err());
    }

    #[tokio::test]
    async fn test_sync_without_connector_fails_per_platform() {
        let (orchestrator, _rx) =
            SyncOrchestrator::new(&SyncConfig::default(), ConnectorSet::new(), Stores::in_memory())
                .unwrap();
        let ad: UnifiedAd = serde_json::from_value(serde_json::json!({
            "id": "ad-1",
            "user_id": "u",
            "name": "n",
            "creative": { "headlines": ["h"] },
            "budget": { "amount": "50", "currency": "USD", "period": "daily" },
            "schedule": { "start_date": "2026-01-01" },
            "status": "active"
        }))
        .unwrap();

        let result = orchestrator.sync(&ad, &[Platform::Google]).await;
        assert!(!result.is_success());
        assert_eq!(
            result.get(Platform::Google).unwrap().error_kind(),
            Some(ErrorKind::Config)
        );
    }
}
