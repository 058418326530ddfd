//! Test doubles and common utilities for orchestrator contract tests
//!
//! The mock connector counts every native call, can be scripted to fail,
//! and never touches the network.

#![allow(dead_code)]

use adsync_core::config::SyncConfig;
use adsync_core::error::{Error, Result};
use adsync_core::model::{
    AccessToken, AdStatus, BudgetPeriod, BudgetSpec, CanonicalFields, Credential, CredentialKey,
    Creative, DateRange, DroppedField, MetricsRecord, Platform, ScheduleSpec, TargetStatus,
    TargetingSpec, UnifiedAd,
};
use adsync_core::traits::{
    AdMapper, CredentialStore, MappedCampaign, NativeCampaign, PlatformConnector,
};
use adsync_core::{MemoryCredentialStore, Stores};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mapper producing a small JSON payload
pub struct MockMapper {
    platform: Platform,
}

impl AdMapper for MockMapper {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn to_native(&self, ad: &UnifiedAd) -> Result<MappedCampaign> {
        if ad.creative.headlines.is_empty() {
            return Err(Error::validation("at least one headline is required"));
        }
        if self.platform == Platform::Google && ad.creative.headlines.iter().any(|h| h.len() > 30) {
            return Err(Error::validation("headline exceeds 30 characters"));
        }
        let mut dropped_fields = Vec::new();
        if self.platform == Platform::Google && !ad.targeting.interests.is_empty() {
            dropped_fields.push(DroppedField::new(
                "targeting.interests",
                "not supported on search campaigns",
            ));
        }
        Ok(MappedCampaign {
            payload: json!({
                "name": ad.name,
                "budget": ad.budget.amount.to_string(),
                "headline": ad.creative.headlines[0],
            }),
            dropped_fields,
        })
    }

    fn from_native(&self, _payload: &Value) -> Result<CanonicalFields> {
        Err(Error::validation("not used by the orchestrator"))
    }

    fn metrics_to_unified(&self, ad_id: &str, payload: &Value) -> Result<Vec<MetricsRecord>> {
        let rows = payload
            .as_array()
            .ok_or_else(|| Error::validation("metrics payload must be an array"))?;
        rows.iter()
            .map(|row| {
                let date = row["date"]
                    .as_str()
                    .and_then(|d| d.parse::<NaiveDate>().ok())
                    .ok_or_else(|| Error::validation("bad date"))?;
                Ok(MetricsRecord {
                    ad_id: ad_id.to_string(),
                    platform: self.platform,
                    date,
                    impressions: row["impressions"].as_u64().unwrap_or(0),
                    clicks: row["clicks"].as_u64().unwrap_or(0),
                    spend: row["spend"]
                        .as_str()
                        .unwrap_or("0")
                        .parse()
                        .map_err(|_| Error::validation("bad spend"))?,
                    conversions: row["conversions"].as_f64().unwrap_or(0.0),
                    revision: 0,
                    fetched_at: Utc::now(),
                })
            })
            .collect()
    }
}

/// A connector that tracks calls and fails on demand
pub struct MockConnector {
    platform: Platform,
    mapper: MockMapper,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    status_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    /// Failures returned by the next native calls, in order
    script: Mutex<VecDeque<Error>>,
    /// Failure returned by every native call once the script is empty
    always: Mutex<Option<Error>>,
    /// Tokens the platform rejects as expired
    rejected_tokens: Mutex<Vec<String>>,
    /// Latency of every native call
    latency: Duration,
    /// Latency of the refresh flow
    refresh_latency: Duration,
    metrics_payload: Mutex<Value>,
}

impl MockConnector {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            mapper: MockMapper { platform },
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            rejected_tokens: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            refresh_latency: Duration::from_millis(100),
            metrics_payload: Mutex::new(json!([])),
        }
    }

    /// Every native call takes `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue failures for the next native calls
    pub fn fail_next(&self, errors: impl IntoIterator<Item = Error>) {
        self.script.lock().unwrap().extend(errors);
    }

    /// Fail every native call with `error`
    pub fn fail_always(&self, error: Error) {
        *self.always.lock().unwrap() = Some(error);
    }

    /// Stop failing
    pub fn heal(&self) {
        self.script.lock().unwrap().clear();
        *self.always.lock().unwrap() = None;
    }

    /// Reject `token` with an Authentication error
    pub fn reject_token(&self, token: &str) {
        self.rejected_tokens.lock().unwrap().push(token.to_string());
    }

    /// Report `payload` from fetch_metrics
    pub fn set_metrics(&self, payload: Value) {
        *self.metrics_payload.lock().unwrap() = payload;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// All native calls, whatever the operation
    pub fn native_calls(&self) -> usize {
        self.create_calls() + self.update_calls() + self.status_calls() + self.metrics_calls()
    }

    async fn native_call(&self, token: &AccessToken) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self
            .rejected_tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == token.secret())
        {
            return Err(Error::auth("token expired"));
        }
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.always.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformConnector for MockConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn mapper(&self) -> &dyn AdMapper {
        &self.mapper
    }

    async fn create_campaign(
        &self,
        token: &AccessToken,
        _campaign: &MappedCampaign,
    ) -> Result<NativeCampaign> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.native_call(token).await?;
        Ok(NativeCampaign {
            native_id: format!("{}-{}", self.platform, n),
            status: TargetStatus::Active,
        })
    }

    async fn update_campaign(
        &self,
        token: &AccessToken,
        native_id: &str,
        _campaign: &MappedCampaign,
    ) -> Result<NativeCampaign> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.native_call(token).await?;
        Ok(NativeCampaign {
            native_id: native_id.to_string(),
            status: TargetStatus::Active,
        })
    }

    async fn set_status(
        &self,
        token: &AccessToken,
        native_id: &str,
        status: TargetStatus,
    ) -> Result<NativeCampaign> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.native_call(token).await?;
        Ok(NativeCampaign {
            native_id: native_id.to_string(),
            status,
        })
    }

    async fn fetch_metrics(
        &self,
        token: &AccessToken,
        _native_id: &str,
        _range: &DateRange,
    ) -> Result<Value> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.native_call(token).await?;
        Ok(self.metrics_payload.lock().unwrap().clone())
    }

    async fn refresh_credential(&self, previous: &Credential) -> Result<Credential> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.refresh_latency).await;
        Ok(Credential::new(
            &previous.key(),
            format!("fresh-{}-{}", self.platform, n),
            previous.refresh_token.clone(),
            Utc::now() + chrono::Duration::hours(1),
        ))
    }
}

/// Config with deterministic retry delays
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.retry.jitter_ratio = 0.0;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_secs = 60;
    config
}

/// In-memory stores with a valid credential for `user` on every platform
pub async fn seeded_stores(user: &str) -> (Stores, Arc<MemoryCredentialStore>) {
    let credentials = Arc::new(MemoryCredentialStore::new());
    for platform in Platform::ALL {
        seed_credential(&credentials, user, platform, &format!("seed-{}", platform), 1).await;
    }
    let mut stores = Stores::in_memory();
    stores.credentials = credentials.clone();
    (stores, credentials)
}

/// Store a credential expiring `hours` from now (negative means expired)
pub async fn seed_credential(
    store: &MemoryCredentialStore,
    user: &str,
    platform: Platform,
    token: &str,
    hours: i64,
) {
    let key = CredentialKey::new(user, platform);
    let credential = Credential::new(
        &key,
        token,
        Some(format!("refresh-{}", platform)),
        Utc::now() + chrono::Duration::hours(hours),
    );
    store.save(&credential).await.unwrap();
}

/// A valid $50/day ad owned by `user-1`
pub fn sample_ad(id: &str) -> UnifiedAd {
    UnifiedAd {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        name: "Spring sale".to_string(),
        creative: Creative {
            headlines: vec!["Spring sale".to_string(), "20% off".to_string()],
            descriptions: vec!["Everything in store".to_string()],
            final_url: Some("https://shop.example.com".to_string()),
            ..Creative::default()
        },
        targeting: TargetingSpec {
            locations: vec!["US".to_string()],
            interests: vec!["gardening".to_string()],
            ..TargetingSpec::default()
        },
        budget: BudgetSpec {
            amount: "50".parse().unwrap(),
            currency: "USD".to_string(),
            period: BudgetPeriod::Daily,
        },
        schedule: ScheduleSpec {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: None,
        },
        status: AdStatus::Active,
        platform_overrides: BTreeMap::new(),
    }
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}
