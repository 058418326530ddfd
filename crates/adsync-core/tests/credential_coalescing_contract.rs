//! Architectural Contract Test: Credential Coalescing
//!
//! Constraints verified:
//! - Concurrent callers needing the same refresh share one refresh call
//! - A refreshed credential is written back to the credential store
//! - Revoking a credential makes later calls fail with Authentication
//!
//! If this test fails, expired credentials cause refresh storms.

mod common;

use adsync_core::error::ErrorKind;
use adsync_core::model::{CredentialKey, Platform};
use adsync_core::traits::CredentialStore;
use adsync_core::{ConnectorSet, SyncOrchestrator};
use common::*;
use futures::future::join_all;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn concurrent_syncs_share_one_refresh() {
    let google = Arc::new(MockConnector::new(Platform::Google));
    let (stores, credentials) = seeded_stores("user-1").await;
    seed_credential(&credentials, "user-1", Platform::Google, "expired", -1).await;

    let (orchestrator, _rx) =
        SyncOrchestrator::new(&test_config(), ConnectorSet::new().with(google.clone()), stores)
            .unwrap();

    let ads: Vec<_> = (0..10).map(|i| sample_ad(&format!("ad-{}", i))).collect();
    let results = join_all(ads.iter().map(|ad| orchestrator.sync(ad, &[Platform::Google]))).await;

    assert!(results.iter().all(|r| r.is_complete()));
    assert_eq!(google.refresh_calls(), 1, "expected one coalesced refresh");
    assert_eq!(google.create_calls(), 10);

    let stored = credentials
        .load(&CredentialKey::new("user-1", Platform::Google))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "fresh-google-1");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-google"));
}

#[tokio::test(start_paused = true)]
async fn users_refresh_independently() {
    let facebook = Arc::new(MockConnector::new(Platform::Facebook));
    let (stores, credentials) = seeded_stores("user-1").await;
    seed_credential(&credentials, "user-1", Platform::Facebook, "expired-1", -1).await;
    seed_credential(&credentials, "user-2", Platform::Facebook, "expired-2", -1).await;

    let (orchestrator, _rx) =
        SyncOrchestrator::new(&test_config(), ConnectorSet::new().with(facebook.clone()), stores)
            .unwrap();

    let mut second_user = sample_ad("ad-2");
    second_user.user_id = "user-2".to_string();
    let ads = [sample_ad("ad-1"), second_user];
    let results = join_all(ads.iter().map(|ad| orchestrator.sync(ad, &[Platform::Facebook]))).await;

    assert!(results.iter().all(|r| r.is_complete()));
    assert_eq!(facebook.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn revoked_credential_fails_with_authentication() {
    let google = Arc::new(MockConnector::new(Platform::Google));
    let facebook = Arc::new(MockConnector::new(Platform::Facebook));
    let (stores, credentials) = seeded_stores("user-1").await;
    let connectors = ConnectorSet::new()
        .with(google.clone())
        .with(facebook.clone());
    let (orchestrator, _rx) = SyncOrchestrator::new(&test_config(), connectors, stores).unwrap();

    let ad = sample_ad("ad-1");
    assert!(
        orchestrator
            .sync(&ad, &[Platform::Google, Platform::Facebook])
            .await
            .is_complete()
    );
    assert!(orchestrator.credentials().is_cached("user-1", Platform::Google));

    orchestrator
        .revoke_credentials("user-1", Platform::Google)
        .await
        .unwrap();
    assert!(!orchestrator.credentials().is_cached("user-1", Platform::Google));
    assert!(
        credentials
            .load(&CredentialKey::new("user-1", Platform::Google))
            .await
            .unwrap()
            .is_none()
    );

    let calls = google.native_calls();
    let result = orchestrator
        .sync(&ad, &[Platform::Google, Platform::Facebook])
        .await;

    assert_eq!(
        result.get(Platform::Google).unwrap().error_kind(),
        Some(ErrorKind::Authentication)
    );
    assert!(result.get(Platform::Facebook).unwrap().is_success());
    assert_eq!(google.native_calls(), calls);
    assert_eq!(google.refresh_calls(), 0);
}
