//! Architectural Contract Test: Cancellation & Shutdown
//!
//! Constraints verified:
//! - abort(ad) cancels that ad's in-flight calls and nothing else
//! - Cancelled calls report Cancelled and do not count against the circuit
//! - shutdown cancels all in-flight work and flushes bindings
//!
//! If this test fails, shutdown can hang or leave half-recorded work.

mod common;

use adsync_core::error::ErrorKind;
use adsync_core::model::{Endpoint, Platform};
use adsync_core::{ConnectorSet, SyncEvent, SyncOrchestrator};
use common::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn abort_cancels_only_the_named_ad() {
    let google = Arc::new(MockConnector::new(Platform::Google).with_latency(Duration::from_secs(10)));
    let (stores, _) = seeded_stores("user-1").await;
    let (orchestrator, mut rx) =
        SyncOrchestrator::new(&test_config(), ConnectorSet::new().with(google.clone()), stores)
            .unwrap();
    let orchestrator = Arc::new(orchestrator);

    let spawn_sync = |id: &str| {
        let orchestrator = orchestrator.clone();
        let ad = sample_ad(id);
        tokio::spawn(async move { orchestrator.sync(&ad, &[Platform::Google]).await })
    };
    let doomed = spawn_sync("ad-doomed");
    let survivor = spawn_sync("ad-survivor");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(orchestrator.abort("ad-doomed"), 1);

    let doomed = doomed.await.unwrap();
    let outcome = doomed.get(Platform::Google).unwrap();
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert!(outcome.elapsed() < Duration::from_secs(10));

    let survivor = survivor.await.unwrap();
    assert!(survivor.is_complete());

    assert_eq!(
        orchestrator
            .circuit_snapshot(Platform::Google, Endpoint::Campaigns)
            .consecutive_failures,
        0
    );

    let mut aborted = false;
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::Aborted { ad_id, operations } = event {
            assert_eq!(ad_id, "ad-doomed");
            assert_eq!(operations, 1);
            aborted = true;
        }
    }
    assert!(aborted);
}

#[tokio::test(start_paused = true)]
async fn abort_without_work_is_a_no_op() {
    let (stores, _) = seeded_stores("user-1").await;
    let (orchestrator, _rx) = SyncOrchestrator::new(
        &test_config(),
        ConnectorSet::new().with(Arc::new(MockConnector::new(Platform::Google))),
        stores,
    )
    .unwrap();

    assert_eq!(orchestrator.abort("nothing-running"), 0);
}

#[tokio::test(start_paused = true)]
async fn abort_interrupts_retry_backoff() {
    let facebook = Arc::new(MockConnector::new(Platform::Facebook));
    facebook.fail_next([adsync_core::Error::rate_limited(
        "throttled",
        Some(Duration::from_secs(300)),
    )]);
    let (stores, _) = seeded_stores("user-1").await;
    let (orchestrator, _rx) =
        SyncOrchestrator::new(&test_config(), ConnectorSet::new().with(facebook.clone()), stores)
            .unwrap();
    let orchestrator = Arc::new(orchestrator);

    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .sync(&sample_ad("ad-1"), &[Platform::Facebook])
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    orchestrator.abort("ad-1");

    let result = task.await.unwrap();
    let outcome = result.get(Platform::Facebook).unwrap();
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(facebook.create_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_work() {
    let google = Arc::new(MockConnector::new(Platform::Google).with_latency(Duration::from_secs(10)));
    let facebook = Arc::new(MockConnector::new(Platform::Facebook).with_latency(Duration::from_secs(10)));
    let (stores, _) = seeded_stores("user-1").await;
    let connectors = ConnectorSet::new().with(google).with(facebook);
    let (orchestrator, mut rx) = SyncOrchestrator::new(&test_config(), connectors, stores).unwrap();
    let orchestrator = Arc::new(orchestrator);

    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.sync(&sample_ad("ad-1"), &[]).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    orchestrator.shutdown().await.unwrap();
    assert!(orchestrator.is_shut_down());

    let result = task.await.unwrap();
    assert_eq!(result.results().len(), 2);
    assert!(
        result
            .results()
            .iter()
            .all(|r| r.error_kind() == Some(ErrorKind::Cancelled))
    );

    // work submitted after shutdown is cancelled immediately
    let late = orchestrator.sync(&sample_ad("ad-2"), &[]).await;
    assert!(!late.is_success());
    assert!(late.failures().all(|r| r.attempts() == 0));

    let mut stopped = false;
    while let Ok(event) = rx.try_recv() {
        stopped |= matches!(event, SyncEvent::Stopped { .. });
    }
    assert!(stopped);
}
