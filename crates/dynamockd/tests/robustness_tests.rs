//! Robustness tests.
//!
//! These verify the registry and the sync loops hold up under edge cases:
//! - Readers racing writers never see a half-replaced definition
//! - Rapid file churn converges once writes stop
//! - Watch and sweep removing the same entry
//! - Lagging event subscribers

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use dyna_core::{Definition, DefinitionId, Responses, Verb};
use dynamockd::registry::{Registry, RegistryEvent};
use dynamockd::sync::{SyncConfig, Synchronizer};
use serde_json::json;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A definition whose GET and DELETE payloads both carry `version`.
fn versioned(version: u64) -> Definition {
    let responses = Responses::default()
        .with(Verb::Get, json!({"version": version}))
        .with(Verb::Delete, json!({"version": version}));
    Definition::new(DefinitionId::parse("shared").unwrap(), "/shared", responses)
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(POLL_INTERVAL).await;
    }
    condition()
}

// ============================================================================
// Registry Consistency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_mixed_slots() {
    let registry = Registry::new();
    registry.upsert(versioned(0));
    let id = DefinitionId::parse("shared").unwrap();

    let writer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for version in 1..=500 {
                registry.upsert(versioned(version));
                if version % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        let id = id.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                let definition = registry.get(&id).unwrap();
                assert_eq!(
                    definition.response(Verb::Get),
                    definition.response(Verb::Delete),
                    "observed a partially replaced definition"
                );
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let last = registry.get(&id).unwrap();
    assert_eq!(last.response(Verb::Get), Some(&json!({"version": 500})));
}

#[tokio::test]
async fn test_lagging_subscriber_does_not_block_writers() {
    let registry = Registry::new();
    let mut events = registry.subscribe();

    // Far more writes than the event buffer holds, nobody reading
    for version in 0..2_000 {
        registry.upsert(versioned(version));
    }
    assert_eq!(registry.len(), 1);

    // The receiver reports the lag and then keeps working
    let first = events.recv().await;
    assert!(matches!(
        first,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
    ));

    registry.remove(&DefinitionId::parse("shared").unwrap());
    let mut saw_removal = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RegistryEvent::Removed { .. }) {
            saw_removal = true;
        }
    }
    assert!(saw_removal);
}

#[test]
fn test_concurrent_double_removal() {
    let registry = Registry::new();
    registry.upsert(versioned(1));
    let id = DefinitionId::parse("shared").unwrap();

    let removed: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| registry.remove(&id)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Exactly one caller actually removed it; the other was a no-op
    assert_eq!(removed.iter().filter(|r| **r).count(), 1);
    assert!(registry.is_empty());
}

// ============================================================================
// Directory Churn
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rapid_churn_converges() {
    let dir = TempDir::new().unwrap();
    let config = SyncConfig::new(dir.path())
        .with_reconcile_interval(Duration::from_millis(150))
        .with_startup_grace(Duration::from_millis(20));
    let mut sync = Synchronizer::new(config, CancellationToken::new());
    sync.start().await.unwrap();
    let registry = sync.registry().clone();

    let path = dir.path().join("hot.json");
    for round in 0..100 {
        if round % 3 == 2 {
            let _ = fs::remove_file(&path);
        } else {
            fs::write(
                &path,
                format!(r#"{{"url":"/hot","responses":{{"get":{{"round":{round}}}}}}}"#),
            )
            .unwrap();
        }
    }
    // Final state on disk: round 99 written (99 % 3 == 0)
    let expected = json!({"round": 99});

    let id = DefinitionId::parse("hot").unwrap();
    let converged = eventually(|| {
        registry
            .get(&id)
            .map(|d| d.response(Verb::Get) == Some(&expected))
            .unwrap_or(false)
    })
    .await;
    assert!(converged);

    sync.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_and_sweep_race_on_delete() {
    let dir = TempDir::new().unwrap();
    for n in 0..20 {
        fs::write(
            dir.path().join(format!("m{n}.json")),
            format!(r#"{{"url":"/m/{n}","responses":{{}}}}"#),
        )
        .unwrap();
    }

    let config = SyncConfig::new(dir.path())
        .with_reconcile_interval(Duration::from_millis(30))
        .with_startup_grace(Duration::from_millis(20));
    let mut sync = Synchronizer::new(config, CancellationToken::new());
    let report = sync.start().await.unwrap();
    assert_eq!(report.loaded, 20);
    let registry: Registry = sync.registry().clone();

    for n in 0..20 {
        fs::remove_file(dir.path().join(format!("m{n}.json"))).unwrap();
    }

    assert!(eventually(|| registry.is_empty()).await);
    sync.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_outlives_registry_changes() {
    let registry = Registry::new();
    registry.upsert(versioned(1));

    let snapshot: Vec<Arc<Definition>> = registry.list();
    registry.replace_all(Vec::new());

    assert!(registry.is_empty());
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot[0].response(Verb::Get),
        Some(&json!({"version": 1}))
    );
}
