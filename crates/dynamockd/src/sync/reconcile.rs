//! Backup reconciliation sweep.
//!
//! Every interval the whole directory is rescanned and the registry content
//! replaced with the result. This bounds staleness to one interval whatever
//! state the watch loop is in, including never started.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{Registry, ReloadSummary};
use crate::scan::{scan, ScanError};

/// Performs one full scan and replaces the registry content.
///
/// On a failed directory read the registry is left untouched.
///
/// # Errors
///
/// Returns the scan error if the directory cannot be listed.
pub async fn sweep(
    registry: &Registry,
    directory: PathBuf,
    extension: String,
) -> Result<ReloadSummary, ScanError> {
    let report = scan(directory, extension).await?;
    let skipped = report.skipped.len();
    let summary = registry.replace_all(report.definitions);

    if summary.has_changes() {
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            total = summary.total,
            skipped,
            "Reconciliation sweep applied changes"
        );
    } else {
        debug!(total = summary.total, skipped, "Reconciliation sweep found no changes");
    }

    Ok(summary)
}

/// Runs the sweep every `period` until cancelled.
///
/// The first sweep happens one period after start; the startup scan has just
/// loaded the directory. A sweep in progress when cancellation arrives is
/// allowed to finish, but no new one starts.
pub async fn run_reconcile_loop(
    registry: Registry,
    directory: PathBuf,
    extension: String,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        dir = %directory.display(),
        interval_secs = period.as_secs_f64(),
        "Reconciliation sweep started"
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Reconciliation sweep shutting down");
                break;
            }

            _ = ticker.tick() => {
                if let Err(e) = sweep(&registry, directory.clone(), extension.clone()).await {
                    warn!(error = %e, "Reconciliation sweep failed, keeping current registry");
                }
            }
        }
    }

    debug!("Reconciliation task completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyna_core::DefinitionId;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, url: &str) {
        fs::write(
            dir.path().join(name),
            format!(r#"{{"url":"{url}","responses":{{"get":{{"ok":true}}}}}}"#),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_replaces_content() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", "/a");
        write(&dir, "b.json", "/b");

        let registry = Registry::new();
        let summary = sweep(&registry, dir.path().to_path_buf(), "json".into())
            .await
            .unwrap();
        assert_eq!(summary.added, 2);

        fs::remove_file(dir.path().join("a.json")).unwrap();
        write(&dir, "c.json", "/c");

        let summary = sweep(&registry, dir.path().to_path_buf(), "json".into())
            .await
            .unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.total, 2);
        assert!(!registry.contains(&DefinitionId::parse("a").unwrap()));
    }

    #[tokio::test]
    async fn test_sweep_failure_keeps_registry() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", "/a");
        let registry = Registry::new();
        sweep(&registry, dir.path().to_path_buf(), "json".into())
            .await
            .unwrap();

        let missing = dir.path().join("gone");
        let result = sweep(&registry, missing, "json".into()).await;
        assert!(result.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_loop_picks_up_external_change() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run_reconcile_loop(
            registry.clone(),
            dir.path().to_path_buf(),
            "json".into(),
            Duration::from_millis(50),
            cancel_token.clone(),
        ));

        write(&dir, "late.json", "/late");

        let id = DefinitionId::parse("late").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !registry.contains(&id) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.contains(&id));

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_exits_promptly_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            run_reconcile_loop(
                Registry::new(),
                dir.path().to_path_buf(),
                "json".into(),
                Duration::from_secs(3600),
                cancel_token,
            ),
        )
        .await;
        assert!(result.is_ok());
    }
}
