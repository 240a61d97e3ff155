//! Synchronizer lifecycle.
//!
//! Owns the two loops that keep the registry equal to the directory:
//!
//! - the watch loop ([`watch`]) applies filesystem notifications as they
//!   arrive;
//! - the reconciliation loop ([`reconcile`]) rescans everything on a fixed
//!   interval and repairs whatever the watch loop missed.
//!
//! ```text
//! Stopped ──start()──► Starting ──scan ok──► Running ──shutdown()──► Stopping ──► Stopped
//!                          │
//!                          └── scan failed ──► Stopped (error returned)
//! ```

pub mod reconcile;
pub mod watch;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dyna_core::DEFAULT_EXTENSION;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{DefinitionService, RoutePolicy};
use crate::registry::{Registry, ReloadSummary};
use crate::scan::{scan, ScanError};

use self::reconcile::{run_reconcile_loop, sweep};
use self::watch::{run_watch_loop, DirectoryWatcher};

/// Default interval between reconciliation sweeps.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Delay between spawning the loops and reporting `Running`.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(500);

/// How long shutdown waits for the loops before giving up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Configuration
// ============================================================================

/// Settings for one synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The managed directory
    pub directory: PathBuf,
    /// Managed file extension, without the dot
    pub extension: String,
    pub reconcile_interval: Duration,
    pub startup_grace: Duration,
    pub shutdown_timeout: Duration,
    /// Run the event-driven watch loop at all
    pub watch_enabled: bool,
    /// Abort startup if the watch cannot be set up
    pub require_watch: bool,
}

impl SyncConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            startup_grace: DEFAULT_STARTUP_GRACE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            watch_enabled: true,
            require_watch: false,
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    #[must_use]
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_watch(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_require_watch(mut self, required: bool) -> Self {
        self.require_watch = required;
        self
    }
}

// ============================================================================
// State & Errors
// ============================================================================

/// Lifecycle state of a [`Synchronizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`Synchronizer::start`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The initial scan could not read the directory
    #[error("initial scan failed: {0}")]
    Scan(#[from] ScanError),

    /// The filesystem watch could not be set up and was required
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("synchronizer is {actual}, expected {expected}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// The parent token was cancelled, so a new run would stop immediately
    #[error("shutdown already requested, not starting")]
    Cancelled,
}

/// What a successful start did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReport {
    /// Definitions loaded by the initial scan
    pub loaded: usize,
    /// Managed files skipped by the initial scan
    pub skipped: usize,
    /// Whether the watch loop is running
    pub watching: bool,
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Both loops exited within the timeout
    Completed,
    /// The timeout elapsed first; remaining tasks were aborted
    TimedOut,
    /// Nothing was running
    NotRunning,
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Keeps a [`Registry`] in sync with a directory of definition files.
pub struct Synchronizer {
    config: SyncConfig,
    registry: Registry,
    state: LifecycleState,
    parent_token: CancellationToken,
    /// Token for the current run, a child of `parent_token`
    run_token: Option<CancellationToken>,
    tasks: JoinSet<()>,
    /// Set while the watch loop of the current run is alive
    watch_alive: Arc<AtomicBool>,
}

impl Synchronizer {
    /// Creates a stopped synchronizer with an empty registry.
    ///
    /// Cancelling `parent_token` stops the loops of any run as well.
    pub fn new(config: SyncConfig, parent_token: CancellationToken) -> Self {
        Self {
            config,
            registry: Registry::new(),
            state: LifecycleState::Stopped,
            parent_token,
            run_token: None,
            tasks: JoinSet::new(),
            watch_alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current lifecycle state.
    ///
    /// A run whose token was cancelled from the parent reports `Stopped`:
    /// its loops have been told to exit and will not start another scan.
    /// [`shutdown`](Self::shutdown) still joins them.
    pub fn state(&self) -> LifecycleState {
        if self.state == LifecycleState::Running && self.run_cancelled() {
            LifecycleState::Stopped
        } else {
            self.state
        }
    }

    /// Handle to the registry kept in sync. Cheap to clone.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Returns true while the watch loop of the current run is active.
    pub fn is_watching(&self) -> bool {
        self.state() == LifecycleState::Running && self.watch_alive.load(Ordering::Acquire)
    }

    fn run_cancelled(&self) -> bool {
        self.run_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Definition API bound to this synchronizer's registry and directory.
    pub fn service(&self, route_policy: RoutePolicy) -> DefinitionService {
        DefinitionService::new(
            self.registry.clone(),
            self.config.directory.clone(),
            self.config.extension.clone(),
        )
        .with_route_policy(route_policy)
    }

    /// Loads the directory and starts both loops.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` if not stopped
    /// - `SyncError::Cancelled` if the parent token is already cancelled
    /// - `SyncError::Scan` if the directory cannot be read
    /// - `SyncError::Watch` if the watch fails and `require_watch` is set
    ///
    /// On error the synchronizer is left `Stopped` and the registry is not
    /// modified.
    pub async fn start(&mut self) -> Result<StartReport, SyncError> {
        if self.state == LifecycleState::Running && self.run_cancelled() {
            // Loops of the previous run already exited; collect them
            self.shutdown().await;
        }

        if self.state != LifecycleState::Stopped {
            return Err(SyncError::InvalidState {
                expected: LifecycleState::Stopped,
                actual: self.state,
            });
        }

        if self.parent_token.is_cancelled() {
            warn!("Start requested after shutdown was signalled");
            return Err(SyncError::Cancelled);
        }

        self.state = LifecycleState::Starting;
        info!(dir = %self.config.directory.display(), "Synchronizer starting");

        match self.launch().await {
            Ok(report) => {
                // Let both loops reach their first suspension point before
                // anyone can ask them to stop.
                tokio::time::sleep(self.config.startup_grace).await;
                self.state = LifecycleState::Running;
                info!(
                    loaded = report.loaded,
                    skipped = report.skipped,
                    watching = report.watching,
                    "Synchronizer running"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Synchronizer failed to start");
                self.state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<StartReport, SyncError> {
        let config = &self.config;

        let report = scan(config.directory.clone(), config.extension.clone()).await?;
        let skipped = report.skipped.len();

        let watcher = if config.watch_enabled {
            match DirectoryWatcher::new(&config.directory) {
                Ok(watcher) => Some(watcher),
                Err(source) if config.require_watch => {
                    return Err(SyncError::Watch {
                        path: config.directory.clone(),
                        source,
                    });
                }
                Err(e) => {
                    error!(
                        dir = %config.directory.display(),
                        error = %e,
                        "Filesystem watch unavailable, continuing with reconciliation sweep only"
                    );
                    None
                }
            }
        } else {
            debug!("Watch loop disabled");
            None
        };

        // Nothing below can fail, so a failed start never leaves a partial load
        let summary = self.registry.replace_all(report.definitions);
        let run_token = self.parent_token.child_token();
        let watching = watcher.is_some();

        if let Some(watcher) = watcher {
            let alive = Arc::clone(&self.watch_alive);
            alive.store(true, Ordering::Release);
            let watch_loop = run_watch_loop(
                watcher,
                self.registry.clone(),
                config.extension.clone(),
                run_token.clone(),
            );
            self.tasks.spawn(async move {
                watch_loop.await;
                alive.store(false, Ordering::Release);
            });
        }

        self.tasks.spawn(run_reconcile_loop(
            self.registry.clone(),
            config.directory.clone(),
            config.extension.clone(),
            config.reconcile_interval,
            run_token.clone(),
        ));

        self.run_token = Some(run_token);

        Ok(StartReport {
            loaded: summary.total,
            skipped,
            watching,
        })
    }

    /// Stops both loops, waiting at most the configured shutdown timeout.
    ///
    /// Calling this when not running is a logged no-op.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if self.state != LifecycleState::Running {
            debug!(state = %self.state, "Shutdown requested while not running");
            return ShutdownOutcome::NotRunning;
        }

        self.state = LifecycleState::Stopping;
        info!("Synchronizer stopping");

        if let Some(token) = self.run_token.take() {
            token.cancel();
        }

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Synchronizer task ended abnormally");
                }
            }
        })
        .await;

        let outcome = match drained {
            Ok(()) => ShutdownOutcome::Completed,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "Synchronizer tasks did not stop in time, aborting them"
                );
                // Dropping the set aborts whatever is left in it
                self.tasks = JoinSet::new();
                ShutdownOutcome::TimedOut
            }
        };

        self.watch_alive.store(false, Ordering::Release);
        self.state = LifecycleState::Stopped;
        info!("Synchronizer stopped");
        outcome
    }

    /// Runs one reconciliation sweep immediately.
    ///
    /// # Errors
    ///
    /// Returns the scan error if the directory cannot be read; the registry
    /// is left unchanged in that case.
    pub async fn reconcile_now(&self) -> Result<ReloadSummary, ScanError> {
        sweep(
            &self.registry,
            self.config.directory.clone(),
            self.config.extension.clone(),
        )
        .await
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        if let Some(token) = self.run_token.take() {
            token.cancel();
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("directory", &self.config.directory)
            .field("state", &self.state())
            .field("watching", &self.is_watching())
            .field("definitions", &self.registry.len())
            .finish()
    }
}
