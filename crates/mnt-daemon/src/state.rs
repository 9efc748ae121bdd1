//! Shared runtime state for mnt-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. At most one
//! reconciliation pass runs at a time, whether started over HTTP or by the
//! periodic tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mnt_schemas::Address;
use mnt_sync::{DriverError, ReconciliationDriver, SyncReport};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    LogLine { level: String, msg: String },
    SyncFinished(SyncSummary),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Condensed [`SyncReport`] kept as "last run" and published on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub batch_size: usize,
    pub total_records: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub failed_addresses: Vec<Address>,
}

impl From<&SyncReport> for SyncSummary {
    fn from(r: &SyncReport) -> Self {
        Self {
            started_at_utc: r.started_at_utc,
            finished_at_utc: r.finished_at_utc,
            batch_size: r.batch_size,
            total_records: r.total_records,
            changed: r.changed.len(),
            unchanged: r.unchanged,
            failed: r.failed.len(),
            failed_addresses: r.failed_addresses(),
        }
    }
}

/// Point-in-time snapshot returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub signer: Address,
    pub contract: Option<Address>,
    pub next_nonce: u64,
    /// "idle" | "running"
    pub sync_state: String,
    pub last_sync: Option<SyncSummary>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SyncStartError {
    #[error("a reconciliation pass is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("reconciliation task failed: {0}")]
    Task(String),
}

pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub driver: Arc<ReconciliationDriver>,
    pub contract: Option<Address>,
    /// Used when POST /v1/sync and the tick do not name a batch size.
    pub default_batch_size: usize,
    sync_running: AtomicBool,
    last_sync: RwLock<Option<SyncSummary>>,
}

impl AppState {
    pub fn new(
        driver: Arc<ReconciliationDriver>,
        contract: Option<Address>,
        default_batch_size: usize,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "mnt-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            driver,
            contract,
            default_batch_size,
            sync_running: AtomicBool::new(false),
            last_sync: RwLock::new(None),
        }
    }

    pub fn is_sync_running(&self) -> bool {
        self.sync_running.load(Ordering::SeqCst)
    }

    pub async fn last_sync(&self) -> Option<SyncSummary> {
        self.last_sync.read().await.clone()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let nonces = self.driver.engine().nonces();
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            signer: nonces.account(),
            contract: self.contract,
            next_nonce: nonces.current(),
            sync_state: if self.is_sync_running() { "running" } else { "idle" }.to_string(),
            last_sync: self.last_sync().await,
        }
    }

    /// Run one reconciliation pass unless one is already in progress.
    ///
    /// The pass runs in its own task and owns the running flag, so a caller
    /// that goes away (client disconnect, aborted tick) neither cuts the pass
    /// short nor lets a second pass start before it has finished.
    pub async fn run_sync(
        self: &Arc<Self>,
        batch_size: Option<usize>,
    ) -> Result<SyncReport, SyncStartError> {
        let guard = SyncGuard::acquire(Arc::clone(self)).ok_or(SyncStartError::AlreadyRunning)?;
        let batch_size = batch_size.unwrap_or(self.default_batch_size);

        let pass = tokio::spawn(async move {
            let state = &guard.0;
            let report = state.driver.sync_all(batch_size).await?;
            let summary = SyncSummary::from(&report);
            *state.last_sync.write().await = Some(summary.clone());
            let _ = state.bus.send(BusMsg::SyncFinished(summary));
            Ok::<_, DriverError>(report)
        });

        match pass.await {
            Ok(res) => Ok(res?),
            Err(join) => {
                error!(error = %join, "reconciliation task failed");
                Err(SyncStartError::Task(join.to_string()))
            }
        }
    }
}

/// Holds the single-pass flag; clears it on drop, including on error paths.
struct SyncGuard(Arc<AppState>);

impl SyncGuard {
    fn acquire(state: Arc<AppState>) -> Option<Self> {
        state
            .sync_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncGuard(state))
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.0.sync_running.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the periodic reconciliation tick. The first pass runs one
/// `interval` after start; a tick that finds a pass in progress is skipped.
pub fn spawn_reconcile_tick(state: Arc<AppState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            match state.run_sync(None).await {
                Ok(report) if report.is_clean() => {
                    info!(changed = report.changed.len(), "scheduled reconciliation finished");
                }
                Ok(report) => {
                    warn!(failed = report.failed.len(), "scheduled reconciliation left addresses diverging");
                    let _ = state.bus.send(BusMsg::LogLine {
                        level: "WARN".to_string(),
                        msg: format!("{} address(es) failed to reconcile", report.failed.len()),
                    });
                }
                Err(SyncStartError::AlreadyRunning) => {
                    debug!("reconciliation already running; tick skipped");
                }
                Err(SyncStartError::Task(err)) => {
                    error!(error = %err, "scheduled reconciliation task failed");
                }
                Err(SyncStartError::Driver(err)) => {
                    error!(error = %err, "scheduled reconciliation could not run");
                    let _ = state.bus.send(BusMsg::LogLine {
                        level: "ERROR".to_string(),
                        msg: format!("reconciliation could not run: {err}"),
                    });
                }
            }
        }
    })
}
