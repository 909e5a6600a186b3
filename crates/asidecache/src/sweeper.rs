//! Background removal of stale cache keys
//!
//! Each pass walks every key under the domain prefix and deletes keys that
//! have no expiry or no lifetime left. The backend normally expires keys on
//! its own; this catches leaked keys and entries the backend has not reaped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::backend::{CacheBackend, SCAN_START};
use crate::config::{CacheConfig, MAX_SWEEP_INTERVAL};
use crate::stats::CacheStats;

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys returned by the scan
    pub scanned: u64,
    /// Keys deleted as stale
    pub deleted: u64,
    /// Backend calls that failed
    pub errors: u64,
    /// Whether the scan reached its last page
    pub completed: bool,
}

/// Periodic stale-key sweeper
pub struct Sweeper {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    interval: Duration,
    page_size: usize,
    stats: Arc<CacheStats>,
}

impl Sweeper {
    /// Create a sweeper for the key space in `config`
    ///
    /// The interval is held within one millisecond and `MAX_SWEEP_INTERVAL`.
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        config: &CacheConfig,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            backend,
            prefix: config.keys.prefix().to_string(),
            interval: config
                .sweep_interval
                .clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL),
            page_size: config.scan_page_size,
            stats,
        }
    }

    /// Run one full pass over the key space
    ///
    /// Never fails: a failed TTL query or delete skips that key, a failed scan
    /// ends the pass early.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut cursor = SCAN_START;

        loop {
            let page = match self
                .backend
                .scan_prefix(&self.prefix, cursor, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(prefix = %self.prefix, cursor, error = %e, "Sweeper scan failed");
                    self.stats.record_cache_error();
                    report.errors += 1;
                    return report;
                }
            };

            for key in &page.keys {
                report.scanned += 1;
                self.sweep_key(key, &mut report).await;
            }

            if page.is_last() {
                report.completed = true;
                return report;
            }
            cursor = page.next_cursor;
        }
    }

    async fn sweep_key(&self, key: &str, report: &mut SweepReport) {
        let ttl = match self.backend.ttl_remaining(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(key = %key, error = %e, "Sweeper TTL query failed");
                self.stats.record_cache_error();
                report.errors += 1;
                return;
            }
        };
        if !ttl.is_stale() {
            return;
        }

        match self.backend.delete(&[key.to_string()]).await {
            Ok(_) => {
                debug!(key = %key, ttl = ?ttl, "Swept stale cache key");
                self.stats.record_swept(1);
                report.deleted += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Sweeper delete failed");
                self.stats.record_cache_error();
                report.errors += 1;
            }
        }
    }

    /// Start the periodic loop on the current runtime
    ///
    /// The first pass runs one interval after the call.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            prefix = %self.prefix,
            interval_secs = self.interval.as_secs_f64(),
            page_size = self.page_size,
            "Cache sweeper started"
        );

        let Some(first_tick) = Instant::now().checked_add(self.interval) else {
            error!(interval = ?self.interval, "Sweep interval out of range, sweeper idle");
            shutdown_requested(&mut shutdown).await;
            return;
        };
        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        report = self.sweep_once() => log_report(&report),
                        _ = shutdown_requested(&mut shutdown) => {
                            // Deletes are idempotent, the next run starts over
                            info!("Cache sweeper abandoning pass for shutdown");
                            break;
                        }
                    }
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        info!("Cache sweeper stopped");
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn log_report(report: &SweepReport) {
    if report.deleted > 0 || report.errors > 0 {
        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            errors = report.errors,
            completed = report.completed,
            "Cache sweep finished"
        );
    } else {
        debug!(scanned = report.scanned, "Cache sweep finished, nothing stale");
    }
}

/// Owner of a running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it
    pub async fn shutdown(self) {
        // Fails only if the task is already gone
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Cache sweeper task failed");
        }
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
