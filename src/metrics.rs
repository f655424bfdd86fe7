// Performance metrics module
//
// Lightweight counters for switches, scans and snapshots

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Engine-wide counters
///
/// Uses atomic operations so the orchestrator and the resolver can record from any
/// thread without locks. Logged on shutdown via [`Metrics::log_summary`].
#[derive(Debug)]
pub struct Metrics {
    /// Switch/launch requests that reached `Done`
    pub switches_completed: AtomicUsize,

    /// Switch/launch requests that ended in `Failed`
    pub switches_failed: AtomicUsize,

    /// Kill-wait polls that ran out of attempts
    pub kill_timeouts: AtomicUsize,

    pub snapshots_saved: AtomicUsize,

    pub library_scans: AtomicUsize,

    /// Records produced by the most recent scans, summed
    pub games_resolved: AtomicU64,

    /// Total time spent inside switch requests in milliseconds
    pub total_switch_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            switches_completed: AtomicUsize::new(0),
            switches_failed: AtomicUsize::new(0),
            kill_timeouts: AtomicUsize::new(0),
            snapshots_saved: AtomicUsize::new(0),
            library_scans: AtomicUsize::new(0),
            games_resolved: AtomicU64::new(0),
            total_switch_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_switch_completed(&self) {
        self.switches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_switch_failed(&self) {
        self.switches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kill_timeout(&self) {
        self.kill_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_saved(&self) {
        self.snapshots_saved.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a library build and how many records it produced
    pub fn record_library_scan(&self, games: usize) {
        self.library_scans.fetch_add(1, Ordering::Relaxed);
        self.games_resolved
            .fetch_add(games as u64, Ordering::Relaxed);
    }

    pub fn record_switch_time(&self, duration: Duration) {
        self.total_switch_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average duration of a finished switch in milliseconds
    pub fn avg_switch_time_ms(&self) -> f64 {
        let total = self.total_switch_time_ms.load(Ordering::Relaxed);
        let count = self.switches_completed.load(Ordering::Relaxed)
            + self.switches_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Switches: {} completed, {} failed, {} kill timeouts (avg: {:.2}ms)",
            self.switches_completed.load(Ordering::Relaxed),
            self.switches_failed.load(Ordering::Relaxed),
            self.kill_timeouts.load(Ordering::Relaxed),
            self.avg_switch_time_ms()
        );
        tracing::info!(
            "Library: {} scans, {} records; {} snapshots saved",
            self.library_scans.load(Ordering::Relaxed),
            self.games_resolved.load(Ordering::Relaxed),
            self.snapshots_saved.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
