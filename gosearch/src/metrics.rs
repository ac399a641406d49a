use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

/// Shared pipeline counters, updated through atomics only so they can
/// be read at any time without locking.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    io_started: AtomicU64,
    io_stopped: AtomicU64,
    io_active: AtomicU64,
    io_max_active: AtomicU64,
    cpu_started: AtomicU64,
    cpu_stopped: AtomicU64,
    cpu_active: AtomicU64,
    cpu_max_active: AtomicU64,
    scale_ups: AtomicU64,
    files_enqueued: AtomicU64,
    files_scanned: AtomicU64,
    lines_enqueued: AtomicU64,
    lines_processed: AtomicU64,
    matches_produced: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_io_started(&self) {
        self.io_started.fetch_add(1, Ordering::Relaxed);
        let active = self.io_active.fetch_add(1, Ordering::Relaxed) + 1;
        update_max(&self.io_max_active, active);
    }

    pub fn record_io_stopped(&self) {
        self.io_stopped.fetch_add(1, Ordering::Relaxed);
        self.io_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_cpu_started(&self) {
        self.cpu_started.fetch_add(1, Ordering::Relaxed);
        let active = self.cpu_active.fetch_add(1, Ordering::Relaxed) + 1;
        update_max(&self.cpu_max_active, active);
    }

    pub fn record_cpu_stopped(&self) {
        self.cpu_stopped.fetch_add(1, Ordering::Relaxed);
        self.cpu_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_scale_up(&self) {
        self.scale_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_enqueued(&self) {
        self.files_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_scanned(&self) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_enqueued(&self) {
        self.lines_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_processed(&self) {
        self.lines_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_produced(&self) {
        self.matches_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cpu_active(&self) -> u64 {
        self.cpu_active.load(Ordering::Relaxed)
    }

    pub fn cpu_started(&self) -> u64 {
        self.cpu_started.load(Ordering::Relaxed)
    }

    /// Snapshot of every counter.
    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            io_started: self.io_started.load(Ordering::Relaxed),
            io_stopped: self.io_stopped.load(Ordering::Relaxed),
            io_max_active: self.io_max_active.load(Ordering::Relaxed),
            cpu_started: self.cpu_started.load(Ordering::Relaxed),
            cpu_stopped: self.cpu_stopped.load(Ordering::Relaxed),
            cpu_max_active: self.cpu_max_active.load(Ordering::Relaxed),
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            files_enqueued: self.files_enqueued.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            lines_enqueued: self.lines_enqueued.load(Ordering::Relaxed),
            lines_processed: self.lines_processed.load(Ordering::Relaxed),
            matches_produced: self.matches_produced.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "worker stats: io {}/{} (peak {}), cpu {}/{} (peak {}), scale-ups {}, \
             files {}/{}, lines {}/{}, matches {}",
            stats.io_started,
            stats.io_stopped,
            stats.io_max_active,
            stats.cpu_started,
            stats.cpu_stopped,
            stats.cpu_max_active,
            stats.scale_ups,
            stats.files_enqueued,
            stats.files_scanned,
            stats.lines_enqueued,
            stats.lines_processed,
            stats.matches_produced,
        );
    }
}

fn update_max(slot: &AtomicU64, candidate: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while candidate > current {
        match slot.compare_exchange_weak(current, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Point-in-time view of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub io_started: u64,
    pub io_stopped: u64,
    pub io_max_active: u64,
    pub cpu_started: u64,
    pub cpu_stopped: u64,
    pub cpu_max_active: u64,
    pub scale_ups: u64,
    pub files_enqueued: u64,
    pub files_scanned: u64,
    pub lines_enqueued: u64,
    pub lines_processed: u64,
    pub matches_produced: u64,
}

/// Wall-clock durations of the pipeline phases, recorded by the
/// coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub walk: Duration,
    pub scan: Duration,
    pub print: Duration,
    pub total: Duration,
}

impl fmt::Display for PhaseTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timings walk={:?} scan={:?} print={:?} total={:?}",
            self.walk, self.scan, self.print, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_gauges_track_start_and_stop() {
        let metrics = WorkerMetrics::new();
        metrics.record_cpu_started();
        metrics.record_cpu_started();
        assert_eq!(metrics.cpu_active(), 2);

        metrics.record_cpu_stopped();
        assert_eq!(metrics.cpu_active(), 1);

        let stats = metrics.get_stats();
        assert_eq!(stats.cpu_started, 2);
        assert_eq!(stats.cpu_stopped, 1);
        assert_eq!(stats.cpu_max_active, 2);
    }

    #[test]
    fn test_peak_does_not_decrease() {
        let metrics = WorkerMetrics::new();
        for _ in 0..3 {
            metrics.record_io_started();
        }
        for _ in 0..3 {
            metrics.record_io_stopped();
        }
        metrics.record_io_started();
        assert_eq!(metrics.get_stats().io_max_active, 3);
    }

    #[test]
    fn test_throughput_counters() {
        let metrics = WorkerMetrics::new();
        metrics.record_file_enqueued();
        metrics.record_file_scanned();
        metrics.record_line_enqueued();
        metrics.record_line_processed();
        metrics.record_match_produced();
        metrics.record_scale_up();

        let stats = metrics.get_stats();
        assert_eq!(stats.files_enqueued, 1);
        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.lines_enqueued, 1);
        assert_eq!(stats.lines_processed, 1);
        assert_eq!(stats.matches_produced, 1);
        assert_eq!(stats.scale_ups, 1);
    }

    #[test]
    fn test_timings_render_with_expected_prefix() {
        let timings = PhaseTimings::default();
        let text = timings.to_string();
        assert!(text.starts_with("timings walk="), "got: {text}");
        assert!(text.contains("total="));
    }
}
