//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the desk loop and the sync worker can record without
//! contention. Reporting swaps the periodic counters to zero.
//!
//! All atomics use Relaxed ordering: these are statistical counters only.
//! Do NOT use them for coordination or logic decisions.

use crate::domain::types::{ScanStatus, ALL_STATUSES};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120
const BUCKET_BOUNDS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
pub const METRICS_NUM_BUCKETS: usize = 11;

const NUM_STATUSES: usize = ALL_STATUSES.len();

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Scans evaluated per outcome (monotonic)
    scans_by_status: [AtomicU64; NUM_STATUSES],
    /// Scans since last report (reset on report)
    scans_since_report: AtomicU64,
    /// Evaluation latency histogram (reset on report)
    eval_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    eval_latency_sum_us: AtomicU64,
    eval_latency_max_us: AtomicU64,
    /// Input rejected before evaluation (empty code, no route)
    inputs_rejected: AtomicU64,
    /// Packages upserted into the reference index (monotonic)
    packages_imported: AtomicU64,
    /// Sync messages applied to the durable store (monotonic)
    sync_applied: AtomicU64,
    /// Sync messages that failed against the durable store (monotonic)
    sync_failures: AtomicU64,
    /// Sync messages dropped because the queue was full (monotonic)
    sync_dropped: AtomicU64,
    /// Pushed records merged into the local log (monotonic)
    remote_merged: AtomicU64,
    /// Pushed records ignored as already present (monotonic)
    remote_ignored: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_by_status: std::array::from_fn(|_| AtomicU64::new(0)),
            scans_since_report: AtomicU64::new(0),
            eval_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            eval_latency_sum_us: AtomicU64::new(0),
            eval_latency_max_us: AtomicU64::new(0),
            inputs_rejected: AtomicU64::new(0),
            packages_imported: AtomicU64::new(0),
            sync_applied: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
            sync_dropped: AtomicU64::new(0),
            remote_merged: AtomicU64::new(0),
            remote_ignored: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an evaluated scan with its evaluation latency (lock-free)
    #[inline]
    pub fn record_scan(&self, status: ScanStatus, latency_us: u64) {
        self.scans_by_status[status.index()].fetch_add(1, Ordering::Relaxed);
        self.scans_since_report.fetch_add(1, Ordering::Relaxed);
        self.eval_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.eval_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.eval_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_input_rejected(&self) {
        self.inputs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_packages_imported(&self, count: u64) {
        self.packages_imported.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sync_applied(&self) {
        self.sync_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sync_failure(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sync_dropped(&self) {
        self.sync_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_merge(&self, merged: bool) {
        if merged {
            self.remote_merged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.remote_ignored.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total scans recorded with the given status
    pub fn scans_with_status(&self, status: ScanStatus) -> u64 {
        self.scans_by_status[status.index()].load(Ordering::Relaxed)
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.load(Ordering::Relaxed)
    }

    pub fn sync_dropped(&self) -> u64 {
        self.sync_dropped.load(Ordering::Relaxed)
    }

    pub fn sync_applied(&self) -> u64 {
        self.sync_applied.load(Ordering::Relaxed)
    }

    pub fn inputs_rejected(&self) -> u64 {
        self.inputs_rejected.load(Ordering::Relaxed)
    }

    /// Generate a summary, resetting periodic counters
    pub fn report(&self) -> MetricsSummary {
        let scans_count = self.scans_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.eval_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.eval_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.eval_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let scans_per_min = if elapsed.as_secs_f64() > 0.0 {
            scans_count as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_eval_latency_us = if scans_count > 0 { latency_sum / scans_count } else { 0 };

        let mut scans_by_status = [0u64; NUM_STATUSES];
        for status in ALL_STATUSES {
            scans_by_status[status.index()] = self.scans_with_status(status);
        }

        MetricsSummary {
            scans_by_status,
            scans_per_min,
            avg_eval_latency_us,
            max_eval_latency_us: max_latency,
            eval_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            inputs_rejected: self.inputs_rejected(),
            packages_imported: self.packages_imported.load(Ordering::Relaxed),
            sync_applied: self.sync_applied(),
            sync_failures: self.sync_failures(),
            sync_dropped: self.sync_dropped(),
            remote_merged: self.remote_merged.load(Ordering::Relaxed),
            remote_ignored: self.remote_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at report time
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    /// Indexed by [`ScanStatus::index`]
    pub scans_by_status: [u64; NUM_STATUSES],
    pub scans_per_min: f64,
    pub avg_eval_latency_us: u64,
    pub max_eval_latency_us: u64,
    pub eval_p99_us: u64,
    pub inputs_rejected: u64,
    pub packages_imported: u64,
    pub sync_applied: u64,
    pub sync_failures: u64,
    pub sync_dropped: u64,
    pub remote_merged: u64,
    pub remote_ignored: u64,
}

impl MetricsSummary {
    pub fn scans_total(&self) -> u64 {
        self.scans_by_status.iter().sum()
    }

    pub fn count(&self, status: ScanStatus) -> u64 {
        self.scans_by_status[status.index()]
    }

    /// Log metrics summary
    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total(),
            success = %self.count(ScanStatus::Success),
            manual = %self.count(ScanStatus::Manual),
            error_route = %self.count(ScanStatus::ErrorRoute),
            error_not_found = %self.count(ScanStatus::ErrorNotFound),
            error_duplicate = %self.count(ScanStatus::ErrorDuplicate),
            error_invalid = %self.count(ScanStatus::ErrorInvalid),
            scans_per_min = format!("{:.1}", self.scans_per_min),
            avg_eval_us = %self.avg_eval_latency_us,
            max_eval_us = %self.max_eval_latency_us,
            eval_p99_us = %self.eval_p99_us,
            sync_applied = %self.sync_applied,
            sync_failures = %self.sync_failures,
            sync_dropped = %self.sync_dropped,
            remote_merged = %self.remote_merged,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(10), 0);
        assert_eq!(bucket_index(11), 1);
        assert_eq!(bucket_index(5120), 9);
        assert_eq!(bucket_index(999_999), 10);
    }

    #[test]
    fn test_record_scan_counts_by_status() {
        let metrics = Metrics::new();
        metrics.record_scan(ScanStatus::Success, 5);
        metrics.record_scan(ScanStatus::Success, 15);
        metrics.record_scan(ScanStatus::ErrorDuplicate, 30);

        assert_eq!(metrics.scans_with_status(ScanStatus::Success), 2);
        assert_eq!(metrics.scans_with_status(ScanStatus::ErrorDuplicate), 1);
        assert_eq!(metrics.scans_with_status(ScanStatus::Manual), 0);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_scan(ScanStatus::Success, 10);
        metrics.record_scan(ScanStatus::ErrorRoute, 30);
        metrics.record_sync_failure();

        let summary = metrics.report();
        assert_eq!(summary.scans_total(), 2);
        assert_eq!(summary.avg_eval_latency_us, 20);
        assert_eq!(summary.max_eval_latency_us, 30);
        assert_eq!(summary.sync_failures, 1);

        let summary = metrics.report();
        // Per-status totals are monotonic, latency resets
        assert_eq!(summary.scans_total(), 2);
        assert_eq!(summary.avg_eval_latency_us, 0);
        assert_eq!(summary.max_eval_latency_us, 0);
    }

    #[test]
    fn test_remote_merge_counters() {
        let metrics = Metrics::new();
        metrics.record_remote_merge(true);
        metrics.record_remote_merge(false);
        metrics.record_remote_merge(false);

        let summary = metrics.report();
        assert_eq!(summary.remote_merged, 1);
        assert_eq!(summary.remote_ignored, 2);
    }

    #[test]
    fn test_percentile_empty() {
        let buckets = [0u64; METRICS_NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 0);
    }
}
