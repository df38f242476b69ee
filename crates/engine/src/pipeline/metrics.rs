use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Forces the wrapped counters onto their own 64-byte cache line so the
/// reader, the parse workers and the reducer do not false-share.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Line reader counters.
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    pub lines: AtomicU64,
    pub bytes: AtomicU64,
}

/// Parse worker counters (hottest path - updated per line)
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub parsed: AtomicU64,
    pub rejected: AtomicU64,
    pub panicked: AtomicU64,
    pub parse_time_nanos: AtomicU64,
}

/// Reducer counters.
#[derive(Debug, Default)]
pub struct ReducerMetrics {
    pub received: AtomicU64,
    pub fold_errors: AtomicU64,
    pub emitted: AtomicU64,
}

/// Counters for one pipeline run, shared by all of its stages.
///
/// Every update is `Ordering::Relaxed`. A snapshot is not transactional
/// across groups, so derived values such as [`PipelineMetrics::in_flight`]
/// are approximate when read from outside the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub reader: CacheAligned<ReaderMetrics>,
    pub workers: CacheAligned<WorkerMetrics>,
    pub reducer: CacheAligned<ReducerMetrics>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_line(&self, bytes: u64) {
        self.reader.0.lines.fetch_add(1, Ordering::Relaxed);
        self.reader.0.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a line that parsed and is about to be published to the reducer.
    #[inline]
    pub fn record_parsed(&self, time_nanos: u64) {
        self.workers.0.parse_time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
        self.workers.0.parsed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.workers.0.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panic(&self) {
        self.workers.0.panicked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_received(&self) {
        self.reducer.0.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fold_error(&self) {
        self.reducer.0.fold_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_emitted(&self, count: u64) {
        self.reducer.0.emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Records counted by workers that the reducer has not taken yet. Each
    /// holds a reserved or buffered entries slot, so this never exceeds the
    /// pipeline limit while the run is active.
    pub fn in_flight(&self) -> u64 {
        let received = self.reducer.0.received.load(Ordering::Relaxed);
        let parsed = self.workers.0.parsed.load(Ordering::Relaxed);
        parsed.saturating_sub(received)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let lines_read = self.reader.0.lines.load(Ordering::Relaxed);
        let records_parsed = self.workers.0.parsed.load(Ordering::Relaxed);
        let total_time_ns = self.workers.0.parse_time_nanos.load(Ordering::Relaxed);
        let lines_rejected = self.workers.0.rejected.load(Ordering::Relaxed);

        let attempts = records_parsed + lines_rejected;

        MetricsSnapshot {
            lines_read,
            bytes_read: self.reader.0.bytes.load(Ordering::Relaxed),

            records_parsed,
            lines_rejected,
            worker_panics: self.workers.0.panicked.load(Ordering::Relaxed),
            avg_parse_time_us: if records_parsed > 0 {
                (total_time_ns as f64 / records_parsed as f64) / 1000.0
            } else {
                0.0
            },
            match_rate: if attempts > 0 {
                records_parsed as f64 / attempts as f64
            } else {
                1.0
            },

            records_reduced: self.reducer.0.received.load(Ordering::Relaxed),
            fold_errors: self.reducer.0.fold_errors.load(Ordering::Relaxed),
            records_emitted: self.reducer.0.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Read-only copy of [`PipelineMetrics`], suitable for logging as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    // Reader
    pub lines_read: u64,
    pub bytes_read: u64,

    // Workers
    pub records_parsed: u64,
    pub lines_rejected: u64,
    pub worker_panics: u64,
    pub avg_parse_time_us: f64,
    pub match_rate: f64,

    // Reducer
    pub records_reduced: u64,
    pub fold_errors: u64,
    pub records_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_empty() {
        let snap = PipelineMetrics::new().snapshot();
        assert_eq!(snap.lines_read, 0);
        assert_eq!(snap.records_parsed, 0);
        assert_eq!(snap.avg_parse_time_us, 0.0);
        assert_eq!(snap.match_rate, 1.0);
    }

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_line(10);
        metrics.record_line(20);
        metrics.record_line(5);
        metrics.record_parsed(2_000);
        metrics.record_parsed(4_000);
        metrics.record_rejected();
        metrics.record_received();
        metrics.record_fold_error();
        metrics.record_emitted(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.lines_read, 3);
        assert_eq!(snap.bytes_read, 35);
        assert_eq!(snap.records_parsed, 2);
        assert_eq!(snap.lines_rejected, 1);
        assert_eq!(snap.avg_parse_time_us, 3.0);
        assert!((snap.match_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(snap.records_reduced, 1);
        assert_eq!(snap.fold_errors, 1);
        assert_eq!(snap.records_emitted, 1);
    }

    #[test]
    fn test_in_flight() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.in_flight(), 0);

        metrics.record_parsed(0);
        metrics.record_parsed(0);
        assert_eq!(metrics.in_flight(), 2);

        metrics.record_received();
        assert_eq!(metrics.in_flight(), 1);

        // The reducer can briefly be counted ahead of the publisher.
        metrics.record_received();
        metrics.record_received();
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_groups_are_cache_aligned() {
        assert_eq!(std::mem::align_of::<CacheAligned<ReaderMetrics>>(), 64);
        assert!(std::mem::size_of::<PipelineMetrics>() >= 3 * 64);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(PipelineMetrics::new().snapshot()).unwrap();
        assert_eq!(json["lines_read"], 0);
        assert_eq!(json["match_rate"], 1.0);
    }
}
