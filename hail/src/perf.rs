// The process-wide perf counter record
//
// Every queue/flush/cache/wait path bumps one of these. The record
// is shared by Arc between the command builder and the present
// worker; hot paths pay a single relaxed add.
//
// Austin Shafer - 2025
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated since the last sample
///
/// All values are monotonic within a sampling window and are zeroed
/// atomically by sample_and_reset().
#[derive(Default)]
pub struct PerfCounters {
    pub pc_queued_columns: AtomicU64,
    pub pc_queued_spans: AtomicU64,
    pub pc_flushes: AtomicU64,
    pub pc_mid_frame_flushes: AtomicU64,
    pub pc_max_batch: AtomicU64,
    pub pc_atlas_upload_bytes: AtomicU64,
    pub pc_cmd_upload_bytes: AtomicU64,
    pub pc_cache_lookups: AtomicU64,
    pub pc_cache_hits: AtomicU64,
    pub pc_cache_misses: AtomicU64,
    pub pc_cache_failed_inserts: AtomicU64,
    pub pc_cache_wraps: AtomicU64,
    pub pc_cache_entries: AtomicU64,
    pub pc_pl_wait_ns: AtomicU64,
    pub pc_present_scale_ns: AtomicU64,
}

/// A plain copy of the counters returned by sample_and_reset
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PerfSnapshot {
    pub queued_columns: u64,
    pub queued_spans: u64,
    pub flushes: u64,
    pub mid_frame_flushes: u64,
    pub max_batch: u64,
    pub atlas_upload_bytes: u64,
    pub cmd_upload_bytes: u64,
    pub cache_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_failed_inserts: u64,
    pub cache_wraps: u64,
    pub cache_entries: u64,
    pub pl_wait_ns: u64,
    pub present_scale_ns: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter by one
    pub fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add an amount to a counter
    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Raise a high-water counter to `val` if it is larger
    pub fn observe_max(counter: &AtomicU64, val: u64) {
        counter.fetch_max(val, Ordering::Relaxed);
    }

    /// Return the accumulated counters and zero the record
    ///
    /// Counters are reset lazily with an atomic swap per field, so
    /// concurrent bumps land either in this snapshot or the next one,
    /// never in both.
    pub fn sample_and_reset(&self) -> PerfSnapshot {
        let take = |c: &AtomicU64| c.swap(0, Ordering::Relaxed);

        PerfSnapshot {
            queued_columns: take(&self.pc_queued_columns),
            queued_spans: take(&self.pc_queued_spans),
            flushes: take(&self.pc_flushes),
            mid_frame_flushes: take(&self.pc_mid_frame_flushes),
            max_batch: take(&self.pc_max_batch),
            atlas_upload_bytes: take(&self.pc_atlas_upload_bytes),
            cmd_upload_bytes: take(&self.pc_cmd_upload_bytes),
            cache_lookups: take(&self.pc_cache_lookups),
            cache_hits: take(&self.pc_cache_hits),
            cache_misses: take(&self.pc_cache_misses),
            cache_failed_inserts: take(&self.pc_cache_failed_inserts),
            cache_wraps: take(&self.pc_cache_wraps),
            cache_entries: take(&self.pc_cache_entries),
            pl_wait_ns: take(&self.pc_pl_wait_ns),
            present_scale_ns: take(&self.pc_present_scale_ns),
        }
    }
}
