//! Upload progress reporting
//!
//! Purely observational: workers call [`ProgressTracker::record_part`] after
//! each successful part, nothing reads it to make decisions.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point-in-time view of an upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_done: u64,
    pub parts_done: u32,
    /// 0.0..=1.0, by parts
    pub fraction: f64,
    /// Average throughput since the upload started
    pub mb_per_sec: f64,
}

/// Shared progress counters for one multipart upload
#[derive(Debug)]
pub struct ProgressTracker {
    key: String,
    total_parts: u32,
    total_bytes: u64,
    bytes_done: AtomicU64,
    parts_done: AtomicU32,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(key: impl Into<String>, total_parts: u32, total_bytes: u64) -> Self {
        Self {
            key: key.into(),
            total_parts,
            total_bytes,
            bytes_done: AtomicU64::new(0),
            parts_done: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// Count a finished part and log the running totals
    pub fn record_part(&self, part_number: u32, bytes: u64) -> ProgressSnapshot {
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
        self.parts_done.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot();

        tracing::info!(
            key = %self.key,
            part_number,
            parts_done = snapshot.parts_done,
            parts_total = self.total_parts,
            bytes_done = snapshot.bytes_done,
            bytes_total = self.total_bytes,
            percent = %format!("{:.1}", snapshot.fraction * 100.0),
            mb_per_sec = %format!("{:.2}", snapshot.mb_per_sec),
            "Upload progress"
        );

        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let bytes_done = self.bytes_done.load(Ordering::Relaxed);
        let parts_done = self.parts_done.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();

        let fraction = if self.total_parts == 0 {
            1.0
        } else {
            f64::from(parts_done) / f64::from(self.total_parts)
        };
        let mb_per_sec = if elapsed > 0.0 {
            bytes_done as f64 / BYTES_PER_MB / elapsed
        } else {
            0.0
        };

        ProgressSnapshot {
            bytes_done,
            parts_done,
            fraction: fraction.min(1.0),
            mb_per_sec,
        }
    }
}
