use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live counters of a bulk rename
///
/// Clones share the counters, so a UI thread can poll them while the
/// pipeline runs on its worker.
#[derive(Debug, Clone, Default)]
pub struct RenameStats {
    pub visited_count: Arc<AtomicU64>,
    pub renamed_count: Arc<AtomicU64>,
    pub overwritten_count: Arc<AtomicU64>,
    pub copied_original_count: Arc<AtomicU64>,
    pub skipped_missing_count: Arc<AtomicU64>,
    pub skipped_duplicate_count: Arc<AtomicU64>,
    pub failed_count: Arc<AtomicU64>,
    pub bytes_written: Arc<AtomicU64>,
}

/// Point-in-time copy of [`RenameStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenameCounts {
    pub visited: u64,
    pub renamed: u64,
    pub overwritten: u64,
    pub copied_original: u64,
    pub skipped_missing: u64,
    pub skipped_duplicate: u64,
    pub failed: u64,
    pub bytes_written: u64,
}

impl RenameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_visit(&self) {
        self.visited_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_renamed(&self, bytes: u64) {
        self.renamed_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_overwritten(&self, bytes: u64) {
        self.overwritten_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_copied_original(&self, bytes: u64) {
        self.copied_original_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped_missing(&self) {
        self.skipped_missing_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_duplicate(&self) {
        self.skipped_duplicate_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter; clones see the reset too
    pub fn reset(&self) {
        for counter in [
            &self.visited_count,
            &self.renamed_count,
            &self.overwritten_count,
            &self.copied_original_count,
            &self.skipped_missing_count,
            &self.skipped_duplicate_count,
            &self.failed_count,
            &self.bytes_written,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RenameCounts {
        RenameCounts {
            visited: self.visited_count.load(Ordering::Relaxed),
            renamed: self.renamed_count.load(Ordering::Relaxed),
            overwritten: self.overwritten_count.load(Ordering::Relaxed),
            copied_original: self.copied_original_count.load(Ordering::Relaxed),
            skipped_missing: self.skipped_missing_count.load(Ordering::Relaxed),
            skipped_duplicate: self.skipped_duplicate_count.load(Ordering::Relaxed),
            failed: self.failed_count.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

impl RenameCounts {
    /// Files that ended up in the target folder
    pub fn written(&self) -> u64 {
        self.renamed + self.overwritten + self.copied_original
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_missing + self.skipped_duplicate
    }
}
