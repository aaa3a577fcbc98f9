//! Per-cycle statistics

use std::time::{Duration, Instant, SystemTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::copier::{CopyMethod, CopyOutcome};

/// Counters for one sync-then-purge cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// Unique cycle identifier, attached to the cycle's log entries
    pub cycle_id: Uuid,
    /// Wall-clock start of the cycle
    pub start_time: SystemTime,
    /// Total duration, filled in by [`SyncMetrics::complete`]
    pub duration: Duration,
    /// File statistics
    pub files: FileStats,
    /// Bytes written by successful copies
    pub bytes_copied: u64,
    #[serde(skip)]
    started: Option<Instant>,
}

/// File-related statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileStats {
    /// Files copied (new or updated)
    pub copied: usize,
    /// Copies that used the memory-mapped strategy
    pub mapped_copies: usize,
    /// Copies that used the buffered strategy
    pub buffered_copies: usize,
    /// Directories created in the destination
    pub directories_created: usize,
    /// Files (and other non-directories) removed from the destination
    pub files_removed: usize,
    /// Directories removed from the destination
    pub directories_removed: usize,
    /// Entries left out because they could not be stat'd
    pub skipped: usize,
    /// Operations that failed and were abandoned
    pub failed: usize,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            start_time: SystemTime::now(),
            duration: Duration::ZERO,
            files: FileStats::default(),
            bytes_copied: 0,
            started: Some(Instant::now()),
        }
    }

    pub fn record_copy(&mut self, outcome: CopyOutcome) {
        self.files.copied += 1;
        self.bytes_copied += outcome.bytes;
        match outcome.method {
            CopyMethod::Mapped => self.files.mapped_copies += 1,
            CopyMethod::Buffered => self.files.buffered_copies += 1,
        }
    }

    pub fn record_directory_created(&mut self) {
        self.files.directories_created += 1;
    }

    pub fn record_file_removed(&mut self) {
        self.files.files_removed += 1;
    }

    pub fn record_directory_removed(&mut self) {
        self.files.directories_removed += 1;
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.files.skipped += count;
    }

    pub fn record_failure(&mut self) {
        self.files.failed += 1;
    }

    /// Stop the clock
    pub fn complete(&mut self) {
        if let Some(started) = self.started.take() {
            self.duration = started.elapsed();
        }
    }

    /// True when nothing failed this cycle
    pub fn is_successful(&self) -> bool {
        self.files.failed == 0
    }

    /// True when the cycle changed nothing in the destination
    pub fn is_noop(&self) -> bool {
        self.files.copied == 0
            && self.files.directories_created == 0
            && self.files.files_removed == 0
            && self.files.directories_removed == 0
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "copied {} files ({} bytes, {} mmap, {} buffered), created {} dirs, removed {} files and {} dirs, skipped {}, failed {} in {:?}",
            self.files.copied,
            self.bytes_copied,
            self.files.mapped_copies,
            self.files.buffered_copies,
            self.files.directories_created,
            self.files.files_removed,
            self.files.directories_removed,
            self.files.skipped,
            self.files.failed,
            self.duration,
        )
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
