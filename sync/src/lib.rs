//! Mirror Engine Library
//!
//! Keeps a destination directory tree a one-way mirror of a source tree:
//! - Source-side walk that copies new and newer regular files
//! - Buffered and memory-mapped copy strategies selected by file size
//! - Destination-side purge of entries the source no longer has
//! - Timestamp and permission preservation
//! - Per-cycle metrics

pub mod scanner;
pub mod copier;
pub mod sync_engine;
pub mod purge;
pub mod metrics;
pub mod preservation;
pub mod error;

// Re-export main types and functions
pub use scanner::{FileEntry, FileKind};
pub use copier::{BufferedCopy, Copier, CopyMethod, CopyOutcome, CopyStrategy, MappedCopy};
pub use sync_engine::{RootPair, SyncEngine, SyncOptions};
pub use metrics::{FileStats, SyncMetrics};
pub use preservation::AttributePreserver;
pub use error::{SyncError, Result};

/// Run a single sync-then-purge cycle over `roots`
pub async fn mirror_once(roots: &RootPair, options: SyncOptions) -> SyncMetrics {
    SyncEngine::new(options).run_cycle(roots).await
}

// Test modules
#[cfg(test)]
pub mod integration_tests;
