//! Destination-side walk that deletes entries the source no longer has

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::scanner::{list_directory, stat_entry, FileEntry};
use crate::sync_engine::SyncEngine;

impl SyncEngine {
    /// Walk `dest_root` and remove every entry without a same-named
    /// counterpart under `source_root`.
    ///
    /// With recursion disabled only top-level non-directories are removed;
    /// destination directories are never touched.
    pub async fn purge_tree(&self, source_root: &Path, dest_root: &Path, metrics: &mut SyncMetrics) {
        let mut pending = vec![PathBuf::new()];

        while let Some(relative_dir) = pending.pop() {
            let dest_dir = dest_root.join(&relative_dir);
            let listing = match list_directory(&dest_dir, &relative_dir).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(error = %e, "Failed to list destination directory");
                    metrics.record_failure();
                    continue;
                }
            };
            metrics.record_skipped(listing.skipped);

            let mut subdirectories = Vec::new();
            for entry in listing.entries {
                let source_path = source_root.join(&entry.relative_path);
                let counterpart = match stat_entry(&source_path, &entry.relative_path).await {
                    Ok(counterpart) => counterpart,
                    Err(e) => {
                        // Unreadable is not absent: keep the destination entry.
                        debug!(path = %source_path.display(), error = %e, "Cannot stat source counterpart");
                        metrics.record_skipped(1);
                        continue;
                    }
                };

                match counterpart {
                    None if entry.is_dir() && !self.options.recursive => {}
                    None => {
                        if let Err(e) = remove_entry(&entry, metrics).await {
                            error!(error = %e, "Failed to remove orphaned entry");
                            metrics.record_failure();
                        }
                    }
                    Some(source) if self.options.recursive && source.is_dir() && entry.is_dir() => {
                        subdirectories.push(entry.relative_path);
                    }
                    Some(_) => {}
                }
            }

            pending.extend(subdirectories.into_iter().rev());
        }
    }
}

/// Remove a destination entry, deeply for directories.
///
/// Each removed file and directory is logged and counted. Failures on
/// descendants are logged and counted here; a failure to remove the entry
/// itself is returned to the caller.
pub(crate) async fn remove_entry(entry: &FileEntry, metrics: &mut SyncMetrics) -> Result<()> {
    if !entry.is_dir() {
        fs::remove_file(&entry.path)
            .await
            .map_err(|e| SyncError::deletion_error(&entry.path, e))?;
        info!(path = %entry.path.display(), "Removed file {}", entry.path.display());
        metrics.record_file_removed();
        return Ok(());
    }

    let path = entry.path.clone();
    let report = tokio::task::spawn_blocking(move || remove_directory_tree(&path))
        .await
        .map_err(|e| SyncError::TaskJoin {
            path: entry.path.clone(),
            message: e.to_string(),
        })?;

    for _ in 0..report.files_removed {
        metrics.record_file_removed();
    }
    for _ in 0..report.directories_removed {
        metrics.record_directory_removed();
    }
    for _ in 0..report.failed {
        metrics.record_failure();
    }

    match report.root_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[derive(Debug, Default)]
struct RemovalReport {
    files_removed: usize,
    directories_removed: usize,
    failed: usize,
    root_error: Option<SyncError>,
}

/// Delete `root` and everything below it, children before parents.
///
/// Symlinks are removed, never followed.
fn remove_directory_tree(root: &Path) -> RemovalReport {
    let mut report = RemovalReport::default();

    for item in WalkDir::new(root).follow_links(false).contents_first(true) {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                error!(root = %root.display(), error = %e, "Failed to walk directory being removed");
                report.failed += 1;
                continue;
            }
        };

        let path = item.path();
        let is_root = item.depth() == 0;

        if item.file_type().is_dir() {
            match std::fs::remove_dir(path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed directory {}", path.display());
                    report.directories_removed += 1;
                }
                Err(e) if is_root => report.root_error = Some(SyncError::deletion_error(path, e)),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to remove directory");
                    report.failed += 1;
                }
            }
        } else {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed file {}", path.display());
                    report.files_removed += 1;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to remove file");
                    report.failed += 1;
                }
            }
        }
    }

    report
}
